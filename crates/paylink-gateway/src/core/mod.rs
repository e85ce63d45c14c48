//! Core gateway logic

pub mod validation;

pub use validation::{
    check_client_version, check_clock_skew, verify_call, verify_token_signature,
    verify_update_signature,
};
