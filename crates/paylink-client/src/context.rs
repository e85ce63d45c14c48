//! Per-call authentication context
//!
//! Passed explicitly with every authenticated call. Nothing about it is
//! stored between calls, so a representative call cannot leak its
//! `on_behalf_of` into the next one.

use paylink_core::KeyLevel;

/// How a single call should be authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationContext {
    /// Access token id the call is made under
    pub on_behalf_of: Option<String>,

    /// Lowest key level the caller wants to sign with
    ///
    /// The signer never goes below the level the method itself requires.
    pub min_key_level: KeyLevel,

    /// The end customer is present and initiated the call
    pub customer_initiated: bool,
}

impl Default for AuthenticationContext {
    fn default() -> Self {
        Self {
            on_behalf_of: None,
            min_key_level: KeyLevel::Low,
            customer_initiated: false,
        }
    }
}

impl AuthenticationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Act under the access token `token_id`
    pub fn on_behalf_of(token_id: impl Into<String>) -> Self {
        Self {
            on_behalf_of: Some(token_id.into()),
            ..Self::default()
        }
    }

    pub fn with_min_key_level(mut self, level: KeyLevel) -> Self {
        self.min_key_level = level;
        self
    }

    pub fn with_customer_initiated(mut self, customer_initiated: bool) -> Self {
        self.customer_initiated = customer_initiated;
        self
    }
}
