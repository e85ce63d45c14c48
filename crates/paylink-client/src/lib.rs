//! Paylink Client
//!
//! Client library for acting as a member of the Paylink payment-authorization
//! network.
//!
//! ## Layers
//!
//! - **`RequestSigner`**: signs each call with the member's key at the level
//!   the method needs, falling back to lower levels the caller allowed
//! - **`MemberMutator`**: hash-chained member updates; a stale update fails
//!   with `ConcurrentModification` and is never retried
//! - **`TokenAuthorizer`**: token create, endorse, cancel and replace
//! - **`Member`**, **`Account`**, **`TokenClient`**, **`Representative`**:
//!   facades over the above
//! - **`blocking`**: the same operations for synchronous callers
//!
//! ## Usage
//!
//! ```ignore
//! use paylink_client::{ClientConfig, UnauthenticatedClient, Representable};
//! use paylink_core::{Alias, InMemoryKeyStore, KeyLevel, MemberType};
//!
//! let client = UnauthenticatedClient::http("http://localhost:8080", ClientConfig::from_env()?)?;
//! let member = client
//!     .register_member(MemberType::Personal, vec![Alias::email("a@example.com")], Arc::new(InMemoryKeyStore::new()))
//!     .await?;
//!
//! let tokens = member.tokens();
//! let payload = tokens.transfer_token("100.00", "USD")
//!     .source_account(&account_id)
//!     .redeemer(&payee_id)
//!     .build()?;
//! let token = tokens.create(payload).await?;
//! let result = tokens.endorse(&token, KeyLevel::Standard).await?;
//! ```
//!
//! ## Outcomes
//!
//! `Ok` means the effect happened. An error's [`ClientError::outcome`] tells
//! whether it definitely did not (`NotApplied`) or whether state must be
//! re-read before acting again (`Unknown`).

pub mod account;
pub mod authenticated;
pub mod authorizer;
pub mod blocking;
mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod member;
pub mod mutator;
pub mod representable;
pub mod signer;
pub mod token_client;
pub mod unauthenticated;

pub use account::Account;
pub use authenticated::AuthenticatedClient;
pub use authorizer::TokenAuthorizer;
pub use config::ClientConfig;
pub use context::AuthenticationContext;
pub use error::{ClientError, Outcome, Result};
pub use http::HttpTransport;
pub use member::Member;
pub use mutator::MemberMutator;
pub use representable::{Representable, Representative};
pub use signer::RequestSigner;
pub use token_client::TokenClient;
pub use unauthenticated::UnauthenticatedClient;
