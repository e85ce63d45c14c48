//! Paylink Gateway
//!
//! Reference gateway for Paylink clients. It:
//! - Verifies signed call metadata and the key level each method requires
//! - Applies hash-chained member updates with optimistic concurrency
//! - Runs the token create/endorse/cancel/replace state machine
//! - Redeems transfer tokens against linked accounts
//! - Signs member recovery authorizations as a recovery agent
//!
//! ## API Endpoints
//!
//! - `GET /health` - Liveness check
//! - `GET /ready` - Readiness check with gateway info
//! - `POST /v1/rpc` - Process one signed call `Envelope`
//! - `POST /v1/admin/accounts` - Link an account to a member (when enabled)
//!
//! Errors are returned as `{error, code, details}` with a status matching
//! the code, e.g. `409` for `CONCURRENT_MODIFICATION`.

pub mod api;
pub mod config;
pub mod core;
pub mod keys;
pub mod notify;
pub mod storage;
pub mod transport;

pub use api::create_router;
pub use api::error::ApiError;
pub use api::handlers::{AppState, Caller};
pub use config::{ConfigError, GatewayConfig};
pub use keys::KeyRegistry;
pub use notify::{LoggingNotifier, Notifier, RecordingNotifier};
pub use storage::{GatewayStore, MemoryStore, StorageError};
pub use transport::LocalTransport;
