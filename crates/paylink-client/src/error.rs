//! Error types for the Paylink client
//!
//! Every failure answers one question for the caller: did the effect happen?
//! See [`ClientError::outcome`].

use paylink_core::{CoreError, ErrorCode, KeyLevel, RpcError, TransportError};
use std::time::Duration;
use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur in the Paylink client
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// No key at or below the required level; provision one before retrying
    #[error("No key for member '{member_id}' at or below level {level}")]
    KeyNotFound { member_id: String, level: KeyLevel },

    /// The member or token changed since it was read
    ///
    /// Re-read and resubmit; the client never retries this on its own.
    #[error("Concurrent modification: {message}")]
    ConcurrentModification {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// The target is in a state that forbids the operation
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Token or transfer payload is malformed
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Signature, key level or caller identity was rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The gateway no longer accepts this client version
    #[error("Client version rejected: {message}")]
    VersionMismatch {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The gateway failed while processing the call
    #[error("Gateway error: {0}")]
    Remote(String),

    /// The call was abandoned client-side
    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    /// The call may or may not have reached the gateway
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The gateway answered with a response of the wrong kind
    #[error("Unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: &'static str,
    },

    /// Local key material could not be used
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Whether a failed call had an effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The call definitely did not take effect
    NotApplied,
    /// The call may have taken effect; re-query state before acting again
    Unknown,
}

impl ClientError {
    pub fn outcome(&self) -> Outcome {
        match self {
            ClientError::Timeout(_)
            | ClientError::Transport(_)
            | ClientError::Remote(_)
            | ClientError::UnexpectedResponse { .. } => Outcome::Unknown,
            _ => Outcome::NotApplied,
        }
    }

    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, ClientError::ConcurrentModification { .. })
    }
}

impl From<RpcError> for ClientError {
    fn from(err: RpcError) -> Self {
        let RpcError {
            code,
            message,
            details,
        } = err;
        match code {
            ErrorCode::ConcurrentModification => {
                ClientError::ConcurrentModification { message, details }
            }
            ErrorCode::PreconditionFailed => ClientError::PreconditionFailed(message),
            ErrorCode::InvalidPayload => ClientError::InvalidPayload(message),
            ErrorCode::Unauthorized => ClientError::Unauthorized(message),
            ErrorCode::VersionMismatch => ClientError::VersionMismatch { message, details },
            ErrorCode::NotFound => ClientError::NotFound(message),
            ErrorCode::InvalidArgument => ClientError::InvalidArgument(message),
            ErrorCode::Internal => ClientError::Remote(message),
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Rpc(rpc) => rpc.into(),
            TransportError::Network(message) => ClientError::Transport(message),
            TransportError::Decode(message) => {
                ClientError::Transport(format!("undecodable response: {}", message))
            }
        }
    }
}

impl From<CoreError> for ClientError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::KeyNotFound { member_id, level } => {
                ClientError::KeyNotFound { member_id, level }
            }
            CoreError::StaleHash { .. } => ClientError::ConcurrentModification {
                message: err.to_string(),
                details: None,
            },
            CoreError::InvalidPayload(_)
            | CoreError::InvalidAmount(_)
            | CoreError::MissingField(_) => ClientError::InvalidPayload(err.to_string()),
            CoreError::InvalidOperation(message) => ClientError::PreconditionFailed(message),
            CoreError::UnknownKey(_) | CoreError::SerializationError(_) => {
                ClientError::InvalidArgument(err.to_string())
            }
            CoreError::CryptoError(_) | CoreError::KeyStoreError(_) => {
                ClientError::Crypto(err.to_string())
            }
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::InvalidArgument(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_codes_map_to_taxonomy() {
        let err: ClientError = TransportError::Rpc(RpcError::new(
            ErrorCode::ConcurrentModification,
            "stale",
        ))
        .into();
        assert!(err.is_concurrent_modification());
        assert_eq!(err.outcome(), Outcome::NotApplied);

        let err: ClientError =
            TransportError::Rpc(RpcError::new(ErrorCode::PreconditionFailed, "cancelled")).into();
        assert_eq!(err, ClientError::PreconditionFailed("cancelled".into()));
    }

    #[test]
    fn test_version_mismatch_keeps_details() {
        let rpc = RpcError::new(ErrorCode::VersionMismatch, "too old")
            .with_details(serde_json::json!({ "min_client_version": "0.2.0" }));
        match ClientError::from(rpc) {
            ClientError::VersionMismatch { details, .. } => {
                assert_eq!(details.unwrap()["min_client_version"], "0.2.0");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_transport_failures_have_unknown_outcome() {
        let network: ClientError = TransportError::Network("reset".into()).into();
        let decode: ClientError = TransportError::Decode("eof".into()).into();
        let internal: ClientError = RpcError::new(ErrorCode::Internal, "boom").into();

        assert_eq!(network.outcome(), Outcome::Unknown);
        assert_eq!(decode.outcome(), Outcome::Unknown);
        assert_eq!(internal.outcome(), Outcome::Unknown);
        assert_eq!(
            ClientError::Timeout(Duration::from_millis(5)).outcome(),
            Outcome::Unknown
        );
    }

    #[test]
    fn test_key_not_found_from_core() {
        let err: ClientError = CoreError::KeyNotFound {
            member_id: "m:1".into(),
            level: KeyLevel::Standard,
        }
        .into();
        assert_eq!(
            err,
            ClientError::KeyNotFound {
                member_id: "m:1".into(),
                level: KeyLevel::Standard
            }
        );
    }
}
