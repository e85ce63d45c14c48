//! Error types for the Paylink core

use thiserror::Error;

use crate::types::KeyLevel;

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in the Paylink core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// No key exists for the member at the requested level
    #[error("No key for member '{member_id}' at level {level}")]
    KeyNotFound { member_id: String, level: KeyLevel },

    /// Key id is not registered on the member
    #[error("Unknown key: {0}")]
    UnknownKey(String),

    /// Member update was built against a hash that is no longer current
    #[error("Stale member state: expected prev hash '{expected}', got '{actual}'")]
    StaleHash { expected: String, actual: String },

    /// A member operation cannot be applied to the current state
    #[error("Invalid member operation: {0}")]
    InvalidOperation(String),

    /// Token payload is missing mandatory fields or is malformed
    #[error("Invalid token payload: {0}")]
    InvalidPayload(String),

    /// Amount string could not be parsed
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Cryptographic error
    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    /// Key store I/O or encoding error
    #[error("Key store error: {0}")]
    KeyStoreError(String),
}

impl From<ed25519_dalek::SignatureError> for CoreError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        CoreError::CryptoError(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<base64::DecodeError> for CoreError {
    fn from(err: base64::DecodeError) -> Self {
        CoreError::CryptoError(format!("invalid base64: {}", err))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::KeyStoreError(err.to_string())
    }
}
