//! API error types and responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use paylink_core::{CoreError, ErrorCode, RpcError};
use serde::Serialize;
use thiserror::Error;

use crate::storage::StorageError;

/// API error type
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Stale member state")]
    StaleMemberState { expected: String, actual: String },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Client version {client} is older than {minimum}")]
    VersionMismatch { client: String, minimum: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::ConcurrentModification(_) | ApiError::StaleMemberState { .. } => {
                ErrorCode::ConcurrentModification
            }
            ApiError::PreconditionFailed(_) => ErrorCode::PreconditionFailed,
            ApiError::InvalidPayload(_) => ErrorCode::InvalidPayload,
            ApiError::Unauthorized(_) => ErrorCode::Unauthorized,
            ApiError::VersionMismatch { .. } => ErrorCode::VersionMismatch,
            ApiError::NotFound(_) => ErrorCode::NotFound,
            ApiError::BadRequest(_) => ErrorCode::InvalidArgument,
            ApiError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code() {
            ErrorCode::ConcurrentModification => StatusCode::CONFLICT,
            ErrorCode::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            ErrorCode::InvalidPayload => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::VersionMismatch => StatusCode::UPGRADE_REQUIRED,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::StaleMemberState { expected, actual } => Some(serde_json::json!({
                "current_hash": expected,
                "submitted_prev_hash": actual,
            })),
            ApiError::VersionMismatch { client, minimum } => Some(serde_json::json!({
                "client_version": client,
                "min_client_version": minimum,
            })),
            _ => None,
        }
    }

    /// Wire form shared with non-HTTP transports
    pub fn to_rpc(&self) -> RpcError {
        RpcError {
            code: self.code(),
            message: self.to_string(),
            details: self.details(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
            details: self.details(),
        };

        (self.status(), Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::StaleHash { expected, actual } => {
                ApiError::StaleMemberState { expected, actual }
            }
            CoreError::InvalidOperation(msg) => ApiError::PreconditionFailed(msg),
            CoreError::InvalidPayload(msg)
            | CoreError::InvalidAmount(msg)
            | CoreError::MissingField(msg) => ApiError::InvalidPayload(msg),
            CoreError::KeyNotFound { .. } | CoreError::UnknownKey(_) => {
                ApiError::Unauthorized(err.to_string())
            }
            CoreError::CryptoError(msg) => ApiError::Unauthorized(msg),
            CoreError::SerializationError(msg) => {
                ApiError::BadRequest(format!("Serialization error: {}", msg))
            }
            CoreError::KeyStoreError(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => ApiError::NotFound(what),
            StorageError::AlreadyExists(what) => {
                ApiError::PreconditionFailed(format!("{} already exists", what))
            }
            StorageError::Conflict(msg) => ApiError::ConcurrentModification(msg),
            StorageError::Precondition(msg) => ApiError::PreconditionFailed(msg),
            StorageError::Rejected(core) => core.into(),
            StorageError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("Serialization error: {}", err))
    }
}
