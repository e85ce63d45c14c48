//! Wire envelope shared by clients and the gateway
//!
//! Every call is an `Envelope`: a typed `Request`, optional signed
//! `CallMetadata`, the client version and a trace id. The metadata signature
//! covers `signing_payload(request, created_at_ms)`.
//!
//! `Transport` is the seam between the two sides. Its bit-level encoding is
//! up to the implementation (HTTP + JSON, in-process, ...).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::crypto::{serde_bytes_base64, Signature};
use crate::error::Result;
use crate::member::{MemberRecoveryOperation, MemberState, MemberUpdate};
use crate::token::{
    Token, TokenKind, TokenOperationResult, TokenPayload, TokenReplaceResult, TokenSignature,
};
use crate::transfer::{Account, Balance, Transaction, Transfer, TransferEndpoint, TransferPayload};
use crate::types::{Alias, Key, MemberType};

/// Calls understood by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Request {
    // ========================================================================
    // Identity
    // ========================================================================
    ResolveAlias {
        alias: Alias,
    },
    GetMember {
        member_id: String,
    },
    CreateMemberId {
        member_type: MemberType,
    },
    /// First update of a member, signed by a PRIVILEGED key it adds
    CreateMember {
        update: MemberUpdate,
        update_signature: Signature,
    },
    UpdateMember {
        update: MemberUpdate,
        update_signature: Signature,
    },
    DeleteMember,

    // ========================================================================
    // Recovery
    // ========================================================================
    BeginRecovery {
        alias: Alias,
    },
    GetRecoveryAuthorization {
        verification_id: String,
        code: String,
        key: Key,
    },
    /// Update carrying `Recover`, signed by the recovered PRIVILEGED key
    CompleteRecovery {
        update: MemberUpdate,
        update_signature: Signature,
    },

    // ========================================================================
    // Tokens
    // ========================================================================
    CreateToken {
        payload: TokenPayload,
    },
    GetToken {
        token_id: String,
    },
    GetTokens {
        kind: TokenKind,
    },
    EndorseToken {
        token_id: String,
        signature: TokenSignature,
    },
    CancelToken {
        token_id: String,
        signature: TokenSignature,
    },
    /// Cancel `token_id` and create `payload` in one step
    ReplaceToken {
        token_id: String,
        cancel_signature: TokenSignature,
        payload: TokenPayload,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endorsement: Option<TokenSignature>,
    },

    // ========================================================================
    // Transfers
    // ========================================================================
    CreateTransfer {
        payload: TransferPayload,
    },
    GetTransfer {
        transfer_id: String,
    },
    GetTransfers {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_id: Option<String>,
    },

    // ========================================================================
    // Accounts
    // ========================================================================
    GetAccounts,
    GetBalance {
        account_id: String,
    },
    GetTransactions {
        account_id: String,
    },
    ResolveTransferDestinations {
        account_id: String,
    },
    ConfirmFunds {
        account_id: String,
        amount: String,
        currency: String,
    },
    UnlinkAccounts {
        account_ids: Vec<String>,
    },
}

impl Request {
    pub fn method(&self) -> Method {
        match self {
            Request::ResolveAlias { .. } => Method::ResolveAlias,
            Request::GetMember { .. } => Method::GetMember,
            Request::CreateMemberId { .. } => Method::CreateMemberId,
            Request::CreateMember { .. } => Method::CreateMember,
            Request::UpdateMember { .. } => Method::UpdateMember,
            Request::DeleteMember => Method::DeleteMember,
            Request::BeginRecovery { .. } => Method::BeginRecovery,
            Request::GetRecoveryAuthorization { .. } => Method::GetRecoveryAuthorization,
            Request::CompleteRecovery { .. } => Method::CompleteRecovery,
            Request::CreateToken { .. } => Method::CreateToken,
            Request::GetToken { .. } => Method::GetToken,
            Request::GetTokens { .. } => Method::GetTokens,
            Request::EndorseToken { .. } => Method::EndorseToken,
            Request::CancelToken { .. } => Method::CancelToken,
            Request::ReplaceToken { .. } => Method::ReplaceToken,
            Request::CreateTransfer { .. } => Method::CreateTransfer,
            Request::GetTransfer { .. } => Method::GetTransfer,
            Request::GetTransfers { .. } => Method::GetTransfers,
            Request::GetAccounts => Method::GetAccounts,
            Request::GetBalance { .. } => Method::GetBalance,
            Request::GetTransactions { .. } => Method::GetTransactions,
            Request::ResolveTransferDestinations { .. } => Method::ResolveTransferDestinations,
            Request::ConfirmFunds { .. } => Method::ConfirmFunds,
            Request::UnlinkAccounts { .. } => Method::UnlinkAccounts,
        }
    }

    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Name of a call, used for policy lookups and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    ResolveAlias,
    GetMember,
    CreateMemberId,
    CreateMember,
    UpdateMember,
    DeleteMember,
    BeginRecovery,
    GetRecoveryAuthorization,
    CompleteRecovery,
    CreateToken,
    GetToken,
    GetTokens,
    EndorseToken,
    CancelToken,
    ReplaceToken,
    CreateTransfer,
    GetTransfer,
    GetTransfers,
    GetAccounts,
    GetBalance,
    GetTransactions,
    ResolveTransferDestinations,
    ConfirmFunds,
    UnlinkAccounts,
}

impl Method {
    /// Whether the call must carry signed `CallMetadata`
    ///
    /// Calls that run before the caller has a registered key are
    /// authenticated by their payload instead (`CreateMember`,
    /// `CompleteRecovery`) or not at all.
    pub fn requires_authentication(&self) -> bool {
        !matches!(
            self,
            Method::ResolveAlias
                | Method::CreateMemberId
                | Method::CreateMember
                | Method::BeginRecovery
                | Method::GetRecoveryAuthorization
                | Method::CompleteRecovery
        )
    }

    /// Whether a successful call changes server state
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Method::ResolveAlias
                | Method::GetMember
                | Method::GetToken
                | Method::GetTokens
                | Method::GetTransfer
                | Method::GetTransfers
                | Method::GetAccounts
                | Method::GetBalance
                | Method::GetTransactions
                | Method::ResolveTransferDestinations
                | Method::ConfirmFunds
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::ResolveAlias => "resolve_alias",
            Method::GetMember => "get_member",
            Method::CreateMemberId => "create_member_id",
            Method::CreateMember => "create_member",
            Method::UpdateMember => "update_member",
            Method::DeleteMember => "delete_member",
            Method::BeginRecovery => "begin_recovery",
            Method::GetRecoveryAuthorization => "get_recovery_authorization",
            Method::CompleteRecovery => "complete_recovery",
            Method::CreateToken => "create_token",
            Method::GetToken => "get_token",
            Method::GetTokens => "get_tokens",
            Method::EndorseToken => "endorse_token",
            Method::CancelToken => "cancel_token",
            Method::ReplaceToken => "replace_token",
            Method::CreateTransfer => "create_transfer",
            Method::GetTransfer => "get_transfer",
            Method::GetTransfers => "get_transfers",
            Method::GetAccounts => "get_accounts",
            Method::GetBalance => "get_balance",
            Method::GetTransactions => "get_transactions",
            Method::ResolveTransferDestinations => "resolve_transfer_destinations",
            Method::ConfirmFunds => "confirm_funds",
            Method::UnlinkAccounts => "unlink_accounts",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful call results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    ResolvedAlias {
        member_id: Option<String>,
    },
    MemberId {
        member_id: String,
    },
    Member {
        member: MemberState,
    },
    Verification {
        verification_id: String,
    },
    RecoveryOperation {
        operation: MemberRecoveryOperation,
    },
    Token {
        token: Token,
    },
    Tokens {
        tokens: Vec<Token>,
    },
    TokenOperation {
        result: TokenOperationResult,
    },
    TokenReplaced {
        result: TokenReplaceResult,
    },
    Transfer {
        transfer: Transfer,
    },
    Transfers {
        transfers: Vec<Transfer>,
    },
    Accounts {
        accounts: Vec<Account>,
    },
    Balance {
        balance: Balance,
    },
    Transactions {
        transactions: Vec<Transaction>,
    },
    TransferEndpoints {
        endpoints: Vec<TransferEndpoint>,
    },
    FundsConfirmed {
        sufficient: bool,
    },
    Empty,
}

impl Response {
    /// Variant name, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Response::ResolvedAlias { .. } => "resolved_alias",
            Response::MemberId { .. } => "member_id",
            Response::Member { .. } => "member",
            Response::Verification { .. } => "verification",
            Response::RecoveryOperation { .. } => "recovery_operation",
            Response::Token { .. } => "token",
            Response::Tokens { .. } => "tokens",
            Response::TokenOperation { .. } => "token_operation",
            Response::TokenReplaced { .. } => "token_replaced",
            Response::Transfer { .. } => "transfer",
            Response::Transfers { .. } => "transfers",
            Response::Accounts { .. } => "accounts",
            Response::Balance { .. } => "balance",
            Response::Transactions { .. } => "transactions",
            Response::TransferEndpoints { .. } => "transfer_endpoints",
            Response::FundsConfirmed { .. } => "funds_confirmed",
            Response::Empty => "empty",
        }
    }
}

/// Signed header-like metadata attached to an authenticated call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMetadata {
    pub realm: String,
    pub scheme: String,
    pub member_id: String,
    pub key_id: String,
    #[serde(with = "serde_bytes_base64")]
    pub signature: Vec<u8>,
    pub created_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_behalf_of: Option<String>,
    #[serde(default)]
    pub customer_initiated: bool,
}

/// One call as it travels over a transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub request: Request,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<CallMetadata>,
    pub client_version: String,
    pub trace_id: String,
}

/// Bytes covered by a call signature: `canonical(request) || "|" || created_at_ms`
pub fn signing_payload(request: &Request, created_at_ms: i64) -> Result<Vec<u8>> {
    let mut payload = request.canonical_bytes()?;
    payload.push(b'|');
    payload.extend_from_slice(created_at_ms.to_string().as_bytes());
    Ok(payload)
}

/// Machine-readable error code returned by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ConcurrentModification,
    PreconditionFailed,
    InvalidPayload,
    Unauthorized,
    VersionMismatch,
    NotFound,
    InvalidArgument,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConcurrentModification => "CONCURRENT_MODIFICATION",
            ErrorCode::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorCode::InvalidPayload => "INVALID_PAYLOAD",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::VersionMismatch => "VERSION_MISMATCH",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body as returned by the gateway
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Failure to complete a call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// The gateway processed the call and rejected it
    #[error("{0}")]
    Rpc(RpcError),

    /// The call may or may not have reached the gateway
    #[error("Network error: {0}")]
    Network(String),

    /// A response arrived but could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Call/response channel to a gateway
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, envelope: Envelope) -> std::result::Result<Response, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request = Request::GetBalance {
            account_id: "a1".into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["method"], "get_balance");
        assert_eq!(json["params"]["account_id"], "a1");

        let unit = serde_json::to_value(Request::GetAccounts).unwrap();
        assert_eq!(unit["method"], "get_accounts");
    }

    #[test]
    fn test_method_names_match_wire_tags() {
        let requests = [
            Request::DeleteMember,
            Request::GetAccounts,
            Request::GetTransfers { token_id: None },
            Request::GetToken {
                token_id: "tt:1".into(),
            },
        ];
        for request in requests {
            let json = serde_json::to_value(&request).unwrap();
            assert_eq!(json["method"], request.method().as_str());
        }
    }

    #[test]
    fn test_signing_payload_binds_timestamp() {
        let request = Request::GetAccounts;
        let a = signing_payload(&request, 1000).unwrap();
        let b = signing_payload(&request, 1001).unwrap();
        assert_ne!(a, b);
        assert!(a.ends_with(b"|1000"));
    }

    #[test]
    fn test_canonical_bytes_survive_roundtrip() {
        let request = Request::ConfirmFunds {
            account_id: "a1".into(),
            amount: "10.50".into(),
            currency: "EUR".into(),
        };
        let bytes = request.canonical_bytes().unwrap();
        let decoded: Request = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded.canonical_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_authentication_requirements() {
        assert!(!Method::ResolveAlias.requires_authentication());
        assert!(!Method::CreateMember.requires_authentication());
        assert!(Method::UpdateMember.requires_authentication());
        assert!(Method::GetBalance.requires_authentication());
        assert!(!Method::GetBalance.is_mutation());
        assert!(Method::CreateTransfer.is_mutation());
    }

    #[test]
    fn test_error_code_wire_format() {
        let err = RpcError::new(ErrorCode::ConcurrentModification, "stale");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "CONCURRENT_MODIFICATION");
        assert_eq!(err.to_string(), "CONCURRENT_MODIFICATION: stale");
    }
}
