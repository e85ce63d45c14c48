//! Storage abstraction for the gateway
//!
//! Every write that participates in the concurrency protocol is a
//! compare-and-swap:
//! - member updates apply only if `prev_hash` is the member's current hash
//! - token writes apply only if the stored token equals the one the caller read
//! - transfers are keyed by `(token_id, ref_id)` and recorded at most once

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use paylink_core::{
    Account, Alias, Amount, CoreError, MemberState, MemberType, MemberUpdate, Token, TokenKind,
    Transaction, Transfer,
};
use std::fmt::Debug;

/// Error type for storage operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Compare-and-swap lost against a concurrent writer
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The domain model refused the write
    #[error(transparent)]
    Rejected(#[from] CoreError),

    #[error("Internal storage error: {0}")]
    Internal(String),
}

/// A pending recovery verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub member_id: String,
    pub code: String,
    pub expires_at_ms: i64,
    /// Wrong codes submitted so far
    pub failed_attempts: u32,
}

/// Everything needed to record one redemption atomically
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub transfer: Transfer,
    /// Lifetime amount of the token being redeemed
    pub token_limit: Amount,
    /// Account debited
    pub source_account_id: String,
    /// Account credited, if it is held at this gateway
    pub destination_account_id: Option<String>,
}

/// Storage backend trait for gateway state
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait GatewayStore: Send + Sync + Debug {
    // =========================================================================
    // Members
    // =========================================================================

    /// Reserve a member id with empty state
    async fn allocate_member(
        &self,
        member_id: &str,
        member_type: MemberType,
    ) -> Result<(), StorageError>;

    async fn get_member(&self, member_id: &str) -> Result<Option<MemberState>, StorageError>;

    /// Apply an update if its `prev_hash` is still current
    ///
    /// Aliases added by the update must not belong to another member.
    async fn apply_member_update(&self, update: &MemberUpdate)
        -> Result<MemberState, StorageError>;

    /// Accepted updates in order
    async fn member_log(&self, member_id: &str) -> Result<Vec<MemberUpdate>, StorageError>;

    /// Remove a member with its aliases and accounts
    async fn delete_member(&self, member_id: &str) -> Result<(), StorageError>;

    async fn resolve_alias(&self, alias: &Alias) -> Result<Option<String>, StorageError>;

    async fn member_count(&self) -> Result<usize, StorageError>;

    // =========================================================================
    // Recovery
    // =========================================================================

    /// Store a verification, dropping every verification expired at `now_ms`
    async fn put_verification(
        &self,
        verification_id: &str,
        verification: Verification,
        now_ms: i64,
    ) -> Result<(), StorageError>;

    async fn get_verification(
        &self,
        verification_id: &str,
    ) -> Result<Option<Verification>, StorageError>;

    async fn remove_verification(&self, verification_id: &str) -> Result<(), StorageError>;

    /// Count a wrong code against a verification
    ///
    /// Returns the attempts recorded so far. Once `max_attempts` is reached the
    /// verification is removed, so concurrent guesses cannot exceed the limit.
    async fn record_failed_verification(
        &self,
        verification_id: &str,
        max_attempts: u32,
    ) -> Result<u32, StorageError>;

    // =========================================================================
    // Tokens
    // =========================================================================

    /// Store a new token, or return the existing token with the same id
    async fn insert_token(&self, token: Token) -> Result<Token, StorageError>;

    async fn get_token(&self, token_id: &str) -> Result<Option<Token>, StorageError>;

    /// Tokens issued or redeemable by a member
    async fn list_tokens(
        &self,
        member_id: &str,
        kind: TokenKind,
    ) -> Result<Vec<Token>, StorageError>;

    /// Replace `expected` with `updated` if the stored token still equals `expected`
    async fn update_token(&self, expected: &Token, updated: Token) -> Result<Token, StorageError>;

    /// Swap `expected` for `cancelled` and store `created`, all or nothing
    async fn replace_token(
        &self,
        expected: &Token,
        cancelled: Token,
        created: Token,
    ) -> Result<(Token, Token), StorageError>;

    // =========================================================================
    // Transfers
    // =========================================================================

    async fn find_transfer(
        &self,
        token_id: &str,
        ref_id: &str,
    ) -> Result<Option<Transfer>, StorageError>;

    /// Record a redemption and move the funds
    ///
    /// Returns the existing transfer if `(token_id, ref_id)` was already
    /// recorded. Fails with `Precondition` if the token's lifetime amount or
    /// the source balance would be exceeded.
    async fn record_transfer(&self, record: TransferRecord) -> Result<Transfer, StorageError>;

    async fn get_transfer(&self, transfer_id: &str) -> Result<Option<Transfer>, StorageError>;

    async fn list_transfers(&self, token_id: Option<&str>) -> Result<Vec<Transfer>, StorageError>;

    // =========================================================================
    // Accounts
    // =========================================================================

    async fn insert_account(&self, account: Account, balance: Amount)
        -> Result<(), StorageError>;

    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, StorageError>;

    async fn list_accounts(&self, member_id: &str) -> Result<Vec<Account>, StorageError>;

    async fn get_balance(&self, account_id: &str) -> Result<Option<Amount>, StorageError>;

    async fn list_transactions(&self, account_id: &str)
        -> Result<Vec<Transaction>, StorageError>;

    /// Remove accounts; every id must belong to `member_id`
    async fn remove_accounts(
        &self,
        member_id: &str,
        account_ids: &[String],
    ) -> Result<(), StorageError>;
}
