//! In-memory storage backend
//!
//! Default storage implementation using in-memory hashmaps behind a single
//! lock, so every compare-and-swap sees a consistent snapshot.
//! Data is lost on restart.

use async_trait::async_trait;
use paylink_core::{
    Account, Alias, Amount, MemberState, MemberType, MemberUpdate, Token, TokenKind,
    TransactionStatus, Transaction, Transfer,
};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use super::{GatewayStore, StorageError, TransferRecord, Verification};

#[derive(Debug)]
struct MemberRecord {
    state: MemberState,
    log: Vec<MemberUpdate>,
}

#[derive(Debug, Default)]
struct Inner {
    members: HashMap<String, MemberRecord>,
    aliases: HashMap<Alias, String>,
    verifications: HashMap<String, Verification>,
    tokens: HashMap<String, Token>,
    transfers: HashMap<String, Transfer>,
    transfers_by_ref: HashMap<(String, String), String>,
    redeemed: HashMap<String, Amount>,
    accounts: HashMap<String, Account>,
    balances: HashMap<String, Amount>,
    transactions: HashMap<String, Vec<Transaction>>,
}

/// In-memory gateway store
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn transaction(
    account: &Account,
    amount: String,
    transfer: &Transfer,
    suffix: &str,
) -> Transaction {
    Transaction {
        id: format!("{}:{}", transfer.id, suffix),
        account_id: account.id.clone(),
        amount,
        currency: transfer.currency.clone(),
        status: TransactionStatus::Success,
        token_id: Some(transfer.payload.token_id.clone()),
        transfer_id: Some(transfer.id.clone()),
        created_at_ms: transfer.created_at_ms,
    }
}

#[async_trait]
impl GatewayStore for MemoryStore {
    // =========================================================================
    // Members
    // =========================================================================

    async fn allocate_member(
        &self,
        member_id: &str,
        member_type: MemberType,
    ) -> Result<(), StorageError> {
        let mut inner = self.write();
        if inner.members.contains_key(member_id) {
            return Err(StorageError::AlreadyExists(format!("member {}", member_id)));
        }
        inner.members.insert(
            member_id.to_string(),
            MemberRecord {
                state: MemberState::new(member_id, member_type),
                log: Vec::new(),
            },
        );
        debug!(member_id = %member_id, "Allocated member id");
        Ok(())
    }

    async fn get_member(&self, member_id: &str) -> Result<Option<MemberState>, StorageError> {
        Ok(self.read().members.get(member_id).map(|r| r.state.clone()))
    }

    async fn apply_member_update(
        &self,
        update: &MemberUpdate,
    ) -> Result<MemberState, StorageError> {
        let mut guard = self.write();
        let inner = &mut *guard;

        let record = inner
            .members
            .get_mut(&update.member_id)
            .ok_or_else(|| StorageError::NotFound(format!("member {}", update.member_id)))?;

        let mut next = record.state.clone();
        next.apply(update)?;

        for alias in &next.aliases {
            if let Some(owner) = inner.aliases.get(alias) {
                if owner != &update.member_id {
                    return Err(StorageError::AlreadyExists(format!("alias {}", alias)));
                }
            }
        }

        for alias in &record.state.aliases {
            if !next.aliases.contains(alias) {
                inner.aliases.remove(alias);
            }
        }
        for alias in &next.aliases {
            inner
                .aliases
                .insert(alias.clone(), update.member_id.clone());
        }

        record.state = next.clone();
        record.log.push(update.clone());

        info!(
            member_id = %update.member_id,
            last_hash = %next.last_hash,
            operations = update.operations.len(),
            "Applied member update"
        );
        Ok(next)
    }

    async fn member_log(&self, member_id: &str) -> Result<Vec<MemberUpdate>, StorageError> {
        self.read()
            .members
            .get(member_id)
            .map(|r| r.log.clone())
            .ok_or_else(|| StorageError::NotFound(format!("member {}", member_id)))
    }

    async fn delete_member(&self, member_id: &str) -> Result<(), StorageError> {
        let mut inner = self.write();
        let record = inner
            .members
            .remove(member_id)
            .ok_or_else(|| StorageError::NotFound(format!("member {}", member_id)))?;

        for alias in &record.state.aliases {
            inner.aliases.remove(alias);
        }

        let owned: Vec<String> = inner
            .accounts
            .values()
            .filter(|a| a.member_id == member_id)
            .map(|a| a.id.clone())
            .collect();
        for account_id in owned {
            inner.accounts.remove(&account_id);
            inner.balances.remove(&account_id);
        }

        info!(member_id = %member_id, "Deleted member");
        Ok(())
    }

    async fn resolve_alias(&self, alias: &Alias) -> Result<Option<String>, StorageError> {
        Ok(self.read().aliases.get(&alias.normalized()).cloned())
    }

    async fn member_count(&self) -> Result<usize, StorageError> {
        Ok(self.read().members.len())
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    async fn put_verification(
        &self,
        verification_id: &str,
        verification: Verification,
        now_ms: i64,
    ) -> Result<(), StorageError> {
        let mut inner = self.write();
        inner.verifications.retain(|_, v| v.expires_at_ms > now_ms);
        inner
            .verifications
            .insert(verification_id.to_string(), verification);
        Ok(())
    }

    async fn get_verification(
        &self,
        verification_id: &str,
    ) -> Result<Option<Verification>, StorageError> {
        Ok(self.read().verifications.get(verification_id).cloned())
    }

    async fn remove_verification(&self, verification_id: &str) -> Result<(), StorageError> {
        self.write().verifications.remove(verification_id);
        Ok(())
    }

    async fn record_failed_verification(
        &self,
        verification_id: &str,
        max_attempts: u32,
    ) -> Result<u32, StorageError> {
        let mut inner = self.write();
        let Some(verification) = inner.verifications.get_mut(verification_id) else {
            return Ok(max_attempts);
        };
        verification.failed_attempts += 1;
        let attempts = verification.failed_attempts;
        if attempts >= max_attempts {
            inner.verifications.remove(verification_id);
        }
        Ok(attempts)
    }

    // =========================================================================
    // Tokens
    // =========================================================================

    async fn insert_token(&self, token: Token) -> Result<Token, StorageError> {
        let mut inner = self.write();
        if let Some(existing) = inner.tokens.get(&token.id) {
            return Ok(existing.clone());
        }
        inner.tokens.insert(token.id.clone(), token.clone());
        Ok(token)
    }

    async fn get_token(&self, token_id: &str) -> Result<Option<Token>, StorageError> {
        Ok(self.read().tokens.get(token_id).cloned())
    }

    async fn list_tokens(
        &self,
        member_id: &str,
        kind: TokenKind,
    ) -> Result<Vec<Token>, StorageError> {
        let inner = self.read();
        let mut tokens: Vec<Token> = inner
            .tokens
            .values()
            .filter(|t| t.payload.kind() == kind)
            .filter(|t| {
                t.payload.from.id == member_id || t.payload.redeemer_id() == Some(member_id)
            })
            .cloned()
            .collect();
        tokens.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tokens)
    }

    async fn update_token(&self, expected: &Token, updated: Token) -> Result<Token, StorageError> {
        let mut inner = self.write();
        let current = inner
            .tokens
            .get(&expected.id)
            .ok_or_else(|| StorageError::NotFound(format!("token {}", expected.id)))?;
        if current != expected {
            return Err(StorageError::Conflict(format!(
                "token {} changed concurrently",
                expected.id
            )));
        }
        inner.tokens.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    async fn replace_token(
        &self,
        expected: &Token,
        cancelled: Token,
        created: Token,
    ) -> Result<(Token, Token), StorageError> {
        let mut inner = self.write();
        let current = inner
            .tokens
            .get(&expected.id)
            .ok_or_else(|| StorageError::NotFound(format!("token {}", expected.id)))?;
        if current != expected {
            return Err(StorageError::Conflict(format!(
                "token {} changed concurrently",
                expected.id
            )));
        }
        if inner.tokens.contains_key(&created.id) {
            return Err(StorageError::Conflict(format!(
                "successor {} already exists",
                created.id
            )));
        }
        inner.tokens.insert(cancelled.id.clone(), cancelled.clone());
        inner.tokens.insert(created.id.clone(), created.clone());
        Ok((cancelled, created))
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    async fn find_transfer(
        &self,
        token_id: &str,
        ref_id: &str,
    ) -> Result<Option<Transfer>, StorageError> {
        let inner = self.read();
        Ok(inner
            .transfers_by_ref
            .get(&(token_id.to_string(), ref_id.to_string()))
            .and_then(|id| inner.transfers.get(id))
            .cloned())
    }

    async fn record_transfer(&self, record: TransferRecord) -> Result<Transfer, StorageError> {
        let mut guard = self.write();
        let inner = &mut *guard;
        let transfer = record.transfer;
        let ref_key = (
            transfer.payload.token_id.clone(),
            transfer.payload.ref_id.clone(),
        );

        if let Some(existing) = inner
            .transfers_by_ref
            .get(&ref_key)
            .and_then(|id| inner.transfers.get(id))
        {
            return Ok(existing.clone());
        }

        let amount = Amount::parse(&transfer.amount)?;
        let redeemed = inner
            .redeemed
            .get(&ref_key.0)
            .copied()
            .unwrap_or(Amount::ZERO);
        let total = redeemed
            .checked_add(amount)
            .ok_or_else(|| StorageError::Precondition("amount overflow".into()))?;
        if total > record.token_limit {
            return Err(StorageError::Precondition(format!(
                "token amount exceeded: {} already redeemed of {}",
                redeemed, record.token_limit
            )));
        }

        let source = inner
            .accounts
            .get(&record.source_account_id)
            .cloned()
            .ok_or_else(|| {
                StorageError::Precondition(format!(
                    "source account {} is not linked",
                    record.source_account_id
                ))
            })?;
        let destination = match &record.destination_account_id {
            Some(id) => {
                let account = inner.accounts.get(id).cloned().ok_or_else(|| {
                    StorageError::Precondition(format!("destination account {} is not linked", id))
                })?;
                if account.currency != transfer.currency {
                    return Err(StorageError::Precondition(format!(
                        "destination account {} holds {}, transfer is in {}",
                        account.id, account.currency, transfer.currency
                    )));
                }
                Some(account)
            }
            None => None,
        };

        let balance = inner
            .balances
            .get(&source.id)
            .copied()
            .unwrap_or(Amount::ZERO);
        let remaining = balance
            .checked_sub(amount)
            .ok_or_else(|| StorageError::Precondition("insufficient funds".into()))?;
        inner.balances.insert(source.id.clone(), remaining);
        inner
            .transactions
            .entry(source.id.clone())
            .or_default()
            .push(transaction(&source, format!("-{}", amount), &transfer, "debit"));

        if let Some(destination) = destination {
            let balance = inner
                .balances
                .get(&destination.id)
                .copied()
                .unwrap_or(Amount::ZERO);
            let credited = balance
                .checked_add(amount)
                .ok_or_else(|| StorageError::Precondition("amount overflow".into()))?;
            inner.balances.insert(destination.id.clone(), credited);
            inner
                .transactions
                .entry(destination.id.clone())
                .or_default()
                .push(transaction(&destination, amount.to_string(), &transfer, "credit"));
        }

        inner.redeemed.insert(ref_key.0.clone(), total);
        inner.transfers_by_ref.insert(ref_key, transfer.id.clone());
        inner.transfers.insert(transfer.id.clone(), transfer.clone());
        Ok(transfer)
    }

    async fn get_transfer(&self, transfer_id: &str) -> Result<Option<Transfer>, StorageError> {
        Ok(self.read().transfers.get(transfer_id).cloned())
    }

    async fn list_transfers(&self, token_id: Option<&str>) -> Result<Vec<Transfer>, StorageError> {
        let inner = self.read();
        let mut transfers: Vec<Transfer> = inner
            .transfers
            .values()
            .filter(|t| token_id.map_or(true, |id| t.payload.token_id == id))
            .cloned()
            .collect();
        transfers.sort_by_key(|t| t.created_at_ms);
        Ok(transfers)
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    async fn insert_account(&self, account: Account, balance: Amount) -> Result<(), StorageError> {
        let mut inner = self.write();
        if !inner.members.contains_key(&account.member_id) {
            return Err(StorageError::NotFound(format!("member {}", account.member_id)));
        }
        if inner.accounts.contains_key(&account.id) {
            return Err(StorageError::AlreadyExists(format!("account {}", account.id)));
        }
        info!(account_id = %account.id, member_id = %account.member_id, "Linked account");
        inner.balances.insert(account.id.clone(), balance);
        inner.accounts.insert(account.id.clone(), account);
        Ok(())
    }

    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, StorageError> {
        Ok(self.read().accounts.get(account_id).cloned())
    }

    async fn list_accounts(&self, member_id: &str) -> Result<Vec<Account>, StorageError> {
        let inner = self.read();
        let mut accounts: Vec<Account> = inner
            .accounts
            .values()
            .filter(|a| a.member_id == member_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }

    async fn get_balance(&self, account_id: &str) -> Result<Option<Amount>, StorageError> {
        Ok(self.read().balances.get(account_id).copied())
    }

    async fn list_transactions(&self, account_id: &str) -> Result<Vec<Transaction>, StorageError> {
        Ok(self
            .read()
            .transactions
            .get(account_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn remove_accounts(
        &self,
        member_id: &str,
        account_ids: &[String],
    ) -> Result<(), StorageError> {
        let mut inner = self.write();
        for id in account_ids {
            match inner.accounts.get(id) {
                Some(account) if account.member_id == member_id => {}
                _ => return Err(StorageError::NotFound(format!("account {}", id))),
            }
        }
        for id in account_ids {
            inner.accounts.remove(id);
            inner.balances.remove(id);
            info!(account_id = %id, member_id = %member_id, "Unlinked account");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paylink_core::{
        KeyLevel, KeyPair, MemberOperation, TokenPayload, TransferPayload,
    };

    async fn store_with_member(member_id: &str) -> (MemoryStore, MemberState) {
        let store = MemoryStore::new();
        store
            .allocate_member(member_id, MemberType::Personal)
            .await
            .unwrap();
        let update = MemberUpdate::new(
            member_id,
            "",
            vec![MemberOperation::add_key(
                KeyPair::generate(KeyLevel::Privileged).key(),
            )],
        );
        let state = store.apply_member_update(&update).await.unwrap();
        (store, state)
    }

    fn verification(expires_at_ms: i64) -> Verification {
        Verification {
            member_id: "m:alice".into(),
            code: "123456".into(),
            expires_at_ms,
            failed_attempts: 0,
        }
    }

    #[tokio::test]
    async fn test_put_verification_sweeps_expired() {
        let store = MemoryStore::new();
        store.put_verification("old", verification(1_000), 0).await.unwrap();
        store.put_verification("live", verification(5_000), 0).await.unwrap();

        store.put_verification("new", verification(9_000), 2_000).await.unwrap();

        assert!(store.get_verification("old").await.unwrap().is_none());
        assert!(store.get_verification("live").await.unwrap().is_some());
        assert!(store.get_verification("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_verification_removed_at_limit() {
        let store = MemoryStore::new();
        store.put_verification("v", verification(5_000), 0).await.unwrap();

        assert_eq!(store.record_failed_verification("v", 3).await.unwrap(), 1);
        assert_eq!(store.record_failed_verification("v", 3).await.unwrap(), 2);
        assert_eq!(
            store.get_verification("v").await.unwrap().unwrap().failed_attempts,
            2
        );
        assert_eq!(store.record_failed_verification("v", 3).await.unwrap(), 3);
        assert!(store.get_verification("v").await.unwrap().is_none());
    }

    fn account(id: &str, member_id: &str) -> Account {
        Account {
            id: id.into(),
            member_id: member_id.into(),
            name: "Checking".into(),
            currency: "USD".into(),
        }
    }

    #[tokio::test]
    async fn test_stale_update_rejected() {
        let (store, state) = store_with_member("m:alice").await;

        let first = MemberUpdate::new(
            "m:alice",
            state.last_hash.clone(),
            vec![MemberOperation::add_alias(Alias::email("a@example.com"))],
        );
        let second = MemberUpdate::new(
            "m:alice",
            state.last_hash.clone(),
            vec![MemberOperation::add_alias(Alias::email("b@example.com"))],
        );

        store.apply_member_update(&first).await.unwrap();
        let err = store.apply_member_update(&second).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Rejected(paylink_core::CoreError::StaleHash { .. })
        ));

        let current = store.get_member("m:alice").await.unwrap().unwrap();
        assert_eq!(current.aliases.len(), 1);
        assert_eq!(store.member_log("m:alice").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_alias_is_exclusive() {
        let (store, alice) = store_with_member("m:alice").await;
        let update = MemberUpdate::new(
            "m:alice",
            alice.last_hash.clone(),
            vec![MemberOperation::add_alias(Alias::email("Shared@Example.com"))],
        );
        store.apply_member_update(&update).await.unwrap();

        store
            .allocate_member("m:bob", MemberType::Personal)
            .await
            .unwrap();
        let steal = MemberUpdate::new(
            "m:bob",
            "",
            vec![MemberOperation::add_alias(Alias::email("shared@example.com"))],
        );
        let err = store.apply_member_update(&steal).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));

        let owner = store
            .resolve_alias(&Alias::email("SHARED@example.com"))
            .await
            .unwrap();
        assert_eq!(owner.as_deref(), Some("m:alice"));
    }

    #[tokio::test]
    async fn test_token_cas() {
        let store = MemoryStore::new();
        let payload = TokenPayload::access(vec![paylink_core::Resource::AllAccounts])
            .from("m:alice")
            .redeemer("m:tpp")
            .build()
            .unwrap();
        let token = Token::new(payload).unwrap();
        let stored = store.insert_token(token.clone()).await.unwrap();
        assert_eq!(store.insert_token(token.clone()).await.unwrap(), stored);

        let mut first = stored.clone();
        first.state = paylink_core::TokenState::Cancelled;
        store.update_token(&stored, first).await.unwrap();

        let mut second = stored.clone();
        second.state = paylink_core::TokenState::Endorsed;
        let err = store.update_token(&stored, second).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_transfer_idempotent_and_limited() {
        let (store, _) = store_with_member("m:alice").await;
        store
            .insert_account(account("acct:1", "m:alice"), Amount::from_whole(500))
            .await
            .unwrap();

        let make = |ref_id: &str, amount: &str| TransferRecord {
            transfer: Transfer {
                id: format!("t:{}", ref_id),
                payload: TransferPayload::new("tt:1", ref_id),
                amount: amount.into(),
                currency: "USD".into(),
                status: TransactionStatus::Success,
                redeemer_id: "m:bob".into(),
                created_at_ms: 1,
            },
            token_limit: Amount::from_whole(100),
            source_account_id: "acct:1".into(),
            destination_account_id: None,
        };

        let first = store.record_transfer(make("r1", "60")).await.unwrap();
        let again = store.record_transfer(make("r1", "60")).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(store.list_transfers(Some("tt:1")).await.unwrap().len(), 1);

        let err = store.record_transfer(make("r2", "60")).await.unwrap_err();
        assert!(matches!(err, StorageError::Precondition(_)));

        assert_eq!(
            store.get_balance("acct:1").await.unwrap(),
            Some(Amount::from_whole(440))
        );
        assert_eq!(store.list_transactions("acct:1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transfer_into_other_currency_leaves_balances() {
        let (store, _) = store_with_member("m:alice").await;
        store
            .insert_account(account("acct:1", "m:alice"), Amount::from_whole(500))
            .await
            .unwrap();
        let mut euros = account("acct:2", "m:bob");
        euros.currency = "EUR".into();
        store.insert_account(euros, Amount::ZERO).await.unwrap();

        let record = TransferRecord {
            transfer: Transfer {
                id: "t:r1".into(),
                payload: TransferPayload::new("tt:1", "r1"),
                amount: "60".into(),
                currency: "USD".into(),
                status: TransactionStatus::Success,
                redeemer_id: "m:bob".into(),
                created_at_ms: 1,
            },
            token_limit: Amount::from_whole(100),
            source_account_id: "acct:1".into(),
            destination_account_id: Some("acct:2".into()),
        };
        let err = store.record_transfer(record).await.unwrap_err();
        assert!(matches!(err, StorageError::Precondition(_)));

        assert_eq!(
            store.get_balance("acct:1").await.unwrap(),
            Some(Amount::from_whole(500))
        );
        assert!(store.list_transactions("acct:1").await.unwrap().is_empty());
        assert!(store.list_transfers(Some("tt:1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_accounts_checks_ownership() {
        let (store, _) = store_with_member("m:alice").await;
        store
            .insert_account(account("acct:1", "m:alice"), Amount::ZERO)
            .await
            .unwrap();

        let err = store
            .remove_accounts("m:mallory", &["acct:1".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));

        store
            .remove_accounts("m:alice", &["acct:1".to_string()])
            .await
            .unwrap();
        assert!(store.get_account("acct:1").await.unwrap().is_none());
    }
}
