//! A member of the network, acting as itself

use paylink_core::{
    Alias, Key, KeyLevel, MemberOperation, MemberState, MemberView, RecoveryRule,
};
use tracing::info;

use crate::authenticated::AuthenticatedClient;
use crate::authorizer::TokenAuthorizer;
use crate::context::AuthenticationContext;
use crate::error::Result;
use crate::mutator::MemberMutator;
use crate::representable::{Representable, Representative};
use crate::token_client::TokenClient;

#[derive(Clone)]
pub struct Member {
    client: AuthenticatedClient,
}

impl std::fmt::Debug for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Member")
            .field("member_id", &self.member_id())
            .finish()
    }
}

impl Member {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self { client }
    }

    pub fn member_id(&self) -> &str {
        self.client.member_id()
    }

    pub fn mutator(&self) -> MemberMutator {
        MemberMutator::new(self.client.clone())
    }

    pub fn authorizer(&self) -> TokenAuthorizer {
        TokenAuthorizer::new(self.client.clone())
    }

    pub fn tokens(&self) -> TokenClient {
        TokenClient::new(self.client.clone())
    }

    /// Act on behalf of the grantor of `access_token_id`
    pub fn representative(&self, access_token_id: impl Into<String>) -> Representative {
        Representative::new(self.client.clone(), access_token_id)
    }

    // ========================================================================
    // State
    // ========================================================================

    pub async fn state(&self) -> Result<MemberState> {
        self.client.get_member(self.member_id()).await
    }

    pub async fn view(&self) -> Result<MemberView> {
        self.mutator().current_view().await
    }

    pub async fn keys(&self) -> Result<Vec<Key>> {
        Ok(self.state().await?.keys)
    }

    pub async fn aliases(&self) -> Result<Vec<Alias>> {
        Ok(self.state().await?.aliases)
    }

    pub async fn resolve_alias(&self, alias: &Alias) -> Result<Option<String>> {
        self.client.resolve_alias(alias).await
    }

    // ========================================================================
    // Updates
    //
    // Each reads the current hash and submits once. A concurrent writer
    // surfaces as `ConcurrentModification`.
    // ========================================================================

    pub async fn update(&self, operations: Vec<MemberOperation>) -> Result<MemberState> {
        self.mutator().update(operations).await
    }

    pub async fn add_alias(&self, alias: Alias) -> Result<MemberState> {
        self.update(vec![MemberOperation::add_alias(alias)]).await
    }

    pub async fn add_aliases(&self, aliases: Vec<Alias>) -> Result<MemberState> {
        self.update(aliases.into_iter().map(MemberOperation::add_alias).collect())
            .await
    }

    pub async fn remove_alias(&self, alias: Alias) -> Result<MemberState> {
        self.update(vec![MemberOperation::remove_alias(alias)]).await
    }

    pub async fn add_key(&self, key: Key) -> Result<MemberState> {
        self.update(vec![MemberOperation::add_key(key)]).await
    }

    /// Generate a key at `level` and register it with the gateway
    ///
    /// The key reaches the local store only once the gateway accepted it.
    /// On an `Outcome::Unknown` failure the key may be registered remotely
    /// but is not stored; remove it by id once the member state is known.
    pub async fn approve_new_key(&self, level: KeyLevel) -> Result<Key> {
        let crypto = self.client.signer().crypto();
        let pair = crypto.stage_key(level);
        let key = pair.key();
        self.add_key(key.clone()).await?;
        crypto.commit_key(&pair)?;
        Ok(key)
    }

    pub async fn remove_key(&self, key_id: &str) -> Result<MemberState> {
        self.update(vec![MemberOperation::remove_key(key_id)]).await
    }

    pub async fn set_recovery_rule(&self, rule: RecoveryRule) -> Result<MemberState> {
        self.update(vec![MemberOperation::SetRecoveryRule { rule }])
            .await
    }

    pub async fn delete(&self) -> Result<()> {
        self.client.delete_member().await?;
        info!(member_id = %self.member_id(), "Member deleted");
        Ok(())
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    pub async fn unlink_accounts(&self, account_ids: Vec<String>) -> Result<()> {
        self.client.unlink_accounts(account_ids).await
    }
}

impl Representable for Member {
    fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    fn context(&self) -> AuthenticationContext {
        AuthenticationContext::default()
    }
}
