//! Synchronous adapter over the async client
//!
//! Each wrapper drives the async operation to completion on a shared
//! current-thread runtime. Do not call these from inside another tokio
//! runtime; `block_on` panics there.

use paylink_core::{
    Alias, Balance, KeyLevel, MemberState, MemberType, Token, TokenOperationResult, TokenPayload,
    TokenReplaceResult, Transfer,
};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

use crate::error::{ClientError, Result};
use crate::member::Member;
use crate::representable::Representable;
use crate::token_client::TokenClient;
use crate::unauthenticated::UnauthenticatedClient;
use crate::Account;

fn runtime() -> Result<Arc<Runtime>> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map(Arc::new)
        .map_err(|e| ClientError::Config(format!("cannot start runtime: {}", e)))
}

pub struct BlockingClient {
    inner: UnauthenticatedClient,
    runtime: Arc<Runtime>,
}

impl BlockingClient {
    pub fn new(inner: UnauthenticatedClient) -> Result<Self> {
        Ok(Self {
            inner,
            runtime: runtime()?,
        })
    }

    pub fn resolve_alias(&self, alias: &Alias) -> Result<Option<String>> {
        self.runtime.block_on(self.inner.resolve_alias(alias))
    }

    pub fn register_member(
        &self,
        member_type: MemberType,
        aliases: Vec<Alias>,
        store: Arc<dyn paylink_core::KeyStore>,
    ) -> Result<BlockingMember> {
        let member = self
            .runtime
            .block_on(self.inner.register_member(member_type, aliases, store))?;
        Ok(BlockingMember::with_runtime(member, self.runtime.clone()))
    }

    pub fn login(&self, member_id: &str, store: Arc<dyn paylink_core::KeyStore>) -> BlockingMember {
        BlockingMember::with_runtime(self.inner.login(member_id, store), self.runtime.clone())
    }
}

pub struct BlockingMember {
    inner: Member,
    runtime: Arc<Runtime>,
}

impl BlockingMember {
    pub fn new(inner: Member) -> Result<Self> {
        Ok(Self::with_runtime(inner, runtime()?))
    }

    fn with_runtime(inner: Member, runtime: Arc<Runtime>) -> Self {
        Self { inner, runtime }
    }

    pub fn member_id(&self) -> &str {
        self.inner.member_id()
    }

    /// The async member underneath
    pub fn inner(&self) -> &Member {
        &self.inner
    }

    pub fn state(&self) -> Result<MemberState> {
        self.runtime.block_on(self.inner.state())
    }

    pub fn add_alias(&self, alias: Alias) -> Result<MemberState> {
        self.runtime.block_on(self.inner.add_alias(alias))
    }

    pub fn remove_alias(&self, alias: Alias) -> Result<MemberState> {
        self.runtime.block_on(self.inner.remove_alias(alias))
    }

    pub fn approve_new_key(&self, level: KeyLevel) -> Result<paylink_core::Key> {
        self.runtime.block_on(self.inner.approve_new_key(level))
    }

    pub fn remove_key(&self, key_id: &str) -> Result<MemberState> {
        self.runtime.block_on(self.inner.remove_key(key_id))
    }

    pub fn delete(&self) -> Result<()> {
        self.runtime.block_on(self.inner.delete())
    }

    pub fn get_accounts(&self) -> Result<Vec<Account>> {
        self.runtime.block_on(self.inner.get_accounts())
    }

    pub fn get_balance(&self, account_id: &str) -> Result<Balance> {
        self.runtime.block_on(self.inner.get_balance(account_id))
    }

    pub fn tokens(&self) -> BlockingTokenClient {
        BlockingTokenClient {
            inner: self.inner.tokens(),
            runtime: self.runtime.clone(),
        }
    }
}

pub struct BlockingTokenClient {
    inner: TokenClient,
    runtime: Arc<Runtime>,
}

impl BlockingTokenClient {
    pub fn create(&self, payload: TokenPayload) -> Result<Token> {
        self.runtime.block_on(self.inner.create(payload))
    }

    pub fn endorse(&self, token: &Token, level: KeyLevel) -> Result<TokenOperationResult> {
        self.runtime.block_on(self.inner.endorse(token, level))
    }

    pub fn cancel(&self, token: &Token) -> Result<TokenOperationResult> {
        self.runtime.block_on(self.inner.cancel(token))
    }

    pub fn replace(&self, token: &Token, payload: TokenPayload) -> Result<TokenReplaceResult> {
        self.runtime.block_on(self.inner.replace(token, payload))
    }

    pub fn get_token(&self, token_id: &str) -> Result<Token> {
        self.runtime.block_on(self.inner.get_token(token_id))
    }

    pub fn redeem(
        &self,
        token: &Token,
        amount: Option<&str>,
        description: Option<&str>,
        ref_id: &str,
    ) -> Result<Transfer> {
        self.runtime
            .block_on(self.inner.redeem(token, amount, description, ref_id))
    }

    pub fn get_transfers(&self, token_id: Option<&str>) -> Result<Vec<Transfer>> {
        self.runtime.block_on(self.inner.get_transfers(token_id))
    }

    /// The async token client underneath
    pub fn inner(&self) -> &TokenClient {
        &self.inner
    }
}
