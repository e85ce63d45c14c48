//! API request handlers
//!
//! Every call arrives as one `Envelope` on `POST /v1/rpc`. `AppState::handle`
//! checks the client version, authenticates the call against the signing
//! member's keys and the required-level table, then dispatches to the
//! handler for the request.

pub mod accounts;
pub mod members;
pub mod recovery;
pub mod tokens;
pub mod transfers;

use axum::{extract::State, Json};
use paylink_core::{
    policy, Account, Amount, Clock, Envelope, Key, MemberState, Request, Response, SystemClock,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::error::ApiError;
use crate::config::GatewayConfig;
use crate::core::{check_client_version, check_clock_skew, verify_call};
use crate::keys::KeyRegistry;
use crate::notify::{LoggingNotifier, Notifier};
use crate::storage::{GatewayStore, MemoryStore};

/// Application state shared across handlers
pub struct AppState {
    /// Recovery agent keys
    pub registry: KeyRegistry,
    /// Members, tokens, transfers and accounts
    pub store: Arc<dyn GatewayStore>,
    /// Delivery of recovery codes
    pub notifier: Arc<dyn Notifier>,
    /// Time source for skew checks and expiry
    pub clock: Arc<dyn Clock>,
    /// Gateway configuration
    pub config: GatewayConfig,
}

/// The authenticated originator of a call
#[derive(Debug, Clone)]
pub struct Caller {
    /// Signing member's state as read during authentication
    pub member: MemberState,
    /// Key that signed the call
    pub key: Key,
    /// Access token the caller acts under, if any
    pub on_behalf_of: Option<String>,
    pub customer_initiated: bool,
}

impl Caller {
    pub fn member_id(&self) -> &str {
        &self.member.member_id
    }
}

impl AppState {
    /// State with in-memory storage, a fresh agent key and a logging notifier
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            registry: KeyRegistry::generate(config.agent_id.clone()),
            store: Arc::new(MemoryStore::new()),
            notifier: Arc::new(LoggingNotifier),
            clock: Arc::new(SystemClock::new()),
            config,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn GatewayStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Process one call
    pub async fn handle(&self, envelope: Envelope) -> Result<Response, ApiError> {
        check_client_version(&envelope.client_version, &self.config.min_client_version)?;

        let method = envelope.request.method();
        let caller = if method.requires_authentication() {
            Some(self.authenticate(&envelope).await?)
        } else {
            None
        };

        debug!(
            method = %method,
            member_id = ?caller.as_ref().map(|c| c.member_id().to_string()),
            trace_id = %envelope.trace_id,
            "Handling call"
        );

        let result = self.dispatch(envelope.request, caller).await;
        if let Err(ref err) = result {
            info!(method = %method, code = %err.code(), trace_id = %envelope.trace_id, error = %err, "Call rejected");
        }
        result
    }

    async fn authenticate(&self, envelope: &Envelope) -> Result<Caller, ApiError> {
        let metadata = envelope
            .auth
            .as_ref()
            .ok_or_else(|| ApiError::Unauthorized("call requires signed metadata".into()))?;

        check_clock_skew(
            metadata.created_at_ms,
            self.clock.now_ms(),
            self.config.max_clock_skew,
        )?;

        let member = self
            .store
            .get_member(&metadata.member_id)
            .await?
            .ok_or_else(|| {
                ApiError::Unauthorized(format!("unknown member '{}'", metadata.member_id))
            })?;

        let required = policy::required_level(envelope.request.method());
        let key = verify_call(
            metadata,
            &envelope.request,
            &member,
            &self.config.realm,
            required,
        )?;

        Ok(Caller {
            member,
            key,
            on_behalf_of: metadata.on_behalf_of.clone(),
            customer_initiated: metadata.customer_initiated,
        })
    }

    async fn dispatch(
        &self,
        request: Request,
        caller: Option<Caller>,
    ) -> Result<Response, ApiError> {
        match request {
            // Unauthenticated
            Request::ResolveAlias { alias } => members::resolve_alias(self, alias).await,
            Request::CreateMemberId { member_type } => {
                members::create_member_id(self, member_type).await
            }
            Request::CreateMember {
                update,
                update_signature,
            } => members::create_member(self, update, update_signature).await,
            Request::BeginRecovery { alias } => recovery::begin_recovery(self, alias).await,
            Request::GetRecoveryAuthorization {
                verification_id,
                code,
                key,
            } => recovery::get_recovery_authorization(self, &verification_id, &code, key).await,
            Request::CompleteRecovery {
                update,
                update_signature,
            } => recovery::complete_recovery(self, update, update_signature).await,

            // Authenticated
            request => {
                let caller = caller
                    .ok_or_else(|| ApiError::Unauthorized("call requires signed metadata".into()))?;
                self.dispatch_authenticated(request, &caller).await
            }
        }
    }

    async fn dispatch_authenticated(
        &self,
        request: Request,
        caller: &Caller,
    ) -> Result<Response, ApiError> {
        match request {
            Request::GetMember { member_id } => members::get_member(self, &member_id).await,
            Request::UpdateMember {
                update,
                update_signature,
            } => members::update_member(self, caller, update, update_signature).await,
            Request::DeleteMember => members::delete_member(self, caller).await,

            Request::CreateToken { payload } => tokens::create_token(self, caller, payload).await,
            Request::GetToken { token_id } => tokens::get_token(self, caller, &token_id).await,
            Request::GetTokens { kind } => tokens::get_tokens(self, caller, kind).await,
            Request::EndorseToken {
                token_id,
                signature,
            } => tokens::endorse_token(self, caller, &token_id, signature).await,
            Request::CancelToken {
                token_id,
                signature,
            } => tokens::cancel_token(self, caller, &token_id, signature).await,
            Request::ReplaceToken {
                token_id,
                cancel_signature,
                payload,
                endorsement,
            } => {
                tokens::replace_token(self, caller, &token_id, cancel_signature, payload, endorsement)
                    .await
            }

            Request::CreateTransfer { payload } => {
                transfers::create_transfer(self, caller, payload).await
            }
            Request::GetTransfer { transfer_id } => {
                transfers::get_transfer(self, caller, &transfer_id).await
            }
            Request::GetTransfers { token_id } => {
                transfers::get_transfers(self, caller, token_id.as_deref()).await
            }

            Request::GetAccounts => accounts::get_accounts(self, caller).await,
            Request::GetBalance { account_id } => {
                accounts::get_balance(self, caller, &account_id).await
            }
            Request::GetTransactions { account_id } => {
                accounts::get_transactions(self, caller, &account_id).await
            }
            Request::ResolveTransferDestinations { account_id } => {
                accounts::resolve_transfer_destinations(self, caller, &account_id).await
            }
            Request::ConfirmFunds {
                account_id,
                amount,
                currency,
            } => accounts::confirm_funds(self, caller, &account_id, &amount, &currency).await,
            Request::UnlinkAccounts { account_ids } => {
                accounts::unlink_accounts(self, caller, &account_ids).await
            }

            Request::ResolveAlias { .. }
            | Request::CreateMemberId { .. }
            | Request::CreateMember { .. }
            | Request::BeginRecovery { .. }
            | Request::GetRecoveryAuthorization { .. }
            | Request::CompleteRecovery { .. } => Err(ApiError::Internal(
                "unauthenticated call routed as authenticated".into(),
            )),
        }
    }

    /// Link an account to a member with an opening balance
    ///
    /// Stands in for the bank linking flow.
    pub async fn open_account(
        &self,
        member_id: &str,
        name: &str,
        currency: &str,
        balance: &str,
    ) -> Result<Account, ApiError> {
        let balance = Amount::parse(balance)?;
        let account = Account {
            id: format!("a:{}", uuid::Uuid::new_v4().simple()),
            member_id: member_id.to_string(),
            name: name.to_string(),
            currency: currency.to_string(),
        };
        self.store.insert_account(account.clone(), balance).await?;
        Ok(account)
    }
}

/// Process a signed call
///
/// POST /v1/rpc
pub async fn rpc(
    State(state): State<Arc<AppState>>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<Response>, ApiError> {
    state.handle(envelope).await.map(Json)
}

/// Request to link an account
#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub member_id: String,
    pub name: String,
    pub currency: String,
    /// Opening balance as a decimal string
    pub balance: String,
}

/// Link an account to a member
///
/// POST /v1/admin/accounts
pub async fn open_account(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OpenAccountRequest>,
) -> Result<Json<Account>, ApiError> {
    state
        .open_account(
            &request.member_id,
            &request.name,
            &request.currency,
            &request.balance,
        )
        .await
        .map(Json)
}
