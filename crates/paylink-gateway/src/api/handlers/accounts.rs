//! Account handlers
//!
//! A member reads its own accounts directly. A grantee reads another
//! member's accounts by naming an endorsed access token in `on_behalf_of`,
//! and sees only the resources that token grants.

use paylink_core::{AccessBody, Account, Amount, Balance, Resource, Response, TransferEndpoint};

use super::{AppState, Caller};
use crate::api::error::ApiError;

/// Whose accounts a call reads, and under which grant
struct Scope {
    owner: String,
    grant: Option<AccessBody>,
}

impl Scope {
    fn allows(&self, resource: &Resource) -> bool {
        self.grant.as_ref().map_or(true, |g| g.grants(resource))
    }
}

async fn scope(state: &AppState, caller: &Caller) -> Result<Scope, ApiError> {
    let Some(token_id) = &caller.on_behalf_of else {
        return Ok(Scope {
            owner: caller.member_id().to_string(),
            grant: None,
        });
    };

    let token = state
        .store
        .get_token(token_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(format!("unknown access token {}", token_id)))?;
    let body = token
        .payload
        .access_body()
        .ok_or_else(|| ApiError::Unauthorized(format!("{} is not an access token", token_id)))?;
    if token.payload.redeemer_id() != Some(caller.member_id()) {
        return Err(ApiError::Unauthorized(format!(
            "access token {} was not granted to {}",
            token_id,
            caller.member_id()
        )));
    }
    if !token.is_endorsed() {
        return Err(ApiError::PreconditionFailed(format!(
            "access token {} is {:?}",
            token_id, token.state
        )));
    }
    if token.payload.is_expired(state.clock.now_ms()) {
        return Err(ApiError::PreconditionFailed(format!(
            "access token {} has expired",
            token_id
        )));
    }

    Ok(Scope {
        owner: token.payload.from.id.clone(),
        grant: Some(body.clone()),
    })
}

/// Load an account of the scope's owner, if the scope grants `resource`
async fn account_for(
    state: &AppState,
    scope: &Scope,
    account_id: &str,
    resource: Resource,
) -> Result<Account, ApiError> {
    if !scope.allows(&resource) {
        return Err(ApiError::Unauthorized(format!(
            "access token does not grant {:?}",
            resource
        )));
    }
    state
        .store
        .get_account(account_id)
        .await?
        .filter(|a| a.member_id == scope.owner)
        .ok_or_else(|| ApiError::NotFound(format!("account {}", account_id)))
}

async fn balance_of(state: &AppState, account: &Account) -> Result<Amount, ApiError> {
    state
        .store
        .get_balance(&account.id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("account {} has no balance", account.id)))
}

pub async fn get_accounts(state: &AppState, caller: &Caller) -> Result<Response, ApiError> {
    let scope = scope(state, caller).await?;
    let accounts = state
        .store
        .list_accounts(&scope.owner)
        .await?
        .into_iter()
        .filter(|a| {
            scope.allows(&Resource::Account {
                account_id: a.id.clone(),
            })
        })
        .collect();
    Ok(Response::Accounts { accounts })
}

pub async fn get_balance(
    state: &AppState,
    caller: &Caller,
    account_id: &str,
) -> Result<Response, ApiError> {
    let scope = scope(state, caller).await?;
    let resource = Resource::Balance {
        account_id: account_id.to_string(),
    };
    let account = account_for(state, &scope, account_id, resource).await?;
    let amount = balance_of(state, &account).await?.to_string();
    Ok(Response::Balance {
        balance: Balance {
            account_id: account.id,
            current: amount.clone(),
            available: amount,
            currency: account.currency,
        },
    })
}

pub async fn get_transactions(
    state: &AppState,
    caller: &Caller,
    account_id: &str,
) -> Result<Response, ApiError> {
    let scope = scope(state, caller).await?;
    let resource = Resource::Transactions {
        account_id: account_id.to_string(),
    };
    let account = account_for(state, &scope, account_id, resource).await?;
    let transactions = state.store.list_transactions(&account.id).await?;
    Ok(Response::Transactions { transactions })
}

pub async fn resolve_transfer_destinations(
    state: &AppState,
    caller: &Caller,
    account_id: &str,
) -> Result<Response, ApiError> {
    let scope = scope(state, caller).await?;
    let resource = Resource::TransferDestinations {
        account_id: account_id.to_string(),
    };
    let account = account_for(state, &scope, account_id, resource).await?;
    Ok(Response::TransferEndpoints {
        endpoints: vec![TransferEndpoint {
            account_id: account.id,
            bank_id: Some(state.config.name.clone()),
        }],
    })
}

pub async fn confirm_funds(
    state: &AppState,
    caller: &Caller,
    account_id: &str,
    amount: &str,
    currency: &str,
) -> Result<Response, ApiError> {
    let requested = Amount::parse(amount)?;
    let scope = scope(state, caller).await?;
    let resource = Resource::Balance {
        account_id: account_id.to_string(),
    };
    let account = account_for(state, &scope, account_id, resource).await?;
    if account.currency != currency {
        return Err(ApiError::BadRequest(format!(
            "account {} holds {}, not {}",
            account.id, account.currency, currency
        )));
    }
    let balance = balance_of(state, &account).await?;
    Ok(Response::FundsConfirmed {
        sufficient: balance >= requested,
    })
}

pub async fn unlink_accounts(
    state: &AppState,
    caller: &Caller,
    account_ids: &[String],
) -> Result<Response, ApiError> {
    if caller.on_behalf_of.is_some() {
        return Err(ApiError::Unauthorized(
            "accounts can only be unlinked by their owner".into(),
        ));
    }
    state
        .store
        .remove_accounts(caller.member_id(), account_ids)
        .await?;
    tracing::info!(member_id = %caller.member_id(), count = account_ids.len(), "Accounts unlinked");
    Ok(Response::Empty)
}
