//! Transfer (token redemption) handlers

use paylink_core::{Amount, Response, TransactionStatus, Transfer, TransferPayload};
use sha2::{Digest, Sha256};
use tracing::info;

use super::{AppState, Caller};
use crate::api::error::ApiError;
use crate::storage::TransferRecord;

/// Transfer ids are derived from `(token_id, ref_id)` so retries name the same transfer
fn transfer_id(token_id: &str, ref_id: &str) -> String {
    let digest = Sha256::new()
        .chain_update(token_id.as_bytes())
        .chain_update(b"|")
        .chain_update(ref_id.as_bytes())
        .finalize();
    format!("t:{}", &hex::encode(digest)[..32])
}

/// Whether `caller` redeemed the transfer or issued its token
async fn can_see(state: &AppState, caller: &Caller, transfer: &Transfer) -> Result<bool, ApiError> {
    if transfer.redeemer_id == caller.member_id() {
        return Ok(true);
    }
    let issuer = state
        .store
        .get_token(&transfer.payload.token_id)
        .await?
        .map(|t| t.payload.from.id);
    Ok(issuer.as_deref() == Some(caller.member_id()))
}

pub async fn create_transfer(
    state: &AppState,
    caller: &Caller,
    payload: TransferPayload,
) -> Result<Response, ApiError> {
    if payload.ref_id.trim().is_empty() {
        return Err(ApiError::InvalidPayload("ref id is required".into()));
    }

    if let Some(transfer) = state
        .store
        .find_transfer(&payload.token_id, &payload.ref_id)
        .await?
    {
        if transfer.redeemer_id != caller.member_id() {
            return Err(ApiError::Unauthorized(
                "ref id already used by another redeemer".into(),
            ));
        }
        return Ok(Response::Transfer { transfer });
    }

    let token = state
        .store
        .get_token(&payload.token_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("token {}", payload.token_id)))?;
    let body = token
        .payload
        .transfer_body()
        .ok_or_else(|| ApiError::InvalidPayload("access tokens cannot be redeemed".into()))?;

    if token.payload.redeemer_id() != Some(caller.member_id()) {
        return Err(ApiError::Unauthorized(
            "only the token's redeemer may redeem it".into(),
        ));
    }
    if !token.is_endorsed() {
        return Err(ApiError::PreconditionFailed(format!(
            "token {} is {:?}",
            token.id, token.state
        )));
    }
    let now_ms = state.clock.now_ms();
    if token.payload.is_expired(now_ms) {
        return Err(ApiError::PreconditionFailed(format!(
            "token {} has expired",
            token.id
        )));
    }

    let limit = Amount::parse(&body.amount)?;
    let amount = match &payload.amount {
        Some(amount) => Amount::parse(amount)?,
        None => limit,
    };
    if amount.is_zero() {
        return Err(ApiError::InvalidPayload("amount must be positive".into()));
    }
    if let Some(currency) = &payload.currency {
        if *currency != body.currency {
            return Err(ApiError::InvalidPayload(format!(
                "token is in {}, transfer asks for {}",
                body.currency, currency
            )));
        }
    }
    if let Some(destination) = &payload.destination {
        let account = state
            .store
            .get_account(&destination.account_id)
            .await?
            .ok_or_else(|| {
                ApiError::InvalidPayload(format!(
                    "unknown destination account {}",
                    destination.account_id
                ))
            })?;
        if account.currency != body.currency {
            return Err(ApiError::InvalidPayload(format!(
                "destination account {} holds {}, token is in {}",
                account.id, account.currency, body.currency
            )));
        }
    }
    let source_account_id = body
        .source_account_id
        .clone()
        .ok_or_else(|| ApiError::InvalidPayload("token has no source account".into()))?;

    let record = TransferRecord {
        transfer: Transfer {
            id: transfer_id(&payload.token_id, &payload.ref_id),
            amount: amount.to_string(),
            currency: body.currency.clone(),
            status: TransactionStatus::Success,
            redeemer_id: caller.member_id().to_string(),
            created_at_ms: now_ms,
            payload: payload.clone(),
        },
        token_limit: limit,
        source_account_id,
        destination_account_id: payload.destination.as_ref().map(|d| d.account_id.clone()),
    };
    let transfer = state.store.record_transfer(record).await?;

    info!(
        transfer_id = %transfer.id,
        token_id = %token.id,
        amount = %transfer.amount,
        currency = %transfer.currency,
        "Token redeemed"
    );
    Ok(Response::Transfer { transfer })
}

pub async fn get_transfer(
    state: &AppState,
    caller: &Caller,
    transfer_id: &str,
) -> Result<Response, ApiError> {
    let not_found = || ApiError::NotFound(format!("transfer {}", transfer_id));
    let transfer = state
        .store
        .get_transfer(transfer_id)
        .await?
        .ok_or_else(not_found)?;
    if !can_see(state, caller, &transfer).await? {
        return Err(not_found());
    }
    Ok(Response::Transfer { transfer })
}

pub async fn get_transfers(
    state: &AppState,
    caller: &Caller,
    token_id: Option<&str>,
) -> Result<Response, ApiError> {
    let mut transfers = Vec::new();
    for transfer in state.store.list_transfers(token_id).await? {
        if can_see(state, caller, &transfer).await? {
            transfers.push(transfer);
        }
    }
    Ok(Response::Transfers { transfers })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_id_is_stable() {
        assert_eq!(transfer_id("tt:1", "r1"), transfer_id("tt:1", "r1"));
        assert_ne!(transfer_id("tt:1", "r1"), transfer_id("tt:1", "r2"));
        assert!(transfer_id("tt:1", "r1").starts_with("t:"));
    }
}
