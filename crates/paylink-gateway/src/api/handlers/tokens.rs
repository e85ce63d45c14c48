//! Token lifecycle handlers
//!
//! ```text
//! CREATED -> PARTIALLY_ENDORSED -> ENDORSED
//!    |              |                 |
//!    +--------------+-----------------+--> CANCELLED | REPLACED
//! ```
//!
//! Every transition is a compare-and-swap on the full stored token, so of two
//! racing transitions from the same state exactly one is applied.

use paylink_core::{
    Action, EndorsementStatus, Response, Token, TokenKind, TokenOperationResult, TokenPayload,
    TokenReplaceResult, TokenSignature, TokenState,
};
use tracing::{info, warn};

use super::{AppState, Caller};
use crate::api::error::ApiError;
use crate::core::verify_token_signature;
use crate::storage::StorageError;

fn is_party(token: &Token, member_id: &str) -> bool {
    token.payload.from.id == member_id || token.payload.redeemer_id() == Some(member_id)
}

/// Load a token visible to `caller`; tokens of other members read as missing
async fn visible_token(
    state: &AppState,
    caller: &Caller,
    token_id: &str,
) -> Result<Token, ApiError> {
    state
        .store
        .get_token(token_id)
        .await?
        .filter(|t| is_party(t, caller.member_id()))
        .ok_or_else(|| ApiError::NotFound(format!("token {}", token_id)))
}

fn check_usable(state: &AppState, token: &Token) -> Result<(), ApiError> {
    if token.state.is_terminal() {
        return Err(ApiError::PreconditionFailed(format!(
            "token {} is {:?}",
            token.id, token.state
        )));
    }
    if token.payload.is_expired(state.clock.now_ms()) {
        return Err(ApiError::PreconditionFailed(format!(
            "token {} has expired",
            token.id
        )));
    }
    Ok(())
}

/// The source account of a transfer token must still be linked to its issuer
async fn check_source_account(state: &AppState, payload: &TokenPayload) -> Result<(), ApiError> {
    let Some(body) = payload.transfer_body() else {
        return Ok(());
    };
    let account_id = body.source_account_id.as_deref().unwrap_or_default();
    match state.store.get_account(account_id).await? {
        Some(account) if account.member_id == payload.from.id => {
            if account.currency != body.currency {
                return Err(ApiError::InvalidPayload(format!(
                    "account {} holds {}, token is in {}",
                    account.id, account.currency, body.currency
                )));
            }
            Ok(())
        }
        _ => Err(ApiError::PreconditionFailed(format!(
            "source account {} is not linked to {}",
            account_id, payload.from.id
        ))),
    }
}

/// Apply an endorsement to `token` without storing it
fn endorse(state: &AppState, token: &Token, signature: TokenSignature) -> Result<Token, ApiError> {
    let required = token
        .payload
        .required_endorsement_level(state.config.privileged_amount_threshold)?;

    let mut endorsed = token.clone();
    endorsed.signatures.push(signature);
    endorsed.state = match endorsed.endorsement_level() {
        Some(level) if level >= required => TokenState::Endorsed,
        _ => TokenState::PartiallyEndorsed,
    };
    Ok(endorsed)
}

fn status_of(token: &Token) -> EndorsementStatus {
    if token.is_endorsed() {
        EndorsementStatus::Success
    } else {
        EndorsementStatus::MoreSignaturesNeeded
    }
}

/// Checks every newly issued token passes, whether created or a replacement
async fn check_new_payload(
    state: &AppState,
    caller: &Caller,
    payload: &TokenPayload,
) -> Result<(), ApiError> {
    payload.validate()?;

    if payload.from.id != caller.member_id() {
        return Err(ApiError::Unauthorized(
            "tokens can only be issued by their payer".into(),
        ));
    }
    if payload.is_expired(state.clock.now_ms()) {
        return Err(ApiError::InvalidPayload("token is already expired".into()));
    }

    let redeemer = payload.redeemer_id().unwrap_or_default();
    if state.store.get_member(redeemer).await?.is_none() {
        return Err(ApiError::InvalidPayload(format!(
            "unknown redeemer {}",
            redeemer
        )));
    }
    check_source_account(state, payload).await
}

pub async fn create_token(
    state: &AppState,
    caller: &Caller,
    payload: TokenPayload,
) -> Result<Response, ApiError> {
    check_new_payload(state, caller, &payload).await?;

    let token = state.store.insert_token(Token::new(payload)?).await?;
    info!(token_id = %token.id, kind = ?token.payload.kind(), issuer = %caller.member_id(), "Token created");
    Ok(Response::Token { token })
}

pub async fn get_token(
    state: &AppState,
    caller: &Caller,
    token_id: &str,
) -> Result<Response, ApiError> {
    let token = visible_token(state, caller, token_id).await?;
    Ok(Response::Token { token })
}

pub async fn get_tokens(
    state: &AppState,
    caller: &Caller,
    kind: TokenKind,
) -> Result<Response, ApiError> {
    let tokens = state.store.list_tokens(caller.member_id(), kind).await?;
    Ok(Response::Tokens { tokens })
}

pub async fn endorse_token(
    state: &AppState,
    caller: &Caller,
    token_id: &str,
    signature: TokenSignature,
) -> Result<Response, ApiError> {
    let token = visible_token(state, caller, token_id).await?;
    if token.payload.from.id != caller.member_id() {
        return Err(ApiError::Unauthorized(
            "only the issuer may endorse a token".into(),
        ));
    }
    verify_token_signature(&token.id, &signature, Action::Endorsed, &caller.member)?;
    check_usable(state, &token)?;
    check_source_account(state, &token.payload).await?;

    if token.is_endorsed() {
        return Ok(Response::TokenOperation {
            result: TokenOperationResult {
                token,
                status: EndorsementStatus::Success,
            },
        });
    }

    let level = signature.level;
    let endorsed = endorse(state, &token, signature)?;
    let token = state.store.update_token(&token, endorsed).await?;
    let status = status_of(&token);

    info!(token_id = %token.id, key_level = %level, status = ?status, "Token endorsed");
    Ok(Response::TokenOperation {
        result: TokenOperationResult { token, status },
    })
}

pub async fn cancel_token(
    state: &AppState,
    caller: &Caller,
    token_id: &str,
    signature: TokenSignature,
) -> Result<Response, ApiError> {
    let token = visible_token(state, caller, token_id).await?;
    verify_token_signature(&token.id, &signature, Action::Cancelled, &caller.member)?;
    if token.state.is_terminal() {
        return Err(ApiError::PreconditionFailed(format!(
            "token {} is already {:?}",
            token.id, token.state
        )));
    }

    let mut cancelled = token.clone();
    cancelled.signatures.push(signature);
    cancelled.state = TokenState::Cancelled;
    let token = state.store.update_token(&token, cancelled).await?;

    info!(token_id = %token.id, member_id = %caller.member_id(), "Token cancelled");
    Ok(Response::TokenOperation {
        result: TokenOperationResult {
            token,
            status: EndorsementStatus::Success,
        },
    })
}

/// Cancel a token and create its successor atomically
///
/// Submitting the same replacement twice returns the first result. A
/// replacement that loses a race against another replacement or a
/// cancellation fails with a concurrent modification error.
pub async fn replace_token(
    state: &AppState,
    caller: &Caller,
    token_id: &str,
    cancel_signature: TokenSignature,
    payload: TokenPayload,
    endorsement: Option<TokenSignature>,
) -> Result<Response, ApiError> {
    let token = visible_token(state, caller, token_id).await?;
    if token.payload.from.id != caller.member_id() || payload.from.id != caller.member_id() {
        return Err(ApiError::Unauthorized(
            "only the issuer may replace a token".into(),
        ));
    }

    payload.validate()?;
    if payload.kind() != token.payload.kind() {
        return Err(ApiError::InvalidPayload(
            "replacement must be of the same kind".into(),
        ));
    }
    let successor = Token::new(payload)?;
    let successor_id = successor.id.clone();

    if let Some(response) = replay_replacement(state, &token, &successor_id).await? {
        return Ok(response);
    }
    check_usable(state, &token)?;

    verify_token_signature(&token.id, &cancel_signature, Action::Cancelled, &caller.member)?;
    check_new_payload(state, caller, &successor.payload).await?;

    let mut cancelled = token.clone();
    cancelled.signatures.push(cancel_signature);
    cancelled.state = TokenState::Replaced;
    cancelled.replaced_by_token_id = Some(successor.id.clone());

    let created = match endorsement {
        Some(signature) => {
            verify_token_signature(&successor.id, &signature, Action::Endorsed, &caller.member)?;
            endorse(state, &successor, signature)?
        }
        None => successor,
    };

    match state.store.replace_token(&token, cancelled, created).await {
        Ok((cancelled, created)) => {
            let status = status_of(&created);
            info!(token_id = %cancelled.id, replacement_id = %created.id, status = ?status, "Token replaced");
            Ok(Response::TokenReplaced {
                result: TokenReplaceResult {
                    cancelled,
                    created,
                    status,
                },
            })
        }
        Err(StorageError::Conflict(msg)) => {
            // A retry of this same replacement may have won the race
            let current = state
                .store
                .get_token(&token.id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("token {}", token.id)))?;
            if current.replaced_by_token_id.as_deref() == Some(successor_id.as_str()) {
                if let Some(response) = replay_replacement(state, &current, &successor_id).await? {
                    return Ok(response);
                }
            }
            warn!(token_id = %token.id, "Token replacement lost a race");
            Err(ApiError::ConcurrentModification(msg))
        }
        Err(e) => Err(e.into()),
    }
}

/// Outcome of a replacement already applied to `token`
///
/// `None` if `token` has not been replaced yet. A token replaced by anything
/// other than `successor_id` cannot be replaced again.
async fn replay_replacement(
    state: &AppState,
    token: &Token,
    successor_id: &str,
) -> Result<Option<Response>, ApiError> {
    match token.state {
        TokenState::Replaced => {
            if token.replaced_by_token_id.as_deref() != Some(successor_id) {
                return Err(ApiError::ConcurrentModification(format!(
                    "token {} was already replaced by {}",
                    token.id,
                    token.replaced_by_token_id.as_deref().unwrap_or("another token")
                )));
            }
            let created = state
                .store
                .get_token(successor_id)
                .await?
                .ok_or_else(|| ApiError::Internal(format!("successor {} missing", successor_id)))?;
            let status = status_of(&created);
            Ok(Some(Response::TokenReplaced {
                result: TokenReplaceResult {
                    cancelled: token.clone(),
                    created,
                    status,
                },
            }))
        }
        _ => Ok(None),
    }
}
