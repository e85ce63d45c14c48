//! Member recovery handlers
//!
//! Recovery proceeds in three unauthenticated steps:
//! 1. `begin_recovery` sends a verification code to the owner of an alias
//! 2. `get_recovery_authorization` exchanges the code for an agent-signed
//!    authorization of a new PRIVILEGED key at the member's current hash
//! 3. `complete_recovery` applies an update carrying that authorization,
//!    signed by the new key

use paylink_core::{
    crypto::key_id_for, policy, Alias, Key, KeyLevel, MemberState, MemberUpdate, Method,
    PublicKey, RecoveryAuthorization, Response, Signature,
};
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use super::AppState;
use crate::api::error::ApiError;
use crate::core::verify_update_signature;
use crate::storage::Verification;

/// Agents allowed to authorize recovery of `member`
fn recovery_agents(state: &AppState, member: &MemberState) -> Vec<String> {
    match &member.recovery_rule {
        Some(rule) => std::iter::once(rule.primary_agent.clone())
            .chain(rule.secondary_agents.iter().cloned())
            .collect(),
        None => vec![state.registry.agent_id().to_string()],
    }
}

pub async fn begin_recovery(state: &AppState, alias: Alias) -> Result<Response, ApiError> {
    let member_id = state
        .store
        .resolve_alias(&alias)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no member with alias {}", alias)))?;

    let verification_id = Uuid::new_v4().to_string();
    let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
    let ttl_ms = i64::try_from(state.config.verification_ttl.as_millis()).unwrap_or(i64::MAX);
    let expires_at_ms = state.clock.now_ms().saturating_add(ttl_ms);

    state
        .store
        .put_verification(
            &verification_id,
            Verification {
                member_id: member_id.clone(),
                code: code.clone(),
                expires_at_ms,
                failed_attempts: 0,
            },
            state.clock.now_ms(),
        )
        .await?;

    state
        .notifier
        .send_verification_code(&alias, &member_id, &code)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    info!(member_id = %member_id, verification_id = %verification_id, "Recovery started");
    Ok(Response::Verification { verification_id })
}

pub async fn get_recovery_authorization(
    state: &AppState,
    verification_id: &str,
    code: &str,
    key: Key,
) -> Result<Response, ApiError> {
    let verification = state
        .store
        .get_verification(verification_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("verification {}", verification_id)))?;

    if verification.expires_at_ms <= state.clock.now_ms() {
        state.store.remove_verification(verification_id).await?;
        return Err(ApiError::PreconditionFailed("verification expired".into()));
    }
    if verification.code != code {
        let max_attempts = state.config.max_verification_attempts;
        let attempts = state
            .store
            .record_failed_verification(verification_id, max_attempts)
            .await?;
        warn!(
            member_id = %verification.member_id,
            verification_id = %verification_id,
            attempts,
            "SECURITY: Wrong recovery verification code"
        );
        if attempts >= max_attempts {
            return Err(ApiError::Unauthorized(
                "verification code mismatch, verification discarded".into(),
            ));
        }
        return Err(ApiError::Unauthorized("verification code mismatch".into()));
    }

    if key.level != KeyLevel::Privileged {
        return Err(ApiError::BadRequest(
            "recovery key must be PRIVILEGED".into(),
        ));
    }
    let public_key = PublicKey::from_key(&key)?;
    if key_id_for(&public_key.to_bytes()) != key.id {
        return Err(ApiError::BadRequest(
            "key id does not match the public key".into(),
        ));
    }

    let member = state
        .store
        .get_member(&verification.member_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("member {}", verification.member_id)))?;

    let agents = recovery_agents(state, &member);
    if !agents.iter().any(|a| a == state.registry.agent_id()) {
        return Err(ApiError::PreconditionFailed(format!(
            "{} is not a recovery agent of {}",
            state.registry.agent_id(),
            member.member_id
        )));
    }

    state.store.remove_verification(verification_id).await?;

    let operation = state.registry.authorize_recovery(RecoveryAuthorization {
        member_id: member.member_id.clone(),
        prev_hash: member.last_hash.clone(),
        member_key: key,
    })?;

    info!(member_id = %member.member_id, agent_id = %state.registry.agent_id(), "Recovery authorized");
    Ok(Response::RecoveryOperation { operation })
}

pub async fn complete_recovery(
    state: &AppState,
    update: MemberUpdate,
    signature: Signature,
) -> Result<Response, ApiError> {
    let member = state
        .store
        .get_member(&update.member_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("member {}", update.member_id)))?;

    let recoveries: Vec<_> = update.recoveries().collect();
    if recoveries.is_empty() {
        return Err(ApiError::BadRequest(
            "recovery update carries no recovery operation".into(),
        ));
    }

    let agents = recovery_agents(state, &member);
    let allowed: Vec<&str> = agents.iter().map(String::as_str).collect();
    for operation in &recoveries {
        if operation.authorization.member_id != update.member_id {
            return Err(ApiError::BadRequest(
                "recovery authorization names another member".into(),
            ));
        }
        state
            .registry
            .verify_recovery(operation, &allowed)
            .map_err(|e| {
                warn!(member_id = %update.member_id, error = %e, "SECURITY: Recovery authorization rejected");
                ApiError::Unauthorized(e.to_string())
            })?;
    }

    let key = recoveries
        .iter()
        .map(|op| &op.authorization.member_key)
        .find(|k| k.id == signature.key_id)
        .cloned()
        .ok_or_else(|| {
            ApiError::Unauthorized("recovery update must be signed by the recovered key".into())
        })?;
    verify_update_signature(
        &update,
        &signature,
        &key,
        policy::required_level(Method::CompleteRecovery),
    )?;

    let member = state.store.apply_member_update(&update).await?;
    info!(member_id = %member.member_id, "Member recovered");
    Ok(Response::Member { member })
}
