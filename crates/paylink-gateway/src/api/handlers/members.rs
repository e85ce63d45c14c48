//! Member identity handlers
//!
//! Member state only changes through `apply_member_update`, which accepts an
//! update iff its `prev_hash` is the member's current hash.

use paylink_core::{
    policy, Alias, MemberType, MemberUpdate, Method, Response, Signature,
};
use tracing::{info, warn};
use uuid::Uuid;

use super::{AppState, Caller};
use crate::api::error::ApiError;
use crate::core::verify_update_signature;

pub async fn resolve_alias(state: &AppState, alias: Alias) -> Result<Response, ApiError> {
    let member_id = state.store.resolve_alias(&alias).await?;
    Ok(Response::ResolvedAlias { member_id })
}

pub async fn get_member(state: &AppState, member_id: &str) -> Result<Response, ApiError> {
    let member = state
        .store
        .get_member(member_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("member {}", member_id)))?;
    Ok(Response::Member { member })
}

pub async fn create_member_id(
    state: &AppState,
    member_type: MemberType,
) -> Result<Response, ApiError> {
    let member_id = format!("m:{}", Uuid::new_v4().simple());
    state.store.allocate_member(&member_id, member_type).await?;
    info!(member_id = %member_id, member_type = ?member_type, "Created member id");
    Ok(Response::MemberId { member_id })
}

/// Apply the first update of a member
///
/// The update must be signed by a PRIVILEGED key it adds itself.
pub async fn create_member(
    state: &AppState,
    update: MemberUpdate,
    signature: Signature,
) -> Result<Response, ApiError> {
    if !update.prev_hash.is_empty() {
        return Err(ApiError::BadRequest(
            "first member update must have an empty prev hash".into(),
        ));
    }
    if update.recoveries().next().is_some() {
        return Err(ApiError::BadRequest(
            "recovery operations are not allowed when creating a member".into(),
        ));
    }

    let member = state
        .store
        .get_member(&update.member_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("member id {} was not allocated", update.member_id)))?;
    if !member.last_hash.is_empty() {
        return Err(ApiError::PreconditionFailed(format!(
            "member {} already exists",
            update.member_id
        )));
    }

    let key = update
        .added_keys()
        .find(|k| k.id == signature.key_id)
        .cloned()
        .ok_or_else(|| {
            ApiError::Unauthorized("bootstrap update must be signed by a key it adds".into())
        })?;
    verify_update_signature(
        &update,
        &signature,
        &key,
        policy::required_level(Method::CreateMember),
    )?;

    let member = state.store.apply_member_update(&update).await?;
    info!(member_id = %member.member_id, keys = member.keys.len(), "Created member");
    Ok(Response::Member { member })
}

pub async fn update_member(
    state: &AppState,
    caller: &Caller,
    update: MemberUpdate,
    signature: Signature,
) -> Result<Response, ApiError> {
    if update.member_id != caller.member_id() {
        return Err(ApiError::Unauthorized(
            "members can only update themselves".into(),
        ));
    }
    if update.recoveries().next().is_some() {
        return Err(ApiError::BadRequest(
            "recovery operations must be submitted through complete_recovery".into(),
        ));
    }

    // Keys are checked against the state the update was built on
    if update.prev_hash != caller.member.last_hash {
        warn!(
            member_id = %update.member_id,
            prev_hash = %update.prev_hash,
            last_hash = %caller.member.last_hash,
            "Rejected member update built on a stale hash"
        );
        return Err(ApiError::StaleMemberState {
            expected: caller.member.last_hash.clone(),
            actual: update.prev_hash,
        });
    }

    let key = caller
        .member
        .key(&signature.key_id)
        .cloned()
        .ok_or_else(|| ApiError::Unauthorized(format!("key '{}' is not registered", signature.key_id)))?;
    verify_update_signature(
        &update,
        &signature,
        &key,
        policy::required_level(Method::UpdateMember),
    )?;

    let member = state.store.apply_member_update(&update).await.map_err(|e| {
        warn!(member_id = %update.member_id, error = %e, "Member update rejected");
        ApiError::from(e)
    })?;
    Ok(Response::Member { member })
}

pub async fn delete_member(state: &AppState, caller: &Caller) -> Result<Response, ApiError> {
    state.store.delete_member(caller.member_id()).await?;
    Ok(Response::Empty)
}
