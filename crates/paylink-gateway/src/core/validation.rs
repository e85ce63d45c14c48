//! Validation logic for the gateway
//!
//! This module contains the security checks every call passes through:
//! call signatures and key levels, clock skew, client version, and the
//! signatures carried inside member updates and token actions.

use paylink_core::{
    rpc::signing_payload, token_action, Action, CallMetadata, Key, KeyLevel, MemberState,
    MemberUpdate, Request, Signature, TokenSignature, SIGNATURE_SCHEME,
};
use std::time::Duration;
use tracing::warn;

use crate::api::error::ApiError;

/// Parse a dotted numeric version such as "1.4.2"
fn parse_version(version: &str) -> Option<Vec<u64>> {
    version
        .trim()
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// Reject clients older than `minimum`
pub fn check_client_version(client: &str, minimum: &str) -> Result<(), ApiError> {
    let mismatch = || ApiError::VersionMismatch {
        client: client.to_string(),
        minimum: minimum.to_string(),
    };
    let client_parts = parse_version(client).ok_or_else(mismatch)?;
    let minimum_parts = parse_version(minimum).ok_or_else(mismatch)?;
    if client_parts < minimum_parts {
        warn!(client_version = %client, min_client_version = %minimum, "Rejected outdated client");
        return Err(mismatch());
    }
    Ok(())
}

/// Reject call timestamps too far from the gateway clock
pub fn check_clock_skew(created_at_ms: i64, now_ms: i64, max_skew: Duration) -> Result<(), ApiError> {
    let skew = created_at_ms.abs_diff(now_ms);
    if u128::from(skew) > max_skew.as_millis() {
        warn!(created_at_ms, now_ms, skew_ms = skew, "Rejected call outside clock skew window");
        return Err(ApiError::Unauthorized(format!(
            "call timestamp is {} ms away from gateway time",
            skew
        )));
    }
    Ok(())
}

/// Verify call metadata against the signing member's registered keys
///
/// Returns the key that signed the call.
pub fn verify_call(
    metadata: &CallMetadata,
    request: &Request,
    member: &MemberState,
    realm: &str,
    required: KeyLevel,
) -> Result<Key, ApiError> {
    if metadata.scheme != SIGNATURE_SCHEME {
        return Err(ApiError::Unauthorized(format!(
            "unsupported signature scheme '{}'",
            metadata.scheme
        )));
    }
    if metadata.realm != realm {
        return Err(ApiError::Unauthorized(format!(
            "call addressed to realm '{}'",
            metadata.realm
        )));
    }
    if metadata.member_id != member.member_id {
        return Err(ApiError::Unauthorized("metadata names another member".into()));
    }

    let key = member.key(&metadata.key_id).cloned().ok_or_else(|| {
        warn!(member_id = %member.member_id, key_id = %metadata.key_id, "Call signed with unknown key");
        ApiError::Unauthorized(format!("key '{}' is not registered", metadata.key_id))
    })?;

    if key.level < required {
        warn!(
            member_id = %member.member_id,
            key_id = %key.id,
            key_level = %key.level,
            required_level = %required,
            method = %request.method(),
            "SECURITY: Call signed below required key level"
        );
        return Err(ApiError::Unauthorized(format!(
            "{} requires a {} key, call signed with {}",
            request.method(),
            required,
            key.level
        )));
    }

    let payload = signing_payload(request, metadata.created_at_ms)?;
    let signature = Signature {
        member_id: metadata.member_id.clone(),
        key_id: metadata.key_id.clone(),
        signature: metadata.signature.clone(),
    };
    signature.verify(&key, &payload).map_err(|e| {
        warn!(member_id = %member.member_id, key_id = %key.id, error = %e, "Call signature verification failed");
        ApiError::Unauthorized(format!("call signature invalid: {}", e))
    })?;

    Ok(key)
}

/// Verify the signature carried by a member update
pub fn verify_update_signature(
    update: &MemberUpdate,
    signature: &Signature,
    key: &Key,
    required: KeyLevel,
) -> Result<(), ApiError> {
    if signature.member_id != update.member_id {
        return Err(ApiError::Unauthorized(
            "update signed on behalf of another member".into(),
        ));
    }
    if key.level < required {
        warn!(
            member_id = %update.member_id,
            key_id = %key.id,
            key_level = %key.level,
            "SECURITY: Member update signed below required key level"
        );
        return Err(ApiError::Unauthorized(format!(
            "member updates require a {} key",
            required
        )));
    }
    let payload = update.canonical_bytes()?;
    signature.verify(key, &payload).map_err(|e| {
        warn!(member_id = %update.member_id, error = %e, "Update signature verification failed");
        ApiError::Unauthorized(format!("update signature invalid: {}", e))
    })
}

/// Verify a token action signature from `member`
///
/// The level claimed on the signature must be the level of the key that
/// produced it.
pub fn verify_token_signature(
    token_id: &str,
    signature: &TokenSignature,
    action: Action,
    member: &MemberState,
) -> Result<(), ApiError> {
    if signature.action != action {
        return Err(ApiError::BadRequest(format!(
            "expected a {} signature, got {}",
            action, signature.action
        )));
    }
    if signature.signature.member_id != member.member_id {
        return Err(ApiError::Unauthorized(
            "token signature names another member".into(),
        ));
    }
    let key = member.key(&signature.signature.key_id).ok_or_else(|| {
        ApiError::Unauthorized(format!(
            "key '{}' is not registered",
            signature.signature.key_id
        ))
    })?;
    if key.level != signature.level {
        warn!(
            member_id = %member.member_id,
            key_id = %key.id,
            key_level = %key.level,
            claimed_level = %signature.level,
            "SECURITY: Token signature claims a level its key does not have"
        );
        return Err(ApiError::Unauthorized(
            "signature level does not match key level".into(),
        ));
    }

    let payload = token_action(token_id, action);
    signature
        .signature
        .verify(key, payload.as_bytes())
        .map_err(|e| {
            warn!(member_id = %member.member_id, token_id = %token_id, error = %e, "Token signature verification failed");
            ApiError::Unauthorized(format!("token signature invalid: {}", e))
        })
}
