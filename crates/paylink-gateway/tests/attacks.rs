//! Attack Scenario Tests
//!
//! Each test plays a caller trying to get the gateway to accept something
//! its keys, its view of member state, or its tokens do not entitle it to.

mod common;

use common::{sign_update, Harness, CLIENT_VERSION};
use paylink_core::{
    Action, ErrorCode, KeyLevel, KeyPair, MemberOperation, MemberUpdate, Request, Resource,
    Response, TokenPayload, TokenState, TransferPayload,
};

// =============================================================================
// ATTACK: Key Level Escalation
// =============================================================================

/// A stolen LOW key must not be enough to change who controls the member.
#[tokio::test]
async fn attack_low_key_cannot_update_member() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;
    let attacker_key = KeyPair::generate(KeyLevel::Privileged);

    let state = gw.member_state(&alice.id).await;
    let update = MemberUpdate::new(
        &alice.id,
        &state.last_hash,
        vec![MemberOperation::add_key(attacker_key.key())],
    );
    let update_signature = sign_update(&update, &alice.id, &alice.low);

    let err = gw
        .call(
            &alice,
            KeyLevel::Low,
            Request::UpdateMember {
                update,
                update_signature,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthorized);
    assert_eq!(gw.member_state(&alice.id).await, state);
}

/// A PRIVILEGED call signature does not launder an update signed by a LOW key.
#[tokio::test]
async fn attack_low_update_signature_under_privileged_call() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;

    let state = gw.member_state(&alice.id).await;
    let update = MemberUpdate::new(
        &alice.id,
        &state.last_hash,
        vec![MemberOperation::remove_key(alice.standard.key_id())],
    );
    let update_signature = sign_update(&update, &alice.id, &alice.low);

    let err = gw
        .call(
            &alice,
            KeyLevel::Privileged,
            Request::UpdateMember {
                update,
                update_signature,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthorized);
    assert_eq!(gw.member_state(&alice.id).await.keys.len(), 3);
}

/// A LOW key cannot unlink accounts, which needs STANDARD.
#[tokio::test]
async fn attack_low_key_cannot_unlink_accounts() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;
    let account = gw.open_account(&alice, "100").await;

    let err = gw
        .call(
            &alice,
            KeyLevel::Low,
            Request::UnlinkAccounts {
                account_ids: vec![account.id.clone()],
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthorized);
    assert!(gw.state.store.get_account(&account.id).await.unwrap().is_some());
}

/// A token signature claiming PRIVILEGED from a LOW key is rejected and does
/// not move the token toward ENDORSED.
#[tokio::test]
async fn attack_forged_signature_level() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;
    let bob = gw.create_member("bob@example.com").await;
    let account = gw.open_account(&alice, "5000").await;

    let payload = TokenPayload::transfer("2000", "USD")
        .from(&alice.id)
        .source_account(&account.id)
        .redeemer(&bob.id)
        .build()
        .unwrap();
    let token = gw.create_token(&alice, payload).await.unwrap();

    let mut signature = alice.token_signature(&token.id, Action::Endorsed, KeyLevel::Low);
    signature.level = KeyLevel::Privileged;

    let err = gw
        .call(
            &alice,
            KeyLevel::Low,
            Request::EndorseToken {
                token_id: token.id.clone(),
                signature,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthorized);

    let stored = gw.state.store.get_token(&token.id).await.unwrap().unwrap();
    assert_eq!(stored.state, TokenState::Created);
    assert!(stored.signatures.is_empty());
}

// =============================================================================
// ATTACK: Stale or Racing Member Updates
// =============================================================================

/// Two devices build updates on the same hash. Only the first lands; the
/// second is told to re-read rather than silently merged.
#[tokio::test]
async fn attack_racing_updates_exactly_one_applies() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;
    let base = gw.member_state(&alice.id).await;

    let first = MemberUpdate::new(
        &alice.id,
        &base.last_hash,
        vec![MemberOperation::add_alias(paylink_core::Alias::email("first@example.com"))],
    );
    let second = MemberUpdate::new(
        &alice.id,
        &base.last_hash,
        vec![MemberOperation::add_alias(paylink_core::Alias::email("second@example.com"))],
    );

    gw.submit_update(&alice, first).await.unwrap();
    let err = gw.submit_update(&alice, second).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConcurrentModification);

    let state = gw.member_state(&alice.id).await;
    assert!(state.has_alias(&paylink_core::Alias::email("first@example.com")));
    assert!(!state.has_alias(&paylink_core::Alias::email("second@example.com")));
}

/// Removing a key that is not there fails without touching the key set.
#[tokio::test]
async fn attack_remove_missing_key_is_precondition_failure() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;
    let before = gw.member_state(&alice.id).await;

    let err = gw
        .update_member(&alice, vec![MemberOperation::remove_key("no-such-key")])
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PreconditionFailed);
    assert_eq!(gw.member_state(&alice.id).await, before);
}

/// An alias already held by one member cannot be claimed by another.
#[tokio::test]
async fn attack_alias_takeover_rejected() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;
    let mallory = gw.create_member("mallory@example.com").await;

    let result = gw
        .update_member(&mallory, vec![MemberOperation::add_alias(alice.alias.clone())])
        .await;
    assert!(result.is_err());

    let resolved = gw
        .unauthenticated(Request::ResolveAlias {
            alias: alice.alias.clone(),
        })
        .await
        .unwrap();
    assert_eq!(
        resolved,
        Response::ResolvedAlias {
            member_id: Some(alice.id.clone())
        }
    );
}

// =============================================================================
// ATTACK: Replay and Tampering
// =============================================================================

/// A captured call replayed after the skew window is rejected.
#[tokio::test]
async fn attack_replay_outside_clock_skew() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;

    let envelope = gw.envelope(
        &alice.id,
        &alice.low,
        None,
        Request::GetAccounts,
        gw.now_ms(),
    );
    assert!(gw.state.handle(envelope.clone()).await.is_ok());

    gw.clock.advance(10 * 60 * 1000);
    let err = gw.state.handle(envelope).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthorized);
}

/// The call signature covers the request: swapping the account id breaks it.
#[tokio::test]
async fn attack_tampered_request_rejected() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;
    let account = gw.open_account(&alice, "100").await;

    let mut envelope = gw.envelope(
        &alice.id,
        &alice.low,
        None,
        Request::GetBalance {
            account_id: "a:other".into(),
        },
        gw.now_ms(),
    );
    envelope.request = Request::GetBalance {
        account_id: account.id.clone(),
    };

    let err = gw.state.handle(envelope).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthorized);
}

/// Metadata naming one member but signed by another member's key is rejected.
#[tokio::test]
async fn attack_impersonation_with_own_key() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;
    let mallory = gw.create_member("mallory@example.com").await;

    let envelope = gw.envelope(
        &alice.id,
        &mallory.privileged,
        None,
        Request::DeleteMember,
        gw.now_ms(),
    );
    let err = gw.state.handle(envelope).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthorized);
    assert!(gw.state.store.get_member(&alice.id).await.unwrap().is_some());
}

/// Clients below the minimum version are turned away before anything else.
#[tokio::test]
async fn attack_outdated_client_rejected() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;

    let mut envelope = gw.envelope(&alice.id, &alice.low, None, Request::GetAccounts, gw.now_ms());
    envelope.client_version = "0.0.1".into();
    assert_ne!(envelope.client_version, CLIENT_VERSION);

    let err = gw.state.handle(envelope).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::VersionMismatch);
}

// =============================================================================
// ATTACK: Token Misuse
// =============================================================================

/// Only the named redeemer can redeem a transfer token.
#[tokio::test]
async fn attack_transfer_by_non_redeemer() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;
    let bob = gw.create_member("bob@example.com").await;
    let mallory = gw.create_member("mallory@example.com").await;
    let account = gw.open_account(&alice, "500").await;
    let token = gw.endorsed_transfer_token(&alice, &bob, &account, "100").await;

    let err = gw
        .call(
            &mallory,
            KeyLevel::Low,
            Request::CreateTransfer {
                payload: TransferPayload::new(&token.id, "steal-1"),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthorized);
    assert_eq!(
        gw.state.store.get_balance(&account.id).await.unwrap(),
        Some(paylink_core::Amount::from_whole(500))
    );
}

/// Redeeming again under a new ref id cannot exceed the token amount.
#[tokio::test]
async fn attack_double_redeem_bounded_by_token_amount() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;
    let bob = gw.create_member("bob@example.com").await;
    let account = gw.open_account(&alice, "500").await;
    let token = gw.endorsed_transfer_token(&alice, &bob, &account, "100").await;

    gw.call(
        &bob,
        KeyLevel::Low,
        Request::CreateTransfer {
            payload: TransferPayload::new(&token.id, "r1"),
        },
    )
    .await
    .unwrap();

    let err = gw
        .call(
            &bob,
            KeyLevel::Low,
            Request::CreateTransfer {
                payload: TransferPayload::new(&token.id, "r2"),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PreconditionFailed);
    assert_eq!(
        gw.state.store.get_balance(&account.id).await.unwrap(),
        Some(paylink_core::Amount::from_whole(400))
    );
}

/// The redeemer of a token cannot endorse it on the issuer's behalf.
#[tokio::test]
async fn attack_redeemer_cannot_endorse() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;
    let bob = gw.create_member("bob@example.com").await;
    let account = gw.open_account(&alice, "500").await;

    let payload = TokenPayload::transfer("50", "USD")
        .from(&alice.id)
        .source_account(&account.id)
        .redeemer(&bob.id)
        .build()
        .unwrap();
    let token = gw.create_token(&alice, payload).await.unwrap();

    let err = gw
        .endorse(&bob, &token.id, KeyLevel::Privileged)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthorized);
}

/// A token cannot name a source account its issuer does not own.
#[tokio::test]
async fn attack_token_on_foreign_account() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;
    let mallory = gw.create_member("mallory@example.com").await;
    let account = gw.open_account(&alice, "500").await;

    let payload = TokenPayload::transfer("50", "USD")
        .from(&mallory.id)
        .source_account(&account.id)
        .redeemer(&mallory.id)
        .build()
        .unwrap();
    let err = gw.create_token(&mallory, payload).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::PreconditionFailed);
}

/// An access token grants only what it names.
#[tokio::test]
async fn attack_access_beyond_grant() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;
    let bob = gw.create_member("bob@example.com").await;
    let checking = gw.open_account(&alice, "100").await;
    let savings = gw.open_account(&alice, "900").await;

    let token = gw
        .endorsed_access_token(
            &alice,
            &bob,
            vec![Resource::Balance {
                account_id: checking.id.clone(),
            }],
        )
        .await;

    assert!(gw
        .call_on_behalf_of(
            &bob,
            &token.id,
            Request::GetBalance {
                account_id: checking.id.clone()
            }
        )
        .await
        .is_ok());

    let err = gw
        .call_on_behalf_of(
            &bob,
            &token.id,
            Request::GetBalance {
                account_id: savings.id.clone(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthorized);

    let err = gw
        .call_on_behalf_of(
            &bob,
            &token.id,
            Request::GetTransactions {
                account_id: checking.id.clone(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthorized);
}

/// Somebody else's access token is useless even with a valid call signature.
#[tokio::test]
async fn attack_borrowed_access_token() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;
    let bob = gw.create_member("bob@example.com").await;
    let mallory = gw.create_member("mallory@example.com").await;
    gw.open_account(&alice, "100").await;

    let token = gw
        .endorsed_access_token(&alice, &bob, vec![Resource::AllAccounts])
        .await;

    let err = gw
        .call_on_behalf_of(&mallory, &token.id, Request::GetAccounts)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthorized);
}

/// Cancelling an access token revokes it immediately.
#[tokio::test]
async fn attack_cancelled_access_token() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;
    let bob = gw.create_member("bob@example.com").await;
    gw.open_account(&alice, "100").await;

    let token = gw
        .endorsed_access_token(&alice, &bob, vec![Resource::AllAccounts])
        .await;
    gw.call(
        &alice,
        KeyLevel::Low,
        Request::CancelToken {
            token_id: token.id.clone(),
            signature: alice.token_signature(&token.id, Action::Cancelled, KeyLevel::Low),
        },
    )
    .await
    .unwrap();

    let err = gw
        .call_on_behalf_of(&bob, &token.id, Request::GetAccounts)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PreconditionFailed);
}

// =============================================================================
// ATTACK: Recovery Abuse
// =============================================================================

/// Guessing the verification code does not yield an authorization.
#[tokio::test]
async fn attack_recovery_with_wrong_code() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;

    let verification_id = match gw
        .unauthenticated(Request::BeginRecovery {
            alias: alice.alias.clone(),
        })
        .await
        .unwrap()
    {
        Response::Verification { verification_id } => verification_id,
        other => panic!("unexpected response {:?}", other),
    };
    let real = gw.notifier.code_for(&alice.alias).unwrap();
    let wrong = if real == "000000" { "000001" } else { "000000" };

    let err = gw
        .unauthenticated(Request::GetRecoveryAuthorization {
            verification_id,
            code: wrong.into(),
            key: KeyPair::generate(KeyLevel::Privileged).key(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthorized);
}

/// Guessing codes burns the verification: after the attempt limit even the
/// real code is refused and a new verification must be started.
#[tokio::test]
async fn attack_recovery_code_bruteforce() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;
    let max_attempts = gw.state.config.max_verification_attempts;

    let verification_id = match gw
        .unauthenticated(Request::BeginRecovery {
            alias: alice.alias.clone(),
        })
        .await
        .unwrap()
    {
        Response::Verification { verification_id } => verification_id,
        other => panic!("unexpected response {:?}", other),
    };
    let real = gw.notifier.code_for(&alice.alias).unwrap();

    let guesses = (0..1_000_000u32)
        .map(|n| format!("{:06}", n))
        .filter(|guess| *guess != real)
        .take(max_attempts as usize);
    for guess in guesses {
        let err = gw
            .unauthenticated(Request::GetRecoveryAuthorization {
                verification_id: verification_id.clone(),
                code: guess,
                key: KeyPair::generate(KeyLevel::Privileged).key(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthorized);
    }

    let err = gw
        .unauthenticated(Request::GetRecoveryAuthorization {
            verification_id,
            code: real,
            key: KeyPair::generate(KeyLevel::Privileged).key(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
    assert_eq!(gw.member_state(&alice.id).await.keys.len(), 3);
}

/// A recovery authorization for one key cannot install a different key.
#[tokio::test]
async fn attack_recovery_signed_by_other_key() {
    let gw = Harness::new();
    let alice = gw.create_member("alice@example.com").await;
    let recovered = KeyPair::generate(KeyLevel::Privileged);
    let mallory_key = KeyPair::generate(KeyLevel::Privileged);

    let verification_id = match gw
        .unauthenticated(Request::BeginRecovery {
            alias: alice.alias.clone(),
        })
        .await
        .unwrap()
    {
        Response::Verification { verification_id } => verification_id,
        other => panic!("unexpected response {:?}", other),
    };
    let code = gw.notifier.code_for(&alice.alias).unwrap();
    let operation = match gw
        .unauthenticated(Request::GetRecoveryAuthorization {
            verification_id,
            code,
            key: recovered.key(),
        })
        .await
        .unwrap()
    {
        Response::RecoveryOperation { operation } => operation,
        other => panic!("unexpected response {:?}", other),
    };

    let update = MemberUpdate::new(
        &alice.id,
        &operation.authorization.prev_hash.clone(),
        vec![
            MemberOperation::Recover {
                recovery: operation,
            },
            MemberOperation::add_key(mallory_key.key()),
        ],
    );
    let update_signature = sign_update(&update, &alice.id, &mallory_key);

    let err = gw
        .unauthenticated(Request::CompleteRecovery {
            update,
            update_signature,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthorized);
    assert_eq!(gw.member_state(&alice.id).await.keys.len(), 3);
}
