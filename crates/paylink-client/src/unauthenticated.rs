//! Calls made before the caller holds member keys
//!
//! Member creation and recovery both start here and hand back a `Member`
//! once the gateway has accepted keys held in the caller's key store.

use paylink_core::{
    Alias, Clock, CryptoEngine, Ed25519CryptoEngine, Key, KeyLevel, KeyPair, KeyStore,
    MemberOperation, MemberRecoveryOperation, MemberState, MemberType, MemberUpdate, Request,
    Response, Signature, SystemClock, Transport,
};
use std::sync::Arc;
use tracing::info;

use crate::authenticated::AuthenticatedClient;
use crate::client::{expect_response, Channel};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::http::HttpTransport;
use crate::member::Member;
use crate::signer::RequestSigner;

#[derive(Clone)]
pub struct UnauthenticatedClient {
    channel: Channel,
    clock: Arc<dyn Clock>,
}

impl UnauthenticatedClient {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self {
            channel: Channel::new(transport, config),
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Client talking HTTP to the gateway at `base_url`
    pub fn http(base_url: impl Into<String>, config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(base_url, &config)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Clock used to timestamp calls of members created from this client
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        self.channel.config()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        self.channel.transport()
    }

    async fn call(&self, request: Request) -> Result<Response> {
        self.channel.call(request, None).await
    }

    // ========================================================================
    // Wire calls
    // ========================================================================

    pub async fn resolve_alias(&self, alias: &Alias) -> Result<Option<String>> {
        let response = self
            .call(Request::ResolveAlias {
                alias: alias.clone(),
            })
            .await?;
        expect_response!(response, ResolvedAlias { member_id })
    }

    pub async fn create_member_id(&self, member_type: MemberType) -> Result<String> {
        let response = self.call(Request::CreateMemberId { member_type }).await?;
        expect_response!(response, MemberId { member_id })
    }

    /// Submit the bootstrap update of a freshly allocated member id
    pub async fn create_member(
        &self,
        update: MemberUpdate,
        update_signature: Signature,
    ) -> Result<MemberState> {
        let response = self
            .call(Request::CreateMember {
                update,
                update_signature,
            })
            .await?;
        expect_response!(response, Member { member })
    }

    /// Ask the recovery agent to send a verification code to `alias`
    pub async fn begin_recovery(&self, alias: &Alias) -> Result<String> {
        let response = self
            .call(Request::BeginRecovery {
                alias: alias.clone(),
            })
            .await?;
        expect_response!(response, Verification { verification_id })
    }

    pub async fn get_recovery_authorization(
        &self,
        verification_id: &str,
        code: &str,
        key: Key,
    ) -> Result<MemberRecoveryOperation> {
        let response = self
            .call(Request::GetRecoveryAuthorization {
                verification_id: verification_id.into(),
                code: code.into(),
                key,
            })
            .await?;
        expect_response!(response, RecoveryOperation { operation })
    }

    pub async fn complete_recovery(
        &self,
        update: MemberUpdate,
        update_signature: Signature,
    ) -> Result<MemberState> {
        let response = self
            .call(Request::CompleteRecovery {
                update,
                update_signature,
            })
            .await?;
        expect_response!(response, Member { member })
    }

    // ========================================================================
    // Member lifecycle
    // ========================================================================

    /// Create a member holding one key per level in `store`
    pub async fn register_member(
        &self,
        member_type: MemberType,
        aliases: Vec<Alias>,
        store: Arc<dyn KeyStore>,
    ) -> Result<Member> {
        let member_id = self.create_member_id(member_type).await?;
        let crypto = Arc::new(Ed25519CryptoEngine::new(&member_id, store));

        let pairs: Vec<KeyPair> = [KeyLevel::Privileged, KeyLevel::Standard, KeyLevel::Low]
            .into_iter()
            .map(|level| crypto.stage_key(level))
            .collect();
        let mut operations: Vec<MemberOperation> = pairs
            .iter()
            .map(|pair| MemberOperation::add_key(pair.key()))
            .collect();
        operations.extend(aliases.into_iter().map(MemberOperation::add_alias));

        let update = MemberUpdate::new(&member_id, "", operations);
        let signature = sign_update(&pairs[0], &member_id, &update)?;
        let state = self.create_member(update, signature).await?;
        commit_all(crypto.as_ref(), &pairs)?;

        info!(
            member_id = %state.member_id,
            keys = state.keys.len(),
            aliases = state.aliases.len(),
            "Member created"
        );
        Ok(self.member(&member_id, crypto))
    }

    /// Act as an existing member whose keys are in `store`
    pub fn login(&self, member_id: &str, store: Arc<dyn KeyStore>) -> Member {
        self.member(member_id, Arc::new(Ed25519CryptoEngine::new(member_id, store)))
    }

    /// Take over a member after `begin_recovery`
    ///
    /// A fresh PRIVILEGED key is authorized by the recovery agent; fresh
    /// STANDARD and LOW keys are added in the same update. Every previous key
    /// of the member stops working. The fresh keys are written to `store`
    /// only after the gateway completed the recovery, so a refused code
    /// leaves the store as it was.
    pub async fn recover_member(
        &self,
        member_id: &str,
        verification_id: &str,
        code: &str,
        store: Arc<dyn KeyStore>,
    ) -> Result<Member> {
        let crypto = Arc::new(Ed25519CryptoEngine::new(member_id, store));
        let privileged = crypto.stage_key(KeyLevel::Privileged);
        let recovery = self
            .get_recovery_authorization(verification_id, code, privileged.key())
            .await?;

        let standard = crypto.stage_key(KeyLevel::Standard);
        let low = crypto.stage_key(KeyLevel::Low);
        let prev_hash = recovery.authorization.prev_hash.clone();
        let update = MemberUpdate::new(
            member_id,
            prev_hash,
            vec![
                MemberOperation::Recover { recovery },
                MemberOperation::add_key(standard.key()),
                MemberOperation::add_key(low.key()),
            ],
        );
        let signature = sign_update(&privileged, member_id, &update)?;
        let state = self.complete_recovery(update, signature).await?;
        commit_all(crypto.as_ref(), &[privileged, standard, low])?;

        info!(member_id = %state.member_id, keys = state.keys.len(), "Member recovered");
        Ok(self.member(member_id, crypto))
    }

    fn member(&self, member_id: &str, crypto: Arc<dyn CryptoEngine>) -> Member {
        let signer = RequestSigner::new(
            member_id,
            &self.config().realm,
            crypto,
            self.clock.clone(),
        );
        Member::new(AuthenticatedClient::new(self.channel.clone(), signer))
    }
}

fn sign_update(pair: &KeyPair, member_id: &str, update: &MemberUpdate) -> Result<Signature> {
    Ok(Signature::create(member_id, pair, &update.canonical_bytes()?))
}

/// Store keys the gateway has accepted
fn commit_all(crypto: &dyn CryptoEngine, pairs: &[KeyPair]) -> Result<()> {
    for pair in pairs {
        crypto.commit_key(pair)?;
    }
    Ok(())
}
