//! Call signing with key-level fallback
//!
//! The search starts at the higher of the context's minimum and the level
//! the method requires, then walks down toward `LOW` until the crypto engine
//! has a key. The gateway still rejects anything below the method's level,
//! so falling back can only help calls that asked for more than they need.

use paylink_core::{
    policy, rpc::signing_payload, CallMetadata, Clock, CoreError, CryptoEngine, KeyLevel, Request,
    Signer, SIGNATURE_SCHEME,
};
use std::sync::Arc;
use tracing::debug;

use crate::context::AuthenticationContext;
use crate::error::{ClientError, Result};

/// Signs outgoing calls for one member
#[derive(Clone)]
pub struct RequestSigner {
    member_id: String,
    realm: String,
    crypto: Arc<dyn CryptoEngine>,
    clock: Arc<dyn Clock>,
}

impl RequestSigner {
    pub fn new(
        member_id: impl Into<String>,
        realm: impl Into<String>,
        crypto: Arc<dyn CryptoEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            member_id: member_id.into(),
            realm: realm.into(),
            crypto,
            clock,
        }
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn crypto(&self) -> &Arc<dyn CryptoEngine> {
        &self.crypto
    }

    /// Signer at `minimum`, or the highest level below it that has a key
    pub fn signer_for(&self, minimum: KeyLevel) -> Result<Arc<dyn Signer>> {
        for level in minimum.descending() {
            match self.crypto.create_signer(level) {
                Ok(signer) => {
                    if level != minimum {
                        debug!(
                            member_id = %self.member_id,
                            requested = %minimum,
                            used = %level,
                            "Fell back to lower key level"
                        );
                    }
                    return Ok(signer);
                }
                Err(CoreError::KeyNotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(ClientError::KeyNotFound {
            member_id: self.member_id.clone(),
            level: minimum,
        })
    }

    /// Signer at exactly `level`, without fallback
    pub fn exact_signer(&self, level: KeyLevel) -> Result<Arc<dyn Signer>> {
        Ok(self.crypto.create_signer(level)?)
    }

    /// Signed metadata for `request` under `context`
    pub fn sign(&self, request: &Request, context: &AuthenticationContext) -> Result<CallMetadata> {
        let method = request.method();
        let start = context.min_key_level.max(policy::required_level(method));
        let signer = self.signer_for(start)?;

        let created_at_ms = self.clock.now_ms();
        let payload = signing_payload(request, created_at_ms)?;
        let signature = signer.sign(&payload);

        debug!(
            member_id = %self.member_id,
            method = method.as_str(),
            key_id = signer.key_id(),
            key_level = %signer.level(),
            "Signed call"
        );

        Ok(CallMetadata {
            realm: self.realm.clone(),
            scheme: SIGNATURE_SCHEME.into(),
            member_id: self.member_id.clone(),
            key_id: signer.key_id().to_string(),
            signature,
            created_at_ms,
            on_behalf_of: context.on_behalf_of.clone(),
            customer_initiated: context.customer_initiated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paylink_core::{
        Ed25519CryptoEngine, InMemoryKeyStore, KeyStore, ManualClock, PublicKey, TokenKind,
    };

    fn signer_with(levels: &[KeyLevel]) -> RequestSigner {
        let store: Arc<dyn KeyStore> = Arc::new(InMemoryKeyStore::new());
        let crypto = Arc::new(Ed25519CryptoEngine::new("m:alice", store));
        for level in levels {
            crypto.generate_key(*level).unwrap();
        }
        RequestSigner::new(
            "m:alice",
            "paylink",
            crypto,
            Arc::new(ManualClock::new(1_000)),
        )
    }

    fn read_tokens() -> Request {
        Request::GetTokens {
            kind: TokenKind::Transfer,
        }
    }

    #[test]
    fn test_uses_requested_level_when_present() {
        let signer = signer_with(&[KeyLevel::Low, KeyLevel::Standard]);
        let context = AuthenticationContext::new().with_min_key_level(KeyLevel::Standard);
        let metadata = signer.sign(&read_tokens(), &context).unwrap();

        let used = signer.exact_signer(KeyLevel::Standard).unwrap();
        assert_eq!(metadata.key_id, used.key_id());
    }

    #[test]
    fn test_falls_back_to_lower_level() {
        let signer = signer_with(&[KeyLevel::Low]);
        let context = AuthenticationContext::new().with_min_key_level(KeyLevel::Privileged);
        let metadata = signer.sign(&read_tokens(), &context).unwrap();

        let low = signer.exact_signer(KeyLevel::Low).unwrap();
        assert_eq!(metadata.key_id, low.key_id());
    }

    #[test]
    fn test_never_goes_above_requested_level() {
        let signer = signer_with(&[KeyLevel::Privileged]);
        let err = signer.signer_for(KeyLevel::Standard).err().unwrap();
        assert_eq!(
            err,
            ClientError::KeyNotFound {
                member_id: "m:alice".into(),
                level: KeyLevel::Standard
            }
        );
    }

    #[test]
    fn test_no_keys_is_key_not_found() {
        let signer = signer_with(&[]);
        let err = signer
            .sign(&read_tokens(), &AuthenticationContext::new())
            .unwrap_err();
        assert!(matches!(err, ClientError::KeyNotFound { level: KeyLevel::Low, .. }));
    }

    #[test]
    fn test_method_level_raises_start() {
        // DeleteMember needs PRIVILEGED even under a LOW context
        let signer = signer_with(&[KeyLevel::Low, KeyLevel::Privileged]);
        let metadata = signer
            .sign(&Request::DeleteMember, &AuthenticationContext::new())
            .unwrap();

        let privileged = signer.exact_signer(KeyLevel::Privileged).unwrap();
        assert_eq!(metadata.key_id, privileged.key_id());
    }

    #[test]
    fn test_metadata_carries_context_and_valid_signature() {
        let signer = signer_with(&[KeyLevel::Low]);
        let context = AuthenticationContext::on_behalf_of("tt:abc").with_customer_initiated(true);
        let request = read_tokens();
        let metadata = signer.sign(&request, &context).unwrap();

        assert_eq!(metadata.realm, "paylink");
        assert_eq!(metadata.scheme, SIGNATURE_SCHEME);
        assert_eq!(metadata.created_at_ms, 1_000);
        assert_eq!(metadata.on_behalf_of.as_deref(), Some("tt:abc"));
        assert!(metadata.customer_initiated);

        let key = signer
            .crypto()
            .public_keys()
            .unwrap()
            .into_iter()
            .find(|k| k.id == metadata.key_id)
            .unwrap();
        let payload = signing_payload(&request, metadata.created_at_ms).unwrap();
        PublicKey::from_key(&key)
            .unwrap()
            .verify(&payload, &metadata.signature)
            .unwrap();
    }
}
