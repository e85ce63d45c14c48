//! Key Registry for the gateway
//!
//! Manages cryptographic keys for:
//! - The gateway's own recovery agent signing key
//! - Public keys of other recovery agents whose authorizations are accepted

use paylink_core::{
    CoreError, Key, KeyLevel, KeyPair, MemberRecoveryOperation, RecoveryAuthorization, Signature,
};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::{info, warn};

/// Key Registry for the gateway
///
/// Thread-safe storage for:
/// - the local agent key pair (signs recovery authorizations)
/// - agent public keys by agent id (verifies recovery authorizations)
pub struct KeyRegistry {
    /// Agent public keys (agent id -> key), including our own
    agent_keys: RwLock<HashMap<String, Key>>,

    /// Id of the agent this gateway runs
    agent_id: String,

    /// This gateway's agent key pair
    agent_key_pair: KeyPair,
}

impl std::fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRegistry")
            .field("agent_id", &self.agent_id)
            .field("agent_key_id", &self.agent_key_pair.key_id())
            .finish()
    }
}

impl KeyRegistry {
    /// Create a registry around an existing agent key pair
    ///
    /// The agent's public key is registered so that its own authorizations
    /// verify.
    pub fn new(agent_id: impl Into<String>, agent_key_pair: KeyPair) -> Self {
        let agent_id = agent_id.into();
        let mut agent_keys = HashMap::new();
        agent_keys.insert(agent_id.clone(), agent_key_pair.key());

        info!(agent_id = %agent_id, key_id = %agent_key_pair.key_id(), "Key registry initialized with agent key");

        Self {
            agent_keys: RwLock::new(agent_keys),
            agent_id,
            agent_key_pair,
        }
    }

    /// Generate a registry with a random agent key
    pub fn generate(agent_id: impl Into<String>) -> Self {
        Self::new(agent_id, KeyPair::generate(KeyLevel::Privileged))
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn agent_key(&self) -> Key {
        self.agent_key_pair.key()
    }

    // =========================================================================
    // Agent Key Management
    // =========================================================================

    /// Accept recovery authorizations signed by another agent
    pub fn register_agent(&self, agent_id: impl Into<String>, key: Key) {
        let agent_id = agent_id.into();
        info!(agent_id = %agent_id, key_id = %key.id, "Registered agent key");
        self.agent_keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(agent_id, key);
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<Key> {
        self.agent_keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(agent_id)
            .cloned()
    }

    pub fn agent_count(&self) -> usize {
        self.agent_keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // =========================================================================
    // Signing Operations
    // =========================================================================

    /// Sign a recovery authorization as this gateway's agent
    pub fn authorize_recovery(
        &self,
        authorization: RecoveryAuthorization,
    ) -> Result<MemberRecoveryOperation, CoreError> {
        let payload = authorization.canonical_bytes()?;
        let agent_signature = Signature::create(&self.agent_id, &self.agent_key_pair, &payload);
        Ok(MemberRecoveryOperation {
            authorization,
            agent_signature,
        })
    }

    /// Verify that a recovery operation was signed by one of `allowed_agents`
    pub fn verify_recovery(
        &self,
        operation: &MemberRecoveryOperation,
        allowed_agents: &[&str],
    ) -> Result<(), CoreError> {
        let agent_id = operation.agent_signature.member_id.as_str();
        if !allowed_agents.contains(&agent_id) {
            warn!(agent_id = %agent_id, "Recovery signed by an agent not named in the recovery rule");
            return Err(CoreError::CryptoError(format!(
                "agent '{}' may not recover this member",
                agent_id
            )));
        }
        let key = self
            .get_agent(agent_id)
            .ok_or_else(|| CoreError::UnknownKey(format!("agent {}", agent_id)))?;
        let payload = operation.authorization.canonical_bytes()?;
        operation.agent_signature.verify(&key, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authorization() -> RecoveryAuthorization {
        RecoveryAuthorization {
            member_id: "m:alice".into(),
            prev_hash: "abc".into(),
            member_key: KeyPair::generate(KeyLevel::Privileged).key(),
        }
    }

    #[test]
    fn test_registry_creation() {
        let registry = KeyRegistry::generate("agent-1");
        assert_eq!(registry.agent_id(), "agent-1");
        assert!(registry.get_agent("agent-1").is_some());
        assert_eq!(registry.agent_count(), 1);
    }

    #[test]
    fn test_authorize_and_verify() {
        let registry = KeyRegistry::generate("agent-1");
        let operation = registry.authorize_recovery(authorization()).unwrap();

        assert!(registry.verify_recovery(&operation, &["agent-1"]).is_ok());
        assert!(registry.verify_recovery(&operation, &["agent-2"]).is_err());
    }

    #[test]
    fn test_tampered_authorization_rejected() {
        let registry = KeyRegistry::generate("agent-1");
        let mut operation = registry.authorize_recovery(authorization()).unwrap();
        operation.authorization.prev_hash = "other".into();

        assert!(registry.verify_recovery(&operation, &["agent-1"]).is_err());
    }

    #[test]
    fn test_federated_agent() {
        let local = KeyRegistry::generate("agent-1");
        let remote = KeyRegistry::generate("agent-2");
        local.register_agent("agent-2", remote.agent_key());

        let operation = remote.authorize_recovery(authorization()).unwrap();
        assert!(local.verify_recovery(&operation, &["agent-2"]).is_ok());
    }
}
