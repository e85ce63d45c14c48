//! Ed25519 key material, signers and the crypto engine
//!
//! Key types:
//! - `KeyPair`: private + public key at a given `KeyLevel`
//! - `PublicKey`: verification half, built from a registered `Key`
//! - `SecretKey`: serializable private key record held by a `KeyStore`
//! - `Signature`: who signed (member, key) and the signature bytes
//!
//! `CryptoEngine` is the seam the client signs through; `Ed25519CryptoEngine`
//! implements it over any `KeyStore`.

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signer as _, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::keystore::KeyStore;
use crate::types::{Key, KeyAlgorithm, KeyLevel};

/// Identifier of the only signature scheme this network speaks
pub const SIGNATURE_SCHEME: &str = "PAYLINK-ED25519-V1";

/// Derive a key id from public key bytes
///
/// First 16 hex characters of SHA-256 over the raw key.
pub fn key_id_for(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    hex::encode(&digest[..8])
}

/// Anything that can sign bytes on behalf of one key
pub trait Signer: Send + Sync {
    /// Id of the key that produces signatures
    fn key_id(&self) -> &str;

    /// Level of the key that produces signatures
    fn level(&self) -> KeyLevel;

    /// Sign the payload, returning raw signature bytes
    fn sign(&self, payload: &[u8]) -> Vec<u8>;
}

/// Key management and signer creation for a single member
pub trait CryptoEngine: Send + Sync {
    /// Generate and persist a new key at the given level
    fn generate_key(&self, level: KeyLevel) -> Result<Key> {
        let pair = self.stage_key(level);
        self.commit_key(&pair)?;
        Ok(pair.key())
    }

    /// Generate a key pair without persisting it
    ///
    /// The pair can sign immediately but no signer created by this engine
    /// sees it until `commit_key`. Use it for keys the network has not yet
    /// accepted.
    fn stage_key(&self, level: KeyLevel) -> KeyPair {
        KeyPair::generate(level)
    }

    /// Persist a staged key pair
    fn commit_key(&self, pair: &KeyPair) -> Result<()>;

    /// Signer for the member's key at exactly this level
    ///
    /// Fails with `KeyNotFound` if no such key was generated.
    fn create_signer(&self, level: KeyLevel) -> Result<Arc<dyn Signer>>;

    /// Public halves of every stored key
    fn public_keys(&self) -> Result<Vec<Key>>;
}

/// Ed25519 key pair tagged with its level
#[derive(Clone)]
pub struct KeyPair {
    key_id: String,
    level: KeyLevel,
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_id", &self.key_id)
            .field("level", &self.level)
            .field("signing_key", &"[redacted]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate(level: KeyLevel) -> Self {
        Self::from_signing_key(level, SigningKey::generate(&mut OsRng))
    }

    /// Build a key pair from an existing signing key
    pub fn from_signing_key(level: KeyLevel, signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            key_id: key_id_for(verifying_key.as_bytes()),
            level,
            signing_key,
            verifying_key,
        }
    }

    /// Restore a key pair from its stored secret
    pub fn from_secret(secret: &SecretKey) -> Result<Self> {
        let bytes: [u8; 32] = secret
            .private_key
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::CryptoError("Invalid private key length".into()))?;
        let pair = Self::from_signing_key(secret.level, SigningKey::from_bytes(&bytes));
        if pair.key_id != secret.key_id {
            return Err(CoreError::CryptoError(format!(
                "Stored key id '{}' does not match key material",
                secret.key_id
            )));
        }
        Ok(pair)
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn level(&self) -> KeyLevel {
        self.level
    }

    /// The public `Key` record to register with the network
    pub fn key(&self) -> Key {
        Key {
            id: self.key_id.clone(),
            public_key: STANDARD.encode(self.verifying_key.as_bytes()),
            algorithm: KeyAlgorithm::Ed25519,
            level: self.level,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key_id: self.key_id.clone(),
            verifying_key: self.verifying_key,
        }
    }

    /// Serializable secret for a key store
    pub fn secret(&self) -> SecretKey {
        SecretKey {
            key_id: self.key_id.clone(),
            level: self.level,
            algorithm: KeyAlgorithm::Ed25519,
            private_key: self.signing_key.to_bytes().to_vec(),
        }
    }
}

impl Signer for KeyPair {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn level(&self) -> KeyLevel {
        self.level
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        self.signing_key.sign(payload).to_bytes().to_vec()
    }
}

/// Ed25519 public key for verification
#[derive(Clone)]
pub struct PublicKey {
    key_id: String,
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey").field("key_id", &self.key_id).finish()
    }
}

impl PublicKey {
    /// Create a public key from raw bytes
    pub fn from_bytes(key_id: impl Into<String>, bytes: &[u8; 32]) -> Result<Self> {
        let verifying_key = VerifyingKey::from_bytes(bytes)?;
        Ok(Self {
            key_id: key_id.into(),
            verifying_key,
        })
    }

    /// Decode a registered `Key` record
    pub fn from_key(key: &Key) -> Result<Self> {
        let bytes = STANDARD.decode(&key.public_key)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::CryptoError("Invalid public key length".into()))?;
        Self::from_bytes(key.id.clone(), &bytes)
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Verify raw signature bytes over a payload
    pub fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<()> {
        let bytes: [u8; 64] = signature
            .try_into()
            .map_err(|_| CoreError::CryptoError("Invalid signature length".into()))?;
        let signature = ed25519_dalek::Signature::from_bytes(&bytes);
        self.verifying_key
            .verify(payload, &signature)
            .map_err(|e| CoreError::CryptoError(e.to_string()))
    }
}

/// Private key record as persisted by a `KeyStore`
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretKey {
    pub key_id: String,
    pub level: KeyLevel,
    pub algorithm: KeyAlgorithm,
    #[serde(with = "serde_bytes_base64")]
    pub private_key: Vec<u8>,
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("key_id", &self.key_id)
            .field("level", &self.level)
            .field("private_key", &"[redacted]")
            .finish()
    }
}

/// A signature attributed to a member's key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub member_id: String,
    pub key_id: String,
    #[serde(with = "serde_bytes_base64")]
    pub signature: Vec<u8>,
}

impl Signature {
    /// Sign `payload` with `signer` on behalf of `member_id`
    pub fn create(member_id: impl Into<String>, signer: &dyn Signer, payload: &[u8]) -> Self {
        Self {
            member_id: member_id.into(),
            key_id: signer.key_id().to_string(),
            signature: signer.sign(payload),
        }
    }

    /// Verify against a registered key
    ///
    /// The key id on the signature must match the key.
    pub fn verify(&self, key: &Key, payload: &[u8]) -> Result<()> {
        if key.id != self.key_id {
            return Err(CoreError::CryptoError(format!(
                "Key ID mismatch: expected '{}', got '{}'",
                key.id, self.key_id
            )));
        }
        PublicKey::from_key(key)?.verify(payload, &self.signature)
    }
}

/// `CryptoEngine` backed by a `KeyStore`
pub struct Ed25519CryptoEngine {
    member_id: String,
    store: Arc<dyn KeyStore>,
}

impl Ed25519CryptoEngine {
    pub fn new(member_id: impl Into<String>, store: Arc<dyn KeyStore>) -> Self {
        Self {
            member_id: member_id.into(),
            store,
        }
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }
}

impl CryptoEngine for Ed25519CryptoEngine {
    fn commit_key(&self, pair: &KeyPair) -> Result<()> {
        self.store.put(&self.member_id, pair.secret())?;
        debug!(
            member_id = %self.member_id,
            key_id = %pair.key_id(),
            key_level = %pair.level(),
            "Stored key"
        );
        Ok(())
    }

    fn create_signer(&self, level: KeyLevel) -> Result<Arc<dyn Signer>> {
        let secret = self
            .store
            .get_by_level(&self.member_id, level)?
            .ok_or_else(|| CoreError::KeyNotFound {
                member_id: self.member_id.clone(),
                level,
            })?;
        Ok(Arc::new(KeyPair::from_secret(&secret)?))
    }

    fn public_keys(&self) -> Result<Vec<Key>> {
        self.store
            .list(&self.member_id)?
            .iter()
            .map(|secret| KeyPair::from_secret(secret).map(|pair| pair.key()))
            .collect()
    }
}

/// Base64 serialization for byte fields
pub mod serde_bytes_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::InMemoryKeyStore;

    #[test]
    fn test_keypair_generation() {
        let kp = KeyPair::generate(KeyLevel::Standard);
        assert_eq!(kp.level(), KeyLevel::Standard);
        assert_eq!(kp.key_id().len(), 16);
        assert_eq!(kp.key().id, kp.key_id());
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = KeyPair::generate(KeyLevel::Low);
        let sig = Signature::create("m:alice", &kp, b"payload");

        assert_eq!(sig.key_id, kp.key_id());
        assert!(sig.verify(&kp.key(), b"payload").is_ok());
        assert!(sig.verify(&kp.key(), b"tampered").is_err());
    }

    #[test]
    fn test_verification_fails_with_wrong_key() {
        let kp1 = KeyPair::generate(KeyLevel::Low);
        let kp2 = KeyPair::generate(KeyLevel::Low);

        let sig = Signature::create("m:alice", &kp1, b"payload");
        assert!(sig.verify(&kp2.key(), b"payload").is_err());

        // Same bytes but claiming kp2's id still fails verification
        let mut forged = sig.clone();
        forged.key_id = kp2.key_id().to_string();
        assert!(forged.verify(&kp2.key(), b"payload").is_err());
    }

    #[test]
    fn test_staged_key_is_invisible_until_committed() {
        let store = Arc::new(InMemoryKeyStore::new());
        let engine = Ed25519CryptoEngine::new("m:alice", store.clone());
        let original = engine.generate_key(KeyLevel::Low).unwrap();

        let staged = engine.stage_key(KeyLevel::Low);
        assert_eq!(store.list("m:alice").unwrap().len(), 1);
        assert_eq!(engine.create_signer(KeyLevel::Low).unwrap().key_id(), original.id);

        engine.commit_key(&staged).unwrap();
        assert_eq!(engine.create_signer(KeyLevel::Low).unwrap().key_id(), staged.key_id());
    }

    #[test]
    fn test_secret_roundtrip_preserves_key_id() {
        let kp = KeyPair::generate(KeyLevel::Privileged);
        let restored = KeyPair::from_secret(&kp.secret()).unwrap();
        assert_eq!(restored.key_id(), kp.key_id());
        assert_eq!(restored.level(), KeyLevel::Privileged);
    }

    #[test]
    fn test_secret_with_wrong_key_id_rejected() {
        let kp = KeyPair::generate(KeyLevel::Low);
        let mut secret = kp.secret();
        secret.key_id = "0000000000000000".into();
        assert!(KeyPair::from_secret(&secret).is_err());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let kp = KeyPair::generate(KeyLevel::Low);
        let rendered = format!("{:?} {:?}", kp, kp.secret());
        assert!(rendered.contains("[redacted]"));
        assert!(!rendered.contains(&STANDARD.encode(kp.secret().private_key)));
    }

    #[test]
    fn test_engine_signer_by_level() {
        let store = Arc::new(InMemoryKeyStore::new());
        let engine = Ed25519CryptoEngine::new("m:alice", store);

        let standard = engine.generate_key(KeyLevel::Standard).unwrap();
        let signer = engine.create_signer(KeyLevel::Standard).unwrap();
        assert_eq!(signer.key_id(), standard.id);
        assert_eq!(signer.level(), KeyLevel::Standard);

        let err = engine.create_signer(KeyLevel::Privileged).err().unwrap();
        assert_eq!(
            err,
            CoreError::KeyNotFound {
                member_id: "m:alice".into(),
                level: KeyLevel::Privileged
            }
        );
    }

    #[test]
    fn test_engine_public_keys() {
        let store = Arc::new(InMemoryKeyStore::new());
        let engine = Ed25519CryptoEngine::new("m:bob", store);
        for level in KeyLevel::ALL {
            engine.generate_key(level).unwrap();
        }
        let keys = engine.public_keys().unwrap();
        assert_eq!(keys.len(), 3);
        assert!(keys.iter().any(|k| k.level == KeyLevel::Privileged));
    }
}
