//! Persistence for member key material
//!
//! Stores are queried by member and level. The most recently stored key at a
//! level wins. Implementations must be safe for concurrent signer creation on
//! the same member: reads share a lock, writes append.

use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::info;

use crate::crypto::SecretKey;
use crate::error::Result;
use crate::types::KeyLevel;

/// Storage backend for private keys
pub trait KeyStore: Send + Sync + Debug {
    /// Store a key for a member, replacing any key with the same id
    fn put(&self, member_id: &str, key: SecretKey) -> Result<()>;

    /// Most recently stored key at exactly `level`
    fn get_by_level(&self, member_id: &str, level: KeyLevel) -> Result<Option<SecretKey>>;

    /// Key by id
    fn get_by_id(&self, member_id: &str, key_id: &str) -> Result<Option<SecretKey>>;

    /// All keys for a member in insertion order
    fn list(&self, member_id: &str) -> Result<Vec<SecretKey>>;

    /// Forget every key of a member
    fn delete_member(&self, member_id: &str) -> Result<()>;
}

fn upsert(keys: &mut Vec<SecretKey>, key: SecretKey) {
    keys.retain(|k| k.key_id != key.key_id);
    keys.push(key);
}

fn latest_at(keys: &[SecretKey], level: KeyLevel) -> Option<SecretKey> {
    keys.iter().rev().find(|k| k.level == level).cloned()
}

/// In-memory key store
///
/// Data is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    keys: RwLock<HashMap<String, Vec<SecretKey>>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for InMemoryKeyStore {
    fn put(&self, member_id: &str, key: SecretKey) -> Result<()> {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        upsert(keys.entry(member_id.to_string()).or_default(), key);
        Ok(())
    }

    fn get_by_level(&self, member_id: &str, level: KeyLevel) -> Result<Option<SecretKey>> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        Ok(keys.get(member_id).and_then(|k| latest_at(k, level)))
    }

    fn get_by_id(&self, member_id: &str, key_id: &str) -> Result<Option<SecretKey>> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        Ok(keys
            .get(member_id)
            .and_then(|k| k.iter().find(|s| s.key_id == key_id).cloned()))
    }

    fn list(&self, member_id: &str) -> Result<Vec<SecretKey>> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        Ok(keys.get(member_id).cloned().unwrap_or_default())
    }

    fn delete_member(&self, member_id: &str) -> Result<()> {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        keys.remove(member_id);
        Ok(())
    }
}

/// Key store writing one JSON file per member into a directory
///
/// File names are the hex-encoded member id, so any member id is a valid
/// file name. Writes go through a temp file and a rename.
#[derive(Debug)]
pub struct FileKeyStore {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl FileKeyStore {
    /// Open (and create if needed) a key directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), "Opened file key store");
        Ok(Self {
            dir,
            lock: RwLock::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, member_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(member_id)))
    }

    fn read_member(&self, member_id: &str) -> Result<Vec<SecretKey>> {
        let path = self.path_for(member_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_member(&self, member_id: &str, keys: &[SecretKey]) -> Result<()> {
        let path = self.path_for(member_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(keys)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl KeyStore for FileKeyStore {
    fn put(&self, member_id: &str, key: SecretKey) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let mut keys = self.read_member(member_id)?;
        upsert(&mut keys, key);
        self.write_member(member_id, &keys)
    }

    fn get_by_level(&self, member_id: &str, level: KeyLevel) -> Result<Option<SecretKey>> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        Ok(latest_at(&self.read_member(member_id)?, level))
    }

    fn get_by_id(&self, member_id: &str, key_id: &str) -> Result<Option<SecretKey>> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        Ok(self
            .read_member(member_id)?
            .into_iter()
            .find(|k| k.key_id == key_id))
    }

    fn list(&self, member_id: &str) -> Result<Vec<SecretKey>> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        self.read_member(member_id)
    }

    fn delete_member(&self, member_id: &str) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let path = self.path_for(member_id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
