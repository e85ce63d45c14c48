//! Member operation log
//!
//! A member's keys, aliases and recovery rule are the result of replaying an
//! ordered list of `MemberUpdate`s. Each update names the hash of the state
//! it was built against (`prev_hash`); applying it advances the state to
//!
//! ```text
//! last_hash = hex(sha256(prev_hash || canonical(update)))
//! ```
//!
//! An update whose `prev_hash` is not the current `last_hash` is rejected
//! with `StaleHash`. A new member starts with an empty `last_hash`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::Signature;
use crate::error::{CoreError, Result};
use crate::types::{Alias, Key, KeyLevel, MemberType, RecoveryRule};

/// One mutation of member state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemberOperation {
    AddKey { key: Key },
    RemoveKey { key_id: String },
    AddAlias { alias: Alias },
    RemoveAlias { alias: Alias },
    SetRecoveryRule { rule: RecoveryRule },
    /// Replace every key with the one authorized by a recovery agent
    Recover { recovery: MemberRecoveryOperation },
}

impl MemberOperation {
    pub fn add_key(key: Key) -> Self {
        MemberOperation::AddKey { key }
    }

    pub fn remove_key(key_id: impl Into<String>) -> Self {
        MemberOperation::RemoveKey {
            key_id: key_id.into(),
        }
    }

    pub fn add_alias(alias: Alias) -> Self {
        MemberOperation::AddAlias { alias }
    }

    pub fn remove_alias(alias: Alias) -> Self {
        MemberOperation::RemoveAlias { alias }
    }
}

/// A batch of operations bound to the state it was built against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberUpdate {
    pub member_id: String,
    pub prev_hash: String,
    pub operations: Vec<MemberOperation>,
}

impl MemberUpdate {
    pub fn new(
        member_id: impl Into<String>,
        prev_hash: impl Into<String>,
        operations: Vec<MemberOperation>,
    ) -> Self {
        Self {
            member_id: member_id.into(),
            prev_hash: prev_hash.into(),
            operations,
        }
    }

    /// Bytes that the update signature covers
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Hash of the state this update produces
    pub fn chain_hash(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.prev_hash.as_bytes());
        hasher.update(self.canonical_bytes()?);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Keys added by this update
    pub fn added_keys(&self) -> impl Iterator<Item = &Key> {
        self.operations.iter().filter_map(|op| match op {
            MemberOperation::AddKey { key } => Some(key),
            MemberOperation::Recover { recovery } => Some(&recovery.authorization.member_key),
            _ => None,
        })
    }

    /// Recovery operations carried by this update
    pub fn recoveries(&self) -> impl Iterator<Item = &MemberRecoveryOperation> {
        self.operations.iter().filter_map(|op| match op {
            MemberOperation::Recover { recovery } => Some(recovery),
            _ => None,
        })
    }
}

/// What a recovery agent signs: "this key may take over this member at this hash"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryAuthorization {
    pub member_id: String,
    pub prev_hash: String,
    pub member_key: Key,
}

impl RecoveryAuthorization {
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Agent-signed recovery authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecoveryOperation {
    pub authorization: RecoveryAuthorization,
    pub agent_signature: Signature,
}

/// The last observed identity of a member state: id plus hash
///
/// Every write must present the view it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberView {
    pub member_id: String,
    pub last_hash: String,
}

/// Materialized member state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberState {
    pub member_id: String,
    #[serde(default)]
    pub member_type: MemberType,
    pub last_hash: String,
    #[serde(default)]
    pub keys: Vec<Key>,
    #[serde(default)]
    pub aliases: Vec<Alias>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_rule: Option<RecoveryRule>,
}

impl MemberState {
    /// Empty state of a freshly allocated member id
    pub fn new(member_id: impl Into<String>, member_type: MemberType) -> Self {
        Self {
            member_id: member_id.into(),
            member_type,
            last_hash: String::new(),
            keys: Vec::new(),
            aliases: Vec::new(),
            recovery_rule: None,
        }
    }

    /// Rebuild state by replaying an update log from the beginning
    pub fn replay<'a>(
        member_id: impl Into<String>,
        member_type: MemberType,
        updates: impl IntoIterator<Item = &'a MemberUpdate>,
    ) -> Result<Self> {
        let mut state = Self::new(member_id, member_type);
        for update in updates {
            state.apply(update)?;
        }
        Ok(state)
    }

    pub fn view(&self) -> MemberView {
        MemberView {
            member_id: self.member_id.clone(),
            last_hash: self.last_hash.clone(),
        }
    }

    pub fn key(&self, key_id: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.id == key_id)
    }

    pub fn has_key_at_least(&self, level: KeyLevel) -> bool {
        self.keys.iter().any(|k| k.level >= level)
    }

    pub fn has_alias(&self, alias: &Alias) -> bool {
        let alias = alias.normalized();
        self.aliases.iter().any(|a| *a == alias)
    }

    /// Apply an update atomically
    ///
    /// Either every operation applies and `last_hash` advances, or the state
    /// is left untouched.
    pub fn apply(&mut self, update: &MemberUpdate) -> Result<()> {
        if update.member_id != self.member_id {
            return Err(CoreError::InvalidOperation(format!(
                "update for '{}' applied to '{}'",
                update.member_id, self.member_id
            )));
        }
        if update.prev_hash != self.last_hash {
            return Err(CoreError::StaleHash {
                expected: self.last_hash.clone(),
                actual: update.prev_hash.clone(),
            });
        }

        let mut next = self.clone();
        for op in &update.operations {
            next.apply_operation(op)?;
        }
        next.last_hash = update.chain_hash()?;
        *self = next;
        Ok(())
    }

    fn apply_operation(&mut self, op: &MemberOperation) -> Result<()> {
        match op {
            MemberOperation::AddKey { key } => {
                if self.key(&key.id).is_some() {
                    return Err(CoreError::InvalidOperation(format!(
                        "key '{}' already exists",
                        key.id
                    )));
                }
                self.keys.push(key.clone());
            }
            MemberOperation::RemoveKey { key_id } => {
                let before = self.keys.len();
                self.keys.retain(|k| &k.id != key_id);
                if self.keys.len() == before {
                    return Err(CoreError::InvalidOperation(format!(
                        "key '{}' not found",
                        key_id
                    )));
                }
            }
            MemberOperation::AddAlias { alias } => {
                if self.has_alias(alias) {
                    return Err(CoreError::InvalidOperation(format!(
                        "alias {} already present",
                        alias
                    )));
                }
                self.aliases.push(alias.normalized());
            }
            MemberOperation::RemoveAlias { alias } => {
                let alias = alias.normalized();
                let before = self.aliases.len();
                self.aliases.retain(|a| *a != alias);
                if self.aliases.len() == before {
                    return Err(CoreError::InvalidOperation(format!(
                        "alias {} not found",
                        alias
                    )));
                }
            }
            MemberOperation::SetRecoveryRule { rule } => {
                self.recovery_rule = Some(rule.clone());
            }
            MemberOperation::Recover { recovery } => {
                let auth = &recovery.authorization;
                if auth.member_id != self.member_id || auth.prev_hash != self.last_hash {
                    return Err(CoreError::InvalidOperation(
                        "recovery authorization does not match member state".into(),
                    ));
                }
                if auth.member_key.level != KeyLevel::Privileged {
                    return Err(CoreError::InvalidOperation(
                        "recovered key must be PRIVILEGED".into(),
                    ));
                }
                self.keys = vec![auth.member_key.clone()];
            }
        }
        Ok(())
    }
}
