//! Common types used across the Paylink network

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Strength of proof-of-possession a key provides
///
/// Ordering is total: `Low < Standard < Privileged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyLevel {
    /// Low-risk calls such as reads
    Low,
    /// Everyday authorizations
    Standard,
    /// Member mutation and other high-risk calls
    Privileged,
}

impl KeyLevel {
    /// All levels from lowest to highest
    pub const ALL: [KeyLevel; 3] = [KeyLevel::Low, KeyLevel::Standard, KeyLevel::Privileged];

    /// The next lower level, if any
    pub fn lower(self) -> Option<KeyLevel> {
        match self {
            KeyLevel::Privileged => Some(KeyLevel::Standard),
            KeyLevel::Standard => Some(KeyLevel::Low),
            KeyLevel::Low => None,
        }
    }

    /// This level followed by every lower level, ending at `Low`
    pub fn descending(self) -> impl Iterator<Item = KeyLevel> {
        std::iter::successors(Some(self), |level| level.lower())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyLevel::Low => "LOW",
            KeyLevel::Standard => "STANDARD",
            KeyLevel::Privileged => "PRIVILEGED",
        }
    }
}

impl fmt::Display for KeyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOW" => Ok(KeyLevel::Low),
            "STANDARD" => Ok(KeyLevel::Standard),
            "PRIVILEGED" => Ok(KeyLevel::Privileged),
            _ => Err(format!("Unknown key level: {}", s)),
        }
    }
}

/// Signature algorithm of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyAlgorithm {
    Ed25519,
}

/// Public half of a member key as registered with the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    /// Key identifier, unique within a member
    pub id: String,

    /// Base64-encoded public key bytes
    pub public_key: String,

    pub algorithm: KeyAlgorithm,

    pub level: KeyLevel,
}

/// Kinds of alias a member can be found by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasType {
    Email,
    Domain,
    Phone,
    Username,
    Custom,
}

/// Typed identifier for a member, optionally scoped to a realm
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alias {
    #[serde(rename = "type")]
    pub alias_type: AliasType,

    pub value: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
}

impl Alias {
    /// Create a new alias
    pub fn new(alias_type: AliasType, value: impl Into<String>) -> Self {
        Self {
            alias_type,
            value: value.into(),
            realm: None,
        }
    }

    /// Create an email alias
    pub fn email(value: impl Into<String>) -> Self {
        Self::new(AliasType::Email, value)
    }

    /// Create a domain alias
    pub fn domain(value: impl Into<String>) -> Self {
        Self::new(AliasType::Domain, value)
    }

    /// Create a username alias
    pub fn username(value: impl Into<String>) -> Self {
        Self::new(AliasType::Username, value)
    }

    /// Scope the alias to a realm
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Canonical form used for storage and comparison
    ///
    /// Emails and domains are case-insensitive; surrounding whitespace is
    /// never significant.
    pub fn normalized(&self) -> Alias {
        let value = self.value.trim();
        let value = match self.alias_type {
            AliasType::Email | AliasType::Domain => value.to_lowercase(),
            _ => value.to_string(),
        };
        Alias {
            alias_type: self.alias_type,
            value,
            realm: self.realm.clone(),
        }
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.realm {
            Some(realm) => write!(f, "{:?}:{}@{}", self.alias_type, self.value, realm),
            None => write!(f, "{:?}:{}", self.alias_type, self.value),
        }
    }
}

/// Type of member account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberType {
    #[default]
    Personal,
    Business,
}

/// Who may authorize recovery of a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRule {
    /// Agent whose signature authorizes recovery
    pub primary_agent: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary_agents: Vec<String>,
}

impl RecoveryRule {
    pub fn new(primary_agent: impl Into<String>) -> Self {
        Self {
            primary_agent: primary_agent.into(),
            secondary_agents: Vec::new(),
        }
    }
}
