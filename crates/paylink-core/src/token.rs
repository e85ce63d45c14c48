//! Token types
//!
//! A token is an immutable `TokenPayload` plus the signatures collected on
//! it. The token id is derived from the canonical payload bytes, so creating
//! the same payload twice names the same token.
//!
//! Lifecycle:
//!
//! ```text
//! CREATED -> PARTIALLY_ENDORSED -> ENDORSED
//!    \              \                 \
//!     +--------------+-----------------+--> CANCELLED | REPLACED
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::amount::Amount;
use crate::crypto::{Signature, Signer};
use crate::error::{CoreError, Result};
use crate::types::{Alias, KeyLevel};

/// Prefix of every token id
pub const TOKEN_ID_PREFIX: &str = "tt:";

/// Current payload version
pub const PAYLOAD_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Transfer,
    Access,
}

/// A party named on a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMember {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<Alias>,
}

impl TokenMember {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alias: None,
        }
    }
}

/// Money movement authorized by a transfer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferBody {
    /// Lifetime amount that may be redeemed
    pub amount: String,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_account_id: Option<String>,
}

/// Something an access token lets the grantee read
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Resource {
    AllAccounts,
    Account { account_id: String },
    Balance { account_id: String },
    Transactions { account_id: String },
    TransferDestinations { account_id: String },
}

impl Resource {
    /// Whether holding `self` grants `needed`
    pub fn grants(&self, needed: &Resource) -> bool {
        matches!(self, Resource::AllAccounts) || self == needed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessBody {
    pub resources: Vec<Resource>,
}

impl AccessBody {
    pub fn grants(&self, needed: &Resource) -> bool {
        self.resources.iter().any(|r| r.grants(needed))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenBody {
    Transfer(TransferBody),
    Access(AccessBody),
}

/// Immutable description of what a token authorizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub version: String,

    /// Caller-chosen reference; two payloads differing only here are two tokens
    pub ref_id: String,

    /// Issuer (payer or grantor)
    pub from: TokenMember,

    /// Redeemer (payee or grantee)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<TokenMember>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<i64>,

    pub body: TokenBody,
}

impl TokenPayload {
    /// Start a transfer payload
    pub fn transfer(amount: impl Into<String>, currency: impl Into<String>) -> TokenPayloadBuilder {
        TokenPayloadBuilder::new(TokenBody::Transfer(TransferBody {
            amount: amount.into(),
            currency: currency.into(),
            source_account_id: None,
        }))
    }

    /// Start an access payload
    pub fn access(resources: Vec<Resource>) -> TokenPayloadBuilder {
        TokenPayloadBuilder::new(TokenBody::Access(AccessBody { resources }))
    }

    pub fn kind(&self) -> TokenKind {
        match self.body {
            TokenBody::Transfer(_) => TokenKind::Transfer,
            TokenBody::Access(_) => TokenKind::Access,
        }
    }

    pub fn transfer_body(&self) -> Option<&TransferBody> {
        match &self.body {
            TokenBody::Transfer(body) => Some(body),
            TokenBody::Access(_) => None,
        }
    }

    pub fn access_body(&self) -> Option<&AccessBody> {
        match &self.body {
            TokenBody::Access(body) => Some(body),
            TokenBody::Transfer(_) => None,
        }
    }

    pub fn redeemer_id(&self) -> Option<&str> {
        self.to.as_ref().map(|m| m.id.as_str())
    }

    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Id derived from the canonical payload
    pub fn token_id(&self) -> Result<String> {
        let digest = Sha256::digest(self.canonical_bytes()?);
        Ok(format!("{}{}", TOKEN_ID_PREFIX, hex::encode(digest)))
    }

    /// Check mandatory fields
    pub fn validate(&self) -> Result<()> {
        if self.from.id.trim().is_empty() {
            return Err(CoreError::InvalidPayload("issuer is required".into()));
        }
        match self.redeemer_id() {
            Some(id) if !id.trim().is_empty() => {}
            _ => return Err(CoreError::InvalidPayload("redeemer is required".into())),
        }

        match &self.body {
            TokenBody::Transfer(body) => {
                match body.source_account_id.as_deref() {
                    Some(id) if !id.trim().is_empty() => {}
                    _ => {
                        return Err(CoreError::InvalidPayload(
                            "source account is required".into(),
                        ))
                    }
                }
                if body.currency.trim().is_empty() {
                    return Err(CoreError::InvalidPayload("currency is required".into()));
                }
                let amount = Amount::parse(&body.amount)
                    .map_err(|e| CoreError::InvalidPayload(e.to_string()))?;
                if amount.is_zero() {
                    return Err(CoreError::InvalidPayload("amount must be positive".into()));
                }
            }
            TokenBody::Access(body) => {
                if body.resources.is_empty() {
                    return Err(CoreError::InvalidPayload(
                        "access token needs at least one resource".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Lowest key level whose endorsement makes this token usable
    ///
    /// Transfers above `privileged_threshold` need a PRIVILEGED endorsement,
    /// everything else STANDARD.
    pub fn required_endorsement_level(&self, privileged_threshold: Amount) -> Result<KeyLevel> {
        match &self.body {
            TokenBody::Transfer(body) => {
                let amount = Amount::parse(&body.amount)?;
                if amount > privileged_threshold {
                    Ok(KeyLevel::Privileged)
                } else {
                    Ok(KeyLevel::Standard)
                }
            }
            TokenBody::Access(_) => Ok(KeyLevel::Standard),
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.map(|exp| now_ms >= exp).unwrap_or(false)
    }
}

/// Builder for token payloads
///
/// # Example
///
/// ```ignore
/// let payload = TokenPayload::transfer("100", "USD")
///     .from("m:alice")
///     .source_account("acct:checking")
///     .redeemer("m:merchant")
///     .build()?;
/// ```
#[derive(Debug)]
pub struct TokenPayloadBuilder {
    body: TokenBody,
    from: Option<String>,
    to: Option<TokenMember>,
    ref_id: Option<String>,
    description: Option<String>,
    expires_at_ms: Option<i64>,
}

impl TokenPayloadBuilder {
    fn new(body: TokenBody) -> Self {
        Self {
            body,
            from: None,
            to: None,
            ref_id: None,
            description: None,
            expires_at_ms: None,
        }
    }

    pub fn from(mut self, member_id: impl Into<String>) -> Self {
        self.from = Some(member_id.into());
        self
    }

    pub fn redeemer(mut self, member_id: impl Into<String>) -> Self {
        self.to = Some(TokenMember::new(member_id));
        self
    }

    pub fn redeemer_alias(mut self, member_id: impl Into<String>, alias: Alias) -> Self {
        self.to = Some(TokenMember {
            id: member_id.into(),
            alias: Some(alias.normalized()),
        });
        self
    }

    /// Source account of a transfer; ignored for access tokens
    pub fn source_account(mut self, account_id: impl Into<String>) -> Self {
        if let TokenBody::Transfer(ref mut body) = self.body {
            body.source_account_id = Some(account_id.into());
        }
        self
    }

    pub fn ref_id(mut self, ref_id: impl Into<String>) -> Self {
        self.ref_id = Some(ref_id.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn expires_at_ms(mut self, expires_at_ms: i64) -> Self {
        self.expires_at_ms = Some(expires_at_ms);
        self
    }

    /// Build the payload
    ///
    /// A random ref id is assigned if none was set. Mandatory fields are
    /// checked by `TokenPayload::validate`, not here, so that incomplete
    /// payloads can still be constructed and rejected at creation time.
    pub fn build(self) -> Result<TokenPayload> {
        let from = self.from.ok_or(CoreError::MissingField("from".into()))?;
        Ok(TokenPayload {
            version: PAYLOAD_VERSION.to_string(),
            ref_id: self
                .ref_id
                .unwrap_or_else(|| format!("{:016x}", rand::random::<u64>())),
            from: TokenMember::new(from),
            to: self.to,
            description: self.description,
            expires_at_ms: self.expires_at_ms,
            body: self.body,
        })
    }
}

/// What a token signature asserts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Endorsed,
    Cancelled,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Endorsed => "endorsed",
            Action::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The string a token signature covers: `"<token_id>.<action>"`
pub fn token_action(token_id: &str, action: Action) -> String {
    format!("{}.{}", token_id, action)
}

/// A signature on a token, tagged with the action and signing level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSignature {
    pub action: Action,
    pub level: KeyLevel,
    pub signature: Signature,
}

impl TokenSignature {
    /// Sign `action` on `token_id` as `member_id`
    pub fn create(
        token_id: &str,
        action: Action,
        member_id: impl Into<String>,
        signer: &dyn Signer,
    ) -> Self {
        let payload = token_action(token_id, action);
        Self {
            action,
            level: signer.level(),
            signature: Signature::create(member_id, signer, payload.as_bytes()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenState {
    Created,
    PartiallyEndorsed,
    Endorsed,
    Cancelled,
    Replaced,
}

impl TokenState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TokenState::Cancelled | TokenState::Replaced)
    }
}

/// A token as stored by the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub payload: TokenPayload,
    #[serde(default)]
    pub signatures: Vec<TokenSignature>,
    pub state: TokenState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced_by_token_id: Option<String>,
}

impl Token {
    /// A freshly created, unsigned token
    pub fn new(payload: TokenPayload) -> Result<Self> {
        Ok(Self {
            id: payload.token_id()?,
            payload,
            signatures: Vec::new(),
            state: TokenState::Created,
            replaced_by_token_id: None,
        })
    }

    pub fn endorsements(&self) -> impl Iterator<Item = &TokenSignature> {
        self.signatures
            .iter()
            .filter(|s| s.action == Action::Endorsed)
    }

    /// Highest level among endorsements, if any
    pub fn endorsement_level(&self) -> Option<KeyLevel> {
        self.endorsements().map(|s| s.level).max()
    }

    pub fn is_endorsed(&self) -> bool {
        self.state == TokenState::Endorsed
    }
}

/// Outcome of an endorsement
///
/// `MoreSignaturesNeeded` is a normal intermediate state, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndorsementStatus {
    Success,
    MoreSignaturesNeeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenOperationResult {
    pub token: Token,
    pub status: EndorsementStatus,
}

/// Outcome of an atomic cancel-and-create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReplaceResult {
    pub cancelled: Token,
    pub created: Token,
    pub status: EndorsementStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn payload() -> TokenPayload {
        TokenPayload::transfer("100", "USD")
            .from("m:alice")
            .source_account("acct:1")
            .redeemer("m:bob")
            .ref_id("ref-1")
            .build()
            .unwrap()
    }

    #[test]
    fn test_token_id_is_deterministic() {
        let a = payload();
        let b = payload();
        assert_eq!(a.token_id().unwrap(), b.token_id().unwrap());
        assert!(a.token_id().unwrap().starts_with(TOKEN_ID_PREFIX));

        let other = TokenPayload::transfer("100", "USD")
            .from("m:alice")
            .source_account("acct:1")
            .redeemer("m:bob")
            .ref_id("ref-2")
            .build()
            .unwrap();
        assert_ne!(a.token_id().unwrap(), other.token_id().unwrap());
    }

    #[test]
    fn test_validate_requires_redeemer_and_source() {
        let no_redeemer = TokenPayload::transfer("100", "USD")
            .from("m:alice")
            .source_account("acct:1")
            .build()
            .unwrap();
        assert!(matches!(
            no_redeemer.validate(),
            Err(CoreError::InvalidPayload(_))
        ));

        let no_source = TokenPayload::transfer("100", "USD")
            .from("m:alice")
            .redeemer("m:bob")
            .build()
            .unwrap();
        assert!(matches!(no_source.validate(), Err(CoreError::InvalidPayload(_))));

        assert!(payload().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_amounts() {
        for amount in ["0", "-1", "abc"] {
            let p = TokenPayload::transfer(amount, "USD")
                .from("m:alice")
                .source_account("acct:1")
                .redeemer("m:bob")
                .build()
                .unwrap();
            assert!(p.validate().is_err(), "amount {} should be rejected", amount);
        }
    }

    #[test]
    fn test_access_payload_validation() {
        let empty = TokenPayload::access(vec![])
            .from("m:alice")
            .redeemer("m:tpp")
            .build()
            .unwrap();
        assert!(empty.validate().is_err());

        let ok = TokenPayload::access(vec![Resource::AllAccounts])
            .from("m:alice")
            .redeemer("m:tpp")
            .build()
            .unwrap();
        assert!(ok.validate().is_ok());
        assert_eq!(ok.kind(), TokenKind::Access);
    }

    #[test]
    fn test_required_level_by_amount() {
        let threshold = Amount::parse("1000").unwrap();
        assert_eq!(
            payload().required_endorsement_level(threshold).unwrap(),
            KeyLevel::Standard
        );

        let large = TokenPayload::transfer("5000", "USD")
            .from("m:alice")
            .source_account("acct:1")
            .redeemer("m:bob")
            .build()
            .unwrap();
        assert_eq!(
            large.required_endorsement_level(threshold).unwrap(),
            KeyLevel::Privileged
        );
    }

    #[test]
    fn test_resource_grants() {
        let body = AccessBody {
            resources: vec![Resource::Balance {
                account_id: "a1".into(),
            }],
        };
        assert!(body.grants(&Resource::Balance {
            account_id: "a1".into()
        }));
        assert!(!body.grants(&Resource::Balance {
            account_id: "a2".into()
        }));
        assert!(Resource::AllAccounts.grants(&Resource::Transactions {
            account_id: "a2".into()
        }));
    }

    #[test]
    fn test_token_signature_covers_action() {
        let kp = KeyPair::generate(KeyLevel::Standard);
        let token = Token::new(payload()).unwrap();
        let sig = TokenSignature::create(&token.id, Action::Endorsed, "m:alice", &kp);

        assert_eq!(sig.level, KeyLevel::Standard);
        let endorsed = token_action(&token.id, Action::Endorsed);
        let cancelled = token_action(&token.id, Action::Cancelled);
        assert!(sig.signature.verify(&kp.key(), endorsed.as_bytes()).is_ok());
        assert!(sig.signature.verify(&kp.key(), cancelled.as_bytes()).is_err());
    }

    #[test]
    fn test_endorsement_level() {
        let low = KeyPair::generate(KeyLevel::Low);
        let standard = KeyPair::generate(KeyLevel::Standard);
        let mut token = Token::new(payload()).unwrap();
        assert_eq!(token.endorsement_level(), None);

        token
            .signatures
            .push(TokenSignature::create(&token.id, Action::Endorsed, "m:alice", &low));
        token.signatures.push(TokenSignature::create(
            &token.id,
            Action::Cancelled,
            "m:alice",
            &standard,
        ));
        assert_eq!(token.endorsement_level(), Some(KeyLevel::Low));
    }

    #[test]
    fn test_payload_wire_format() {
        let json = serde_json::to_value(payload()).unwrap();
        assert_eq!(json["body"]["kind"], "transfer");
        assert_eq!(json["body"]["amount"], "100");
        assert_eq!(json["to"]["id"], "m:bob");
    }
}
