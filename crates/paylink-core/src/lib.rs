//! # Paylink Core
//!
//! Domain model and cryptographic primitives shared by Paylink clients and
//! gateways.
//!
//! ## Key Concepts
//!
//! - **Key level**: `LOW < STANDARD < PRIVILEGED`, the strength of proof a call demands
//! - **Member log**: hash-chained `MemberUpdate`s; each write names the hash it was built on
//! - **Token**: payload-addressed authorization that becomes usable once endorsed
//! - **Envelope**: a typed request plus signed call metadata
//!
//! ## Invariants
//!
//! 1. **Level**: a call is never accepted with a key below its required level
//! 2. **Linearity**: of two updates built on the same hash, at most one is accepted
//! 3. **Idempotence**: equal token payloads name the same token

pub mod amount;
pub mod clock;
pub mod crypto;
pub mod error;
pub mod keystore;
pub mod member;
pub mod policy;
pub mod rpc;
pub mod token;
pub mod transfer;
pub mod types;

pub use amount::Amount;
pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{
    CryptoEngine, Ed25519CryptoEngine, KeyPair, PublicKey, SecretKey, Signature, Signer,
    SIGNATURE_SCHEME,
};
pub use error::{CoreError, Result};
pub use keystore::{FileKeyStore, InMemoryKeyStore, KeyStore};
pub use member::{
    MemberOperation, MemberRecoveryOperation, MemberState, MemberUpdate, MemberView,
    RecoveryAuthorization,
};
pub use rpc::{
    CallMetadata, Envelope, ErrorCode, Method, Request, Response, RpcError, Transport,
    TransportError,
};
pub use token::{
    token_action, AccessBody, Action, EndorsementStatus, Resource, Token, TokenBody, TokenKind,
    TokenMember, TokenOperationResult, TokenPayload, TokenPayloadBuilder, TokenReplaceResult,
    TokenSignature, TokenState, TransferBody,
};
pub use transfer::{
    Account, Balance, TransactionStatus, Transaction, Transfer, TransferEndpoint, TransferPayload,
};
pub use types::{Alias, AliasType, Key, KeyAlgorithm, KeyLevel, MemberType, RecoveryRule};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the library version
pub fn version() -> &'static str {
    VERSION
}
