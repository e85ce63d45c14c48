//! Token creation, endorsement, cancellation and replacement
//!
//! ```text
//! CREATED -> PARTIALLY_ENDORSED -> ENDORSED
//!    \              |                 |
//!     +-------------+-----------------+--> CANCELLED | REPLACED
//! ```
//!
//! `MoreSignaturesNeeded` comes back as an ordinary result status.

use paylink_core::{
    Action, KeyLevel, Token, TokenOperationResult, TokenPayload, TokenReplaceResult,
};
use tracing::{debug, info};

use crate::authenticated::AuthenticatedClient;
use crate::error::{ClientError, Result};

#[derive(Clone)]
pub struct TokenAuthorizer {
    client: AuthenticatedClient,
}

impl TokenAuthorizer {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self { client }
    }

    /// Create a token; equal payloads always name the same token
    pub async fn create(&self, payload: TokenPayload) -> Result<Token> {
        payload.validate()?;
        let token = self.client.create_token(payload).await?;
        debug!(token_id = %token.id, state = ?token.state, "Token created");
        Ok(token)
    }

    /// Endorse with the key at `level`, or the highest lower key available
    pub async fn endorse(&self, token: &Token, level: KeyLevel) -> Result<TokenOperationResult> {
        let signature = self
            .client
            .sign_token_action(&token.id, Action::Endorsed, level)?;
        let used = signature.level;
        let result = self.client.endorse_token(&token.id, signature).await?;
        info!(
            token_id = %token.id,
            key_level = %used,
            status = ?result.status,
            "Token endorsed"
        );
        Ok(result)
    }

    /// Cancel with a LOW key
    pub async fn cancel(&self, token: &Token) -> Result<TokenOperationResult> {
        let signature = self
            .client
            .sign_token_action(&token.id, Action::Cancelled, KeyLevel::Low)?;
        let result = self.client.cancel_token(&token.id, signature).await?;
        info!(token_id = %token.id, "Token cancelled");
        Ok(result)
    }

    /// Cancel `token` and create `payload` in its place, unendorsed
    pub async fn replace(&self, token: &Token, payload: TokenPayload) -> Result<TokenReplaceResult> {
        self.replace_with(token, payload, None).await
    }

    /// Cancel `token` and create and endorse `payload` in one round trip
    pub async fn replace_and_endorse(
        &self,
        token: &Token,
        payload: TokenPayload,
        level: KeyLevel,
    ) -> Result<TokenReplaceResult> {
        self.replace_with(token, payload, Some(level)).await
    }

    async fn replace_with(
        &self,
        token: &Token,
        payload: TokenPayload,
        endorse_level: Option<KeyLevel>,
    ) -> Result<TokenReplaceResult> {
        payload.validate()?;
        if payload.kind() != token.payload.kind() {
            return Err(ClientError::InvalidPayload(
                "a token can only be replaced by one of the same kind".into(),
            ));
        }

        let successor_id = payload.token_id()?;
        let cancel_signature =
            self.client
                .sign_token_action(&token.id, Action::Cancelled, KeyLevel::Low)?;
        let endorsement = endorse_level
            .map(|level| {
                self.client
                    .sign_token_action(&successor_id, Action::Endorsed, level)
            })
            .transpose()?;

        let result = self
            .client
            .replace_token(&token.id, cancel_signature, payload, endorsement)
            .await?;
        info!(
            token_id = %token.id,
            successor_id = %result.created.id,
            status = ?result.status,
            "Token replaced"
        );
        Ok(result)
    }
}
