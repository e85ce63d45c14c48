//! Token and transfer operations for one member

use paylink_core::{
    KeyLevel, Resource, Token, TokenKind, TokenOperationResult, TokenPayload,
    TokenPayloadBuilder, TokenReplaceResult, Transfer, TransferPayload,
};
use tracing::info;

use crate::authenticated::AuthenticatedClient;
use crate::authorizer::TokenAuthorizer;
use crate::error::Result;

#[derive(Clone)]
pub struct TokenClient {
    client: AuthenticatedClient,
    authorizer: TokenAuthorizer,
}

impl TokenClient {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self {
            authorizer: TokenAuthorizer::new(client.clone()),
            client,
        }
    }

    /// Transfer payload issued by this member
    pub fn transfer_token(
        &self,
        amount: impl Into<String>,
        currency: impl Into<String>,
    ) -> TokenPayloadBuilder {
        TokenPayload::transfer(amount, currency).from(self.client.member_id())
    }

    /// Access payload issued by this member
    pub fn access_token(&self, resources: Vec<Resource>) -> TokenPayloadBuilder {
        TokenPayload::access(resources).from(self.client.member_id())
    }

    // ========================================================================
    // Authorization
    // ========================================================================

    pub async fn create(&self, payload: TokenPayload) -> Result<Token> {
        self.authorizer.create(payload).await
    }

    pub async fn endorse(&self, token: &Token, level: KeyLevel) -> Result<TokenOperationResult> {
        self.authorizer.endorse(token, level).await
    }

    pub async fn cancel(&self, token: &Token) -> Result<TokenOperationResult> {
        self.authorizer.cancel(token).await
    }

    pub async fn replace(&self, token: &Token, payload: TokenPayload) -> Result<TokenReplaceResult> {
        self.authorizer.replace(token, payload).await
    }

    pub async fn replace_and_endorse(
        &self,
        token: &Token,
        payload: TokenPayload,
        level: KeyLevel,
    ) -> Result<TokenReplaceResult> {
        self.authorizer
            .replace_and_endorse(token, payload, level)
            .await
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn get_token(&self, token_id: &str) -> Result<Token> {
        self.client.get_token(token_id).await
    }

    /// Transfer tokens this member issued or may redeem
    pub async fn get_transfer_tokens(&self) -> Result<Vec<Token>> {
        self.client.get_tokens(TokenKind::Transfer).await
    }

    /// Access tokens this member granted or holds
    pub async fn get_access_tokens(&self) -> Result<Vec<Token>> {
        self.client.get_tokens(TokenKind::Access).await
    }

    // ========================================================================
    // Redemption
    // ========================================================================

    /// Redeem a transfer token
    ///
    /// `ref_id` makes the call idempotent: the same `(token, ref_id)` always
    /// names one transfer. The amount defaults to the full token amount.
    pub async fn redeem(
        &self,
        token: &Token,
        amount: Option<&str>,
        description: Option<&str>,
        ref_id: &str,
    ) -> Result<Transfer> {
        let mut payload = TransferPayload::new(&token.id, ref_id);
        if let Some(amount) = amount {
            payload = payload.with_amount(amount);
        }
        if let Some(description) = description {
            payload = payload.with_description(description);
        }
        self.create_transfer(payload).await
    }

    pub async fn create_transfer(&self, payload: TransferPayload) -> Result<Transfer> {
        let transfer = self.client.create_transfer(payload).await?;
        info!(
            transfer_id = %transfer.id,
            token_id = %transfer.payload.token_id,
            amount = %transfer.amount,
            currency = %transfer.currency,
            "Transfer created"
        );
        Ok(transfer)
    }

    pub async fn get_transfer(&self, transfer_id: &str) -> Result<Transfer> {
        self.client.get_transfer(transfer_id).await
    }

    pub async fn get_transfers(&self, token_id: Option<&str>) -> Result<Vec<Transfer>> {
        self.client.get_transfers(token_id).await
    }
}
