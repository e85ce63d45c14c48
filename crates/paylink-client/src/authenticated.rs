//! Calls made as a member
//!
//! Every method maps to one gateway call. Each call is signed fresh by the
//! `RequestSigner` under the `AuthenticationContext` passed with it.

use paylink_core::{
    Account, Action, Alias, Balance, KeyLevel, MemberState, MemberUpdate, Request, Response,
    Signature, Token, TokenKind, TokenOperationResult, TokenPayload, TokenReplaceResult,
    TokenSignature, Transaction, Transfer, TransferEndpoint, TransferPayload,
};

use crate::client::{expect_empty, expect_response, Channel};
use crate::context::AuthenticationContext;
use crate::error::Result;
use crate::signer::RequestSigner;

#[derive(Clone)]
pub struct AuthenticatedClient {
    channel: Channel,
    signer: RequestSigner,
}

impl AuthenticatedClient {
    pub(crate) fn new(channel: Channel, signer: RequestSigner) -> Self {
        Self { channel, signer }
    }

    pub fn member_id(&self) -> &str {
        self.signer.member_id()
    }

    pub fn signer(&self) -> &RequestSigner {
        &self.signer
    }

    /// Sign `request` under `context` and send it
    pub async fn call(&self, request: Request, context: &AuthenticationContext) -> Result<Response> {
        let metadata = self.signer.sign(&request, context)?;
        self.channel.call(request, Some(metadata)).await
    }

    async fn call_as_self(&self, request: Request) -> Result<Response> {
        self.call(request, &AuthenticationContext::default()).await
    }

    // ========================================================================
    // Local signing
    // ========================================================================

    /// Sign a member update with the PRIVILEGED key
    ///
    /// No fallback: a lower key would only be rejected by the gateway.
    pub fn sign_update(&self, update: &MemberUpdate) -> Result<Signature> {
        let signer = self.signer.exact_signer(KeyLevel::Privileged)?;
        Ok(Signature::create(
            self.member_id(),
            signer.as_ref(),
            &update.canonical_bytes()?,
        ))
    }

    /// Sign a token action at `level`, falling back to lower keys
    pub fn sign_token_action(
        &self,
        token_id: &str,
        action: Action,
        level: KeyLevel,
    ) -> Result<TokenSignature> {
        let signer = self.signer.signer_for(level)?;
        Ok(TokenSignature::create(
            token_id,
            action,
            self.member_id(),
            signer.as_ref(),
        ))
    }

    // ========================================================================
    // Members
    // ========================================================================

    pub async fn get_member(&self, member_id: &str) -> Result<MemberState> {
        let response = self
            .call_as_self(Request::GetMember {
                member_id: member_id.into(),
            })
            .await?;
        expect_response!(response, Member { member })
    }

    pub async fn update_member(
        &self,
        update: MemberUpdate,
        update_signature: Signature,
    ) -> Result<MemberState> {
        let response = self
            .call_as_self(Request::UpdateMember {
                update,
                update_signature,
            })
            .await?;
        expect_response!(response, Member { member })
    }

    pub async fn delete_member(&self) -> Result<()> {
        expect_empty(self.call_as_self(Request::DeleteMember).await?)
    }

    pub async fn resolve_alias(&self, alias: &Alias) -> Result<Option<String>> {
        let response = self
            .call_as_self(Request::ResolveAlias {
                alias: alias.clone(),
            })
            .await?;
        expect_response!(response, ResolvedAlias { member_id })
    }

    // ========================================================================
    // Tokens
    // ========================================================================

    pub async fn create_token(&self, payload: TokenPayload) -> Result<Token> {
        let response = self.call_as_self(Request::CreateToken { payload }).await?;
        expect_response!(response, Token { token })
    }

    pub async fn get_token(&self, token_id: &str) -> Result<Token> {
        let response = self
            .call_as_self(Request::GetToken {
                token_id: token_id.into(),
            })
            .await?;
        expect_response!(response, Token { token })
    }

    pub async fn get_tokens(&self, kind: TokenKind) -> Result<Vec<Token>> {
        let response = self.call_as_self(Request::GetTokens { kind }).await?;
        expect_response!(response, Tokens { tokens })
    }

    pub async fn endorse_token(
        &self,
        token_id: &str,
        signature: TokenSignature,
    ) -> Result<TokenOperationResult> {
        // The call must be signed at least as strongly as the endorsement
        let context = AuthenticationContext::new().with_min_key_level(signature.level);
        let response = self
            .call(
                Request::EndorseToken {
                    token_id: token_id.into(),
                    signature,
                },
                &context,
            )
            .await?;
        expect_response!(response, TokenOperation { result })
    }

    pub async fn cancel_token(
        &self,
        token_id: &str,
        signature: TokenSignature,
    ) -> Result<TokenOperationResult> {
        let response = self
            .call_as_self(Request::CancelToken {
                token_id: token_id.into(),
                signature,
            })
            .await?;
        expect_response!(response, TokenOperation { result })
    }

    pub async fn replace_token(
        &self,
        token_id: &str,
        cancel_signature: TokenSignature,
        payload: TokenPayload,
        endorsement: Option<TokenSignature>,
    ) -> Result<TokenReplaceResult> {
        let level = endorsement
            .as_ref()
            .map(|s| s.level)
            .unwrap_or(KeyLevel::Low);
        let context = AuthenticationContext::new().with_min_key_level(level);
        let response = self
            .call(
                Request::ReplaceToken {
                    token_id: token_id.into(),
                    cancel_signature,
                    payload,
                    endorsement,
                },
                &context,
            )
            .await?;
        expect_response!(response, TokenReplaced { result })
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    pub async fn create_transfer(&self, payload: TransferPayload) -> Result<Transfer> {
        let response = self.call_as_self(Request::CreateTransfer { payload }).await?;
        expect_response!(response, Transfer { transfer })
    }

    pub async fn get_transfer(&self, transfer_id: &str) -> Result<Transfer> {
        let response = self
            .call_as_self(Request::GetTransfer {
                transfer_id: transfer_id.into(),
            })
            .await?;
        expect_response!(response, Transfer { transfer })
    }

    pub async fn get_transfers(&self, token_id: Option<&str>) -> Result<Vec<Transfer>> {
        let response = self
            .call_as_self(Request::GetTransfers {
                token_id: token_id.map(String::from),
            })
            .await?;
        expect_response!(response, Transfers { transfers })
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    pub async fn get_accounts(&self, context: &AuthenticationContext) -> Result<Vec<Account>> {
        let response = self.call(Request::GetAccounts, context).await?;
        expect_response!(response, Accounts { accounts })
    }

    pub async fn get_balance(
        &self,
        account_id: &str,
        context: &AuthenticationContext,
    ) -> Result<Balance> {
        let response = self
            .call(
                Request::GetBalance {
                    account_id: account_id.into(),
                },
                context,
            )
            .await?;
        expect_response!(response, Balance { balance })
    }

    pub async fn get_transactions(
        &self,
        account_id: &str,
        context: &AuthenticationContext,
    ) -> Result<Vec<Transaction>> {
        let response = self
            .call(
                Request::GetTransactions {
                    account_id: account_id.into(),
                },
                context,
            )
            .await?;
        expect_response!(response, Transactions { transactions })
    }

    pub async fn resolve_transfer_destinations(
        &self,
        account_id: &str,
        context: &AuthenticationContext,
    ) -> Result<Vec<TransferEndpoint>> {
        let response = self
            .call(
                Request::ResolveTransferDestinations {
                    account_id: account_id.into(),
                },
                context,
            )
            .await?;
        expect_response!(response, TransferEndpoints { endpoints })
    }

    pub async fn confirm_funds(
        &self,
        account_id: &str,
        amount: &str,
        currency: &str,
        context: &AuthenticationContext,
    ) -> Result<bool> {
        let response = self
            .call(
                Request::ConfirmFunds {
                    account_id: account_id.into(),
                    amount: amount.into(),
                    currency: currency.into(),
                },
                context,
            )
            .await?;
        expect_response!(response, FundsConfirmed { sufficient })
    }

    pub async fn unlink_accounts(&self, account_ids: Vec<String>) -> Result<()> {
        expect_empty(
            self.call_as_self(Request::UnlinkAccounts { account_ids })
                .await?,
        )
    }
}
