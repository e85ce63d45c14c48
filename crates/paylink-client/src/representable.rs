//! Account access shared by a member and its representatives
//!
//! Anything holding an `AuthenticatedClient` and a context to call under
//! gets the account reads for free. A `Member` calls as itself; a
//! `Representative` calls with `on_behalf_of` set to an access token.

use async_trait::async_trait;
use paylink_core::{Balance, Transaction, TransferEndpoint};

use crate::account::Account;
use crate::authenticated::AuthenticatedClient;
use crate::context::AuthenticationContext;
use crate::error::{ClientError, Result};

#[async_trait]
pub trait Representable: Send + Sync {
    fn client(&self) -> &AuthenticatedClient;

    /// Context every account call is made under
    fn context(&self) -> AuthenticationContext;

    async fn get_accounts(&self) -> Result<Vec<Account>> {
        let context = self.context();
        let accounts = self.client().get_accounts(&context).await?;
        Ok(accounts
            .into_iter()
            .map(|info| Account::new(info, self.client().clone(), context.clone()))
            .collect())
    }

    async fn get_account(&self, account_id: &str) -> Result<Account> {
        self.get_accounts()
            .await?
            .into_iter()
            .find(|account| account.id() == account_id)
            .ok_or_else(|| ClientError::NotFound(format!("account {}", account_id)))
    }

    async fn get_balance(&self, account_id: &str) -> Result<Balance> {
        self.client()
            .get_balance(account_id, &self.context())
            .await
    }

    async fn get_transactions(&self, account_id: &str) -> Result<Vec<Transaction>> {
        self.client()
            .get_transactions(account_id, &self.context())
            .await
    }

    async fn resolve_transfer_destinations(
        &self,
        account_id: &str,
    ) -> Result<Vec<TransferEndpoint>> {
        self.client()
            .resolve_transfer_destinations(account_id, &self.context())
            .await
    }

    async fn confirm_funds(&self, account_id: &str, amount: &str, currency: &str) -> Result<bool> {
        self.client()
            .confirm_funds(account_id, amount, currency, &self.context())
            .await
    }
}

/// A member acting for another member under an endorsed access token
#[derive(Clone)]
pub struct Representative {
    client: AuthenticatedClient,
    access_token_id: String,
}

impl Representative {
    pub(crate) fn new(client: AuthenticatedClient, access_token_id: impl Into<String>) -> Self {
        Self {
            client,
            access_token_id: access_token_id.into(),
        }
    }

    pub fn access_token_id(&self) -> &str {
        &self.access_token_id
    }
}

impl Representable for Representative {
    fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    fn context(&self) -> AuthenticationContext {
        AuthenticationContext::on_behalf_of(&self.access_token_id)
    }
}
