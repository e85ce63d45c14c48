//! A linked account seen through one principal

use paylink_core::{Balance, Transaction, TransferEndpoint};

use crate::authenticated::AuthenticatedClient;
use crate::context::AuthenticationContext;
use crate::error::Result;

/// Account handle
///
/// Carries the context it was listed under, so an account obtained through
/// a representative keeps reading on behalf of the grantor.
#[derive(Clone)]
pub struct Account {
    info: paylink_core::Account,
    client: AuthenticatedClient,
    context: AuthenticationContext,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("info", &self.info)
            .field("on_behalf_of", &self.context.on_behalf_of)
            .finish()
    }
}

impl Account {
    pub(crate) fn new(
        info: paylink_core::Account,
        client: AuthenticatedClient,
        context: AuthenticationContext,
    ) -> Self {
        Self {
            info,
            client,
            context,
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn currency(&self) -> &str {
        &self.info.currency
    }

    pub fn info(&self) -> &paylink_core::Account {
        &self.info
    }

    pub async fn balance(&self) -> Result<Balance> {
        self.client.get_balance(self.id(), &self.context).await
    }

    pub async fn transactions(&self) -> Result<Vec<Transaction>> {
        self.client.get_transactions(self.id(), &self.context).await
    }

    pub async fn transfer_destinations(&self) -> Result<Vec<TransferEndpoint>> {
        self.client
            .resolve_transfer_destinations(self.id(), &self.context)
            .await
    }

    /// Whether the account holds at least `amount` in its own currency
    pub async fn confirm_funds(&self, amount: &str) -> Result<bool> {
        self.client
            .confirm_funds(self.id(), amount, self.currency(), &self.context)
            .await
    }
}
