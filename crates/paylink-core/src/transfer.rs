//! Accounts, balances and transfer records

use serde::{Deserialize, Serialize};

/// A bank account linked to a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub member_id: String,
    pub name: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub account_id: String,
    /// Booked balance
    pub current: String,
    /// Balance net of pending transactions
    pub available: String,
    pub currency: String,
}

/// Where a transfer out of an account may be sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEndpoint {
    pub account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_id: Option<String>,
}

impl TransferEndpoint {
    pub fn account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            bank_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

/// What the redeemer asks for when redeeming a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPayload {
    /// Redeemer's reference; the same `(token_id, ref_id)` names one transfer
    pub ref_id: String,
    pub token_id: String,
    /// Defaults to the full token amount
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<TransferEndpoint>,
}

impl TransferPayload {
    pub fn new(token_id: impl Into<String>, ref_id: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            token_id: token_id.into(),
            amount: None,
            currency: None,
            description: None,
            destination: None,
        }
    }

    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = Some(amount.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_destination(mut self, destination: TransferEndpoint) -> Self {
        self.destination = Some(destination);
        self
    }
}

/// A redemption of a transfer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: String,
    pub payload: TransferPayload,
    /// Amount actually moved
    pub amount: String,
    pub currency: String,
    pub status: TransactionStatus,
    pub redeemer_id: String,
    pub created_at_ms: i64,
}

/// An entry in an account's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    /// Signed decimal, negative for debits
    pub amount: String,
    pub currency: String,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
    pub created_at_ms: i64,
}
