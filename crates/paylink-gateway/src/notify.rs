//! Delivery of recovery verification codes
//!
//! Actual delivery (email, SMS, push) lives outside the gateway. The default
//! notifier only logs that a code was issued.

use async_trait::async_trait;
use paylink_core::Alias;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, Clone)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Sends verification codes to the owner of an alias
#[async_trait]
pub trait Notifier: Send + Sync + Debug {
    async fn send_verification_code(
        &self,
        alias: &Alias,
        member_id: &str,
        code: &str,
    ) -> Result<(), NotifyError>;
}

/// Notifier that records the issuance in the log, without the code
#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_verification_code(
        &self,
        alias: &Alias,
        member_id: &str,
        _code: &str,
    ) -> Result<(), NotifyError> {
        info!(alias = %alias, member_id = %member_id, "Issued recovery verification code");
        Ok(())
    }
}

/// Notifier that keeps the last code per alias, for tests and local runs
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    codes: RwLock<HashMap<Alias, String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last code sent to `alias`
    pub fn code_for(&self, alias: &Alias) -> Option<String> {
        self.codes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&alias.normalized())
            .cloned()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_verification_code(
        &self,
        alias: &Alias,
        _member_id: &str,
        code: &str,
    ) -> Result<(), NotifyError> {
        self.codes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(alias.normalized(), code.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_notifier_normalizes_alias() {
        let notifier = RecordingNotifier::new();
        notifier
            .send_verification_code(&Alias::email("Alice@Example.com"), "m:alice", "123456")
            .await
            .unwrap();

        assert_eq!(
            notifier.code_for(&Alias::email("alice@example.com")).as_deref(),
            Some("123456")
        );
    }
}
