//! Member updates under optimistic concurrency
//!
//! Every update names the `last_hash` it was built on. The gateway applies
//! it only if that hash is still current; otherwise the caller gets
//! `ConcurrentModification` and must re-read before trying again. Nothing
//! here retries.

use paylink_core::{MemberOperation, MemberState, MemberUpdate, MemberView};
use tracing::{info, warn};

use crate::authenticated::AuthenticatedClient;
use crate::error::{ClientError, Result};

#[derive(Clone)]
pub struct MemberMutator {
    client: AuthenticatedClient,
}

impl MemberMutator {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self { client }
    }

    /// Fresh view of the member, read from the gateway
    pub async fn current_view(&self) -> Result<MemberView> {
        Ok(self.client.get_member(self.client.member_id()).await?.view())
    }

    /// Apply `operations` on top of `view`
    ///
    /// An empty list returns `view` unchanged without a round trip.
    pub async fn apply_operations(
        &self,
        view: &MemberView,
        operations: Vec<MemberOperation>,
    ) -> Result<MemberView> {
        if operations.is_empty() {
            return Ok(view.clone());
        }
        Ok(self.submit(view, operations).await?.view())
    }

    /// Read the current view, then apply `operations` on top of it
    pub async fn update(&self, operations: Vec<MemberOperation>) -> Result<MemberState> {
        let current = self.client.get_member(self.client.member_id()).await?;
        if operations.is_empty() {
            return Ok(current);
        }
        self.submit(&current.view(), operations).await
    }

    async fn submit(
        &self,
        view: &MemberView,
        operations: Vec<MemberOperation>,
    ) -> Result<MemberState> {
        if view.member_id != self.client.member_id() {
            return Err(ClientError::InvalidArgument(format!(
                "view of member {} cannot be updated as {}",
                view.member_id,
                self.client.member_id()
            )));
        }

        let count = operations.len();
        let update = MemberUpdate::new(&view.member_id, &view.last_hash, operations);
        let signature = self.client.sign_update(&update)?;

        match self.client.update_member(update, signature).await {
            Ok(state) => {
                info!(
                    member_id = %state.member_id,
                    operations = count,
                    last_hash = %state.last_hash,
                    "Member updated"
                );
                Ok(state)
            }
            Err(e) => {
                if e.is_concurrent_modification() {
                    warn!(
                        member_id = %view.member_id,
                        prev_hash = %view.last_hash,
                        "Member changed since it was read"
                    );
                }
                Err(e)
            }
        }
    }
}
