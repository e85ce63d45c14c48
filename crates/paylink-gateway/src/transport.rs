//! In-process transport
//!
//! Serves calls straight from an `AppState` without a socket. Envelopes and
//! responses still pass through JSON so that what a client sends here is
//! exactly what it would send over HTTP.

use async_trait::async_trait;
use paylink_core::{Envelope, Response, Transport, TransportError};
use std::sync::Arc;
use std::time::Duration;

use crate::api::handlers::AppState;

#[derive(Clone)]
pub struct LocalTransport {
    state: Arc<AppState>,
    latency: Option<Duration>,
}

impl std::fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTransport")
            .field("gateway", &self.state.config.name)
            .field("latency", &self.latency)
            .finish()
    }
}

impl LocalTransport {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            latency: None,
        }
    }

    /// Delay every response by `latency` after the call has been processed
    ///
    /// A caller that gives up before the delay elapses has no way to tell
    /// whether its call took effect.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn call(&self, envelope: Envelope) -> Result<Response, TransportError> {
        let bytes =
            serde_json::to_vec(&envelope).map_err(|e| TransportError::Decode(e.to_string()))?;
        let envelope: Envelope =
            serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))?;

        let result = self.state.handle(envelope).await;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let response = result.map_err(|e| TransportError::Rpc(e.to_rpc()))?;
        let bytes =
            serde_json::to_vec(&response).map_err(|e| TransportError::Decode(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}
