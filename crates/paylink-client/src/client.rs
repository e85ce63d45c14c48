//! Envelope construction and timeout shared by both client kinds

use paylink_core::{CallMetadata, Envelope, Request, Response, Transport};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{ClientError, Outcome, Result};

/// Match one `Response` variant and pull out its single field
macro_rules! expect_response {
    ($response:expr, $variant:ident { $field:ident }) => {
        match $response {
            paylink_core::Response::$variant { $field } => Ok($field),
            other => Err($crate::error::ClientError::UnexpectedResponse {
                expected: stringify!($variant),
                actual: other.kind(),
            }),
        }
    };
}
pub(crate) use expect_response;

pub(crate) fn expect_empty(response: Response) -> Result<()> {
    match response {
        Response::Empty => Ok(()),
        other => Err(ClientError::UnexpectedResponse {
            expected: "Empty",
            actual: other.kind(),
        }),
    }
}

/// A transport plus the settings every call shares
#[derive(Clone)]
pub(crate) struct Channel {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl Channel {
    pub(crate) fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send one call, abandoning it after `call_timeout`
    pub(crate) async fn call(
        &self,
        request: Request,
        auth: Option<CallMetadata>,
    ) -> Result<Response> {
        let method = request.method();
        let envelope = Envelope {
            request,
            auth,
            client_version: self.config.client_version.clone(),
            trace_id: Uuid::new_v4().to_string(),
        };
        let trace_id = envelope.trace_id.clone();

        debug!(method = method.as_str(), trace_id = %trace_id, "Sending call");

        match tokio::time::timeout(self.config.call_timeout, self.transport.call(envelope)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                let err = ClientError::from(e);
                if err.outcome() == Outcome::Unknown {
                    warn!(method = method.as_str(), trace_id = %trace_id, error = %err, "Call outcome unknown");
                } else {
                    debug!(method = method.as_str(), trace_id = %trace_id, error = %err, "Call rejected");
                }
                Err(err)
            }
            Err(_) => {
                warn!(
                    method = method.as_str(),
                    trace_id = %trace_id,
                    timeout_ms = self.config.call_timeout.as_millis() as u64,
                    "Call timed out, outcome unknown"
                );
                Err(ClientError::Timeout(self.config.call_timeout))
            }
        }
    }
}
