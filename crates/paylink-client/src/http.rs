//! HTTP transport to a Paylink gateway
//!
//! Each envelope is POSTed as JSON to `{base_url}/v1/rpc`. Error bodies of
//! the form `{error, code, details}` come back as `TransportError::Rpc`.

use async_trait::async_trait;
use paylink_core::{Envelope, ErrorCode, Response, RpcError, Transport, TransportError};
use serde::Deserialize;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::Result;

const DEV_KEY_HEADER: &str = "x-paylink-dev-key";

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    code: ErrorCode,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    dev_key: Option<String>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.call_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            dev_key: config.dev_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn rpc_url(&self) -> String {
        format!("{}/v1/rpc", self.base_url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, envelope: Envelope) -> std::result::Result<Response, TransportError> {
        let method = envelope.request.method();
        let mut request = self.client.post(self.rpc_url()).json(&envelope);
        if let Some(dev_key) = &self.dev_key {
            request = request.header(DEV_KEY_HEADER, dev_key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = resp.status();
        debug!(method = method.as_str(), status = %status, trace_id = %envelope.trace_id, "Gateway replied");

        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_slice(&body).map_err(|e| TransportError::Decode(e.to_string()));
        }

        match serde_json::from_slice::<ErrorBody>(&body) {
            Ok(err) => Err(TransportError::Rpc(RpcError {
                code: err.code,
                message: err.error,
                details: err.details,
            })),
            Err(_) => Err(TransportError::Decode(format!(
                "HTTP {} without error body",
                status
            ))),
        }
    }
}
