//! Client configuration

use std::env;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Client configuration
#[derive(Clone)]
pub struct ClientConfig {
    /// Realm tag placed in every signed call
    pub realm: String,

    /// Calls still pending after this long are abandoned with `Timeout`
    pub call_timeout: Duration,

    /// Version reported to the gateway
    pub client_version: String,

    /// Developer key sent as `x-paylink-dev-key` by the HTTP transport
    pub dev_key: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            realm: "paylink".into(),
            call_timeout: Duration::from_secs(10),
            client_version: env!("CARGO_PKG_VERSION").into(),
            dev_key: None,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("realm", &self.realm)
            .field("call_timeout", &self.call_timeout)
            .field("client_version", &self.client_version)
            .field("dev_key", &self.dev_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ClientConfig {
    /// Read overrides from `PAYLINK_REALM`, `PAYLINK_CALL_TIMEOUT_MS` and `PAYLINK_DEV_KEY`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(realm) = env::var("PAYLINK_REALM") {
            config.realm = realm;
        }
        if let Ok(value) = env::var("PAYLINK_CALL_TIMEOUT_MS") {
            let ms: u64 = value.parse().map_err(|_| {
                ClientError::Config(format!("PAYLINK_CALL_TIMEOUT_MS is not a number: '{}'", value))
            })?;
            config.call_timeout = Duration::from_millis(ms);
        }
        if let Ok(dev_key) = env::var("PAYLINK_DEV_KEY") {
            config.dev_key = Some(dev_key);
        }

        Ok(config)
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    pub fn with_dev_key(mut self, dev_key: impl Into<String>) -> Self {
        self.dev_key = Some(dev_key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.realm, "paylink");
        assert_eq!(config.call_timeout, Duration::from_secs(10));
        assert_eq!(config.client_version, env!("CARGO_PKG_VERSION"));
        assert!(config.dev_key.is_none());
    }

    #[test]
    fn test_debug_redacts_dev_key() {
        let config = ClientConfig::default().with_dev_key("sk-very-secret");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_builder_overrides() {
        let config = ClientConfig::default()
            .with_realm("sandbox")
            .with_call_timeout(Duration::from_millis(250))
            .with_client_version("9.9.9");
        assert_eq!(config.realm, "sandbox");
        assert_eq!(config.call_timeout, Duration::from_millis(250));
        assert_eq!(config.client_version, "9.9.9");
    }
}
