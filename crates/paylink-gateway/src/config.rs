//! Gateway configuration

use paylink_core::Amount;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Invalid environment configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid value for {var}: '{value}'")]
pub struct ConfigError {
    pub var: String,
    pub value: String,
}

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Human-readable name of this gateway
    pub name: String,

    /// Realm every call must be addressed to
    pub realm: String,

    /// Member id of the recovery agent this gateway runs
    pub agent_id: String,

    /// Largest accepted difference between a call timestamp and the gateway clock
    pub max_clock_skew: Duration,

    /// Oldest client version accepted
    pub min_client_version: String,

    /// Transfer tokens above this amount need a PRIVILEGED endorsement
    pub privileged_amount_threshold: Amount,

    /// Lifetime of a recovery verification code
    pub verification_ttl: Duration,

    /// Wrong codes accepted before a verification is discarded
    pub max_verification_attempts: u32,

    /// Serve the account provisioning endpoint
    pub enable_admin_api: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            name: "paylink-gateway".into(),
            realm: "paylink".into(),
            agent_id: "m:paylink-agent".into(),
            max_clock_skew: Duration::from_secs(300),
            min_client_version: "0.1.0".into(),
            privileged_amount_threshold: Amount::from_whole(1_000),
            verification_ttl: Duration::from_secs(600),
            max_verification_attempts: 5,
            enable_admin_api: true,
        }
    }
}

impl GatewayConfig {
    /// Read overrides from `PAYLINK_GATEWAY_*` variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(name) = env::var("PAYLINK_GATEWAY_NAME") {
            config.name = name;
        }
        if let Ok(realm) = env::var("PAYLINK_GATEWAY_REALM") {
            config.realm = realm;
        }
        if let Ok(agent_id) = env::var("PAYLINK_GATEWAY_AGENT_ID") {
            config.agent_id = agent_id;
        }
        if let Ok(version) = env::var("PAYLINK_GATEWAY_MIN_CLIENT_VERSION") {
            config.min_client_version = version;
        }
        if let Some(ms) = parse_var::<u64>("PAYLINK_GATEWAY_MAX_CLOCK_SKEW_MS")? {
            config.max_clock_skew = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>("PAYLINK_GATEWAY_VERIFICATION_TTL_SECS")? {
            config.verification_ttl = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_var::<u32>("PAYLINK_GATEWAY_MAX_VERIFICATION_ATTEMPTS")? {
            config.max_verification_attempts = attempts;
        }
        if let Some(enabled) = parse_var::<bool>("PAYLINK_GATEWAY_ADMIN_API")? {
            config.enable_admin_api = enabled;
        }
        if let Ok(value) = env::var("PAYLINK_GATEWAY_PRIVILEGED_THRESHOLD") {
            config.privileged_amount_threshold =
                Amount::parse(&value).map_err(|_| ConfigError {
                    var: "PAYLINK_GATEWAY_PRIVILEGED_THRESHOLD".into(),
                    value,
                })?;
        }

        Ok(config)
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    pub fn with_max_clock_skew(mut self, skew: Duration) -> Self {
        self.max_clock_skew = skew;
        self
    }

    pub fn with_min_client_version(mut self, version: impl Into<String>) -> Self {
        self.min_client_version = version.into();
        self
    }

    pub fn with_max_verification_attempts(mut self, attempts: u32) -> Self {
        self.max_verification_attempts = attempts;
        self
    }

    pub fn with_privileged_amount_threshold(mut self, threshold: Amount) -> Self {
        self.privileged_amount_threshold = threshold;
        self
    }
}

fn parse_var<T: std::str::FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value.parse().map(Some).map_err(|_| ConfigError {
            var: var.to_string(),
            value,
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.realm, "paylink");
        assert_eq!(config.privileged_amount_threshold, Amount::from_whole(1_000));
        assert!(config.max_clock_skew >= Duration::from_secs(60));
    }

    #[test]
    fn test_builder_overrides() {
        let config = GatewayConfig::default()
            .with_realm("sandbox")
            .with_min_client_version("2.0.0");
        assert_eq!(config.realm, "sandbox");
        assert_eq!(config.min_client_version, "2.0.0");
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        std::env::set_var("PAYLINK_GATEWAY_TEST_PARSE", "not-a-number");
        let result = parse_var::<u64>("PAYLINK_GATEWAY_TEST_PARSE");
        assert!(result.is_err());
        std::env::remove_var("PAYLINK_GATEWAY_TEST_PARSE");
        assert_eq!(parse_var::<u64>("PAYLINK_GATEWAY_TEST_PARSE").unwrap(), None);
    }
}
