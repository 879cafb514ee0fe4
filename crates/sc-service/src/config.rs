//! Subscription Controller configuration.
//!
//! Configuration is loaded from environment variables. The resource API
//! token is redacted in Debug output.

use crate::admission::{AdmissionConfig, DEFAULT_GLOBAL_BUDGET};
use crate::service::ServiceSettings;
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default public API bind address.
pub const DEFAULT_HTTP_BIND_ADDRESS: &str = "0.0.0.0:8090";

/// Default internal (health, metrics, service-to-service) bind address.
pub const DEFAULT_INTERNAL_BIND_ADDRESS: &str = "0.0.0.0:8091";

/// Default staleness threshold in seconds (10 minutes).
pub const DEFAULT_STALENESS_THRESHOLD_SECONDS: u64 = 600;

/// Default staleness sweep interval in seconds (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 300;

/// Subscription Controller configuration.
#[derive(Clone)]
pub struct Config {
    /// Base URL of the resource API used for role and liveness lookups.
    pub resource_api_url: String,

    /// Bearer token presented to the resource API, if any.
    pub resource_api_token: Option<SecretString>,

    /// Public API bind address (default: "0.0.0.0:8090").
    pub http_bind_address: String,

    /// Internal listener bind address (default: "0.0.0.0:8091").
    pub internal_bind_address: String,

    /// Subscriptions not validated within this many seconds are evicted.
    pub staleness_threshold_seconds: u64,

    /// Seconds between staleness sweeps.
    pub sweep_interval_seconds: u64,

    /// Global admission budget in updates per second.
    pub admission_global_budget: u32,

    /// Emit JSON-formatted logs.
    pub log_json: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("resource_api_url", &self.resource_api_url)
            .field(
                "resource_api_token",
                &self.resource_api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("http_bind_address", &self.http_bind_address)
            .field("internal_bind_address", &self.internal_bind_address)
            .field(
                "staleness_threshold_seconds",
                &self.staleness_threshold_seconds,
            )
            .field("sweep_interval_seconds", &self.sweep_interval_seconds)
            .field("admission_global_budget", &self.admission_global_budget)
            .field("log_json", &self.log_json)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Parse an optional positive integer variable.
fn positive<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
    T::Err: fmt::Display,
{
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = value_str.trim().parse().map_err(|e| {
        ConfigError::InvalidValue(format!(
            "{name} must be a valid positive integer, got '{value_str}': {e}"
        ))
    })?;

    if value == T::default() {
        return Err(ConfigError::InvalidValue(format!(
            "{name} must be greater than 0"
        )));
    }

    Ok(value)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let resource_api_url = vars
            .get("SC_RESOURCE_API_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("SC_RESOURCE_API_URL".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let resource_api_token = vars
            .get("SC_RESOURCE_API_TOKEN")
            .filter(|token| !token.is_empty())
            .map(|token| SecretString::from(token.clone()));

        let http_bind_address = vars
            .get("SC_HTTP_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HTTP_BIND_ADDRESS.to_string());

        let internal_bind_address = vars
            .get("SC_INTERNAL_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_INTERNAL_BIND_ADDRESS.to_string());

        let staleness_threshold_seconds = positive(
            vars,
            "SC_STALENESS_THRESHOLD_SECONDS",
            DEFAULT_STALENESS_THRESHOLD_SECONDS,
        )?;

        let sweep_interval_seconds = positive(
            vars,
            "SC_SWEEP_INTERVAL_SECONDS",
            DEFAULT_SWEEP_INTERVAL_SECONDS,
        )?;

        let admission_global_budget =
            positive(vars, "SC_ADMISSION_GLOBAL_BUDGET", DEFAULT_GLOBAL_BUDGET)?;

        let log_json = match vars.get("SC_LOG_JSON").map(|v| v.trim().to_ascii_lowercase()) {
            None => false,
            Some(v) if v == "true" || v == "1" => true,
            Some(v) if v == "false" || v == "0" || v.is_empty() => false,
            Some(v) => {
                return Err(ConfigError::InvalidValue(format!(
                    "SC_LOG_JSON must be true or false, got '{v}'"
                )))
            }
        };

        Ok(Config {
            resource_api_url,
            resource_api_token,
            http_bind_address,
            internal_bind_address,
            staleness_threshold_seconds,
            sweep_interval_seconds,
            admission_global_budget,
            log_json,
        })
    }

    /// Timing settings for [`crate::service::SubscriptionService`].
    #[must_use]
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            staleness_threshold: Duration::from_secs(self.staleness_threshold_seconds),
            sweep_interval: Duration::from_secs(self.sweep_interval_seconds),
        }
    }

    #[must_use]
    pub fn admission_config(&self) -> AdmissionConfig {
        AdmissionConfig {
            global_budget: self.admission_global_budget,
        }
    }
}
