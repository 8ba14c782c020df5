//! Cluster configuration.
//!
//! Configuration is loaded from environment variables. The ACS token is
//! redacted in Debug output.

use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default per-request HTTP timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 30;

/// Default poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default install and health wait in seconds.
pub const DEFAULT_INSTALL_TIMEOUT_SECONDS: u64 = 300;

/// Default deployment and endpoint wait in seconds.
pub const DEFAULT_DEPLOYMENT_TIMEOUT_SECONDS: u64 = 120;

/// Cluster configuration for the acceptance suites.
#[derive(Clone)]
pub struct ClusterConfig {
    /// Cluster base URL (Admin Router), without trailing slash.
    pub dcos_url: String,

    /// ACS token sent as `Authorization: token=<value>`.
    pub acs_token: Option<SecretString>,

    /// Per-request HTTP timeout.
    pub http_timeout: Duration,

    /// Interval between polls of remote state.
    pub poll_interval: Duration,

    /// Deadline for installs to report installed and healthy.
    pub install_timeout: Duration,

    /// Deadline for deployment and endpoint waits.
    pub deployment_timeout: Duration,
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("dcos_url", &self.dcos_url)
            .field(
                "acs_token",
                &self.acs_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("http_timeout", &self.http_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("install_timeout", &self.install_timeout)
            .field("deployment_timeout", &self.deployment_timeout)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

impl ClusterConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let dcos_url = vars
            .get("DCOS_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("DCOS_URL".to_string()))?
            .trim()
            .trim_end_matches('/')
            .to_string();

        if !dcos_url.starts_with("http://") && !dcos_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                name: "DCOS_URL".to_string(),
                message: format!("must start with http:// or https://, got '{}'", dcos_url),
            });
        }

        let acs_token = vars
            .get("DCOS_ACS_TOKEN")
            .filter(|v| !v.is_empty())
            .map(|v| SecretString::from(v.clone()));

        let http_timeout = Duration::from_secs(parse_positive(
            vars,
            "DCOS_HTTP_TIMEOUT_SECONDS",
            DEFAULT_HTTP_TIMEOUT_SECONDS,
        )?);

        let poll_interval = Duration::from_millis(parse_positive(
            vars,
            "DCOS_POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL_MS,
        )?);

        let install_timeout = Duration::from_secs(parse_positive(
            vars,
            "DCOS_INSTALL_TIMEOUT_SECONDS",
            DEFAULT_INSTALL_TIMEOUT_SECONDS,
        )?);

        let deployment_timeout = Duration::from_secs(parse_positive(
            vars,
            "DCOS_DEPLOYMENT_TIMEOUT_SECONDS",
            DEFAULT_DEPLOYMENT_TIMEOUT_SECONDS,
        )?);

        Ok(Self {
            dcos_url,
            acs_token,
            http_timeout,
            poll_interval,
            install_timeout,
            deployment_timeout,
        })
    }
}

/// Parse an optional positive integer variable, falling back to `default`.
fn parse_positive(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        message: format!("must be a valid integer, got '{}': {}", value_str, e),
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: "must be positive, got 0".to_string(),
        });
    }

    Ok(value)
}
