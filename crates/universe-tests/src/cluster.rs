//! Cluster connection and diagnostic utilities.
//!
//! This module provides the `ClusterConnection` type, which owns the
//! authenticated HTTP client and the component base URLs behind Admin Router,
//! and the `ClusterError` type shared by everything that talks to the cluster.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, instrument};

use crate::config::{ClusterConfig, ConfigError};
use crate::fixtures::cosmos_client::CosmosError;
use crate::fixtures::{
    handle_response, ApiError, CosmosClient, ExhibitorClient, MarathonClient, MesosClient,
};

/// Cluster errors.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cluster health check failed: {message}")]
    HealthCheckFailed { message: String },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Cosmos(#[from] CosmosError),
}

impl From<reqwest::Error> for ClusterError {
    fn from(e: reqwest::Error) -> Self {
        ClusterError::Api(ApiError::HttpError(e))
    }
}

impl ClusterError {
    /// Whether the error is Cosmos refusing a duplicate install.
    pub fn is_already_installed(&self) -> bool {
        matches!(
            self,
            ClusterError::Cosmos(CosmosError::AlreadyInstalled { .. })
        )
    }
}

/// Diagnostic snapshot logged before a suite runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub version: String,
    pub public_agents: usize,
    pub private_agents: usize,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

/// Connection to a DC/OS cluster.
///
/// Provides base URLs for each component and an HTTP client that carries the
/// ACS token on every request.
pub struct ClusterConnection {
    pub dcos_url: String,
    config: ClusterConfig,
    http_client: reqwest::Client,
}

impl ClusterConnection {
    /// Create a connection from environment configuration.
    pub fn from_env() -> Result<Self, ClusterError> {
        Self::new(ClusterConfig::from_env()?)
    }

    /// Create a connection from explicit configuration.
    pub fn new(config: ClusterConfig) -> Result<Self, ClusterError> {
        let mut headers = HeaderMap::new();

        if let Some(token) = &config.acs_token {
            let mut value = HeaderValue::from_str(&format!("token={}", token.expose_secret()))
                .map_err(|_| ClusterError::HealthCheckFailed {
                    message: "DCOS_ACS_TOKEN contains characters not allowed in a header"
                        .to_string(),
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ClusterError::HealthCheckFailed {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            dcos_url: config.dcos_url.clone(),
            config,
            http_client,
        })
    }

    /// Configuration this connection was built from.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Get the HTTP client for making requests.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// Admin Router URL of a service endpoint.
    pub fn service_url(&self, service_name: &str) -> String {
        format!(
            "{}/service/{}/",
            self.dcos_url,
            service_name.trim_start_matches('/')
        )
    }

    pub fn cosmos(&self) -> CosmosClient {
        CosmosClient::new(format!("{}/package", self.dcos_url), self.http_client.clone())
    }

    pub fn marathon(&self) -> MarathonClient {
        MarathonClient::new(format!("{}/marathon", self.dcos_url), self.http_client.clone())
    }

    pub fn mesos(&self) -> MesosClient {
        MesosClient::new(format!("{}/mesos", self.dcos_url), self.http_client.clone())
    }

    pub fn exhibitor(&self) -> ExhibitorClient {
        ExhibitorClient::new(
            format!("{}/exhibitor", self.dcos_url),
            self.http_client.clone(),
        )
    }

    /// Fetch the platform version.
    ///
    /// # Endpoint
    ///
    /// `GET /dcos-metadata/dcos-version.json`
    pub async fn dcos_version(&self) -> Result<String, ClusterError> {
        let url = format!("{}/dcos-metadata/dcos-version.json", self.dcos_url);

        let response = self.http_client.get(&url).send().await?;

        let version: VersionResponse = handle_response(response).await?;
        Ok(version.version)
    }

    /// Check that Admin Router answers and the caller is authorized.
    pub async fn check_reachable(&self) -> Result<(), ClusterError> {
        self.dcos_version()
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::HealthCheckFailed {
                message: format!("Cluster at {} is not reachable: {}", self.dcos_url, e),
            })
    }

    /// Collect version and agent counts.
    #[instrument(skip_all, fields(dcos_url = %self.dcos_url))]
    pub async fn cluster_info(&self) -> Result<ClusterInfo, ClusterError> {
        let version = self.dcos_version().await?;
        let agents = self.mesos().agents().await?;

        let public_agents = agents.iter().filter(|a| a.is_public()).count();
        let info = ClusterInfo {
            version,
            public_agents,
            private_agents: agents.len() - public_agents,
        };

        info!(
            version = %info.version,
            public_agents = info.public_agents,
            private_agents = info.private_agents,
            "Cluster info"
        );

        Ok(info)
    }
}
