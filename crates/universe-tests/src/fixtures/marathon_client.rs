//! Marathon client fixture for app health and deployment queries.

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{handle_response, ApiError};

/// Marathon app as returned by `GET /v2/apps/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub id: String,

    #[serde(default)]
    pub instances: u32,

    #[serde(default)]
    pub tasks_running: u32,

    #[serde(default)]
    pub tasks_healthy: u32,

    #[serde(default)]
    pub tasks_unhealthy: u32,

    /// In-flight deployments touching this app.
    #[serde(default)]
    pub deployments: Vec<DeploymentRef>,
}

impl App {
    /// Whether Marathon considers the app healthy.
    ///
    /// At least one healthy task, no unhealthy tasks and no deployment in
    /// flight for the app.
    pub fn is_healthy(&self) -> bool {
        self.tasks_healthy > 0 && self.tasks_unhealthy == 0 && self.deployments.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct AppEnvelope {
    app: App,
}

/// A running deployment as returned by `GET /v2/deployments`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,

    #[serde(default)]
    pub affected_apps: Vec<String>,
}

/// Client for the Marathon REST API.
pub struct MarathonClient {
    base_url: String,
    http_client: Client,
}

impl MarathonClient {
    /// Create a new Marathon client.
    ///
    /// `base_url` is the Marathon root, normally `<dcos_url>/marathon`.
    pub fn new(base_url: impl Into<String>, http_client: Client) -> Self {
        Self {
            base_url: base_url.into(),
            http_client,
        }
    }

    /// Fetch one app, `None` if Marathon does not know it.
    ///
    /// # Endpoint
    ///
    /// `GET /v2/apps/{id}`
    pub async fn get_app(&self, app_id: &str) -> Result<Option<App>, ApiError> {
        let url = format!(
            "{}/v2/apps/{}",
            self.base_url,
            app_id.trim_start_matches('/')
        );

        let response = self.http_client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let envelope: AppEnvelope = handle_response(response).await?;
        Ok(Some(envelope.app))
    }

    /// List in-flight deployments.
    ///
    /// # Endpoint
    ///
    /// `GET /v2/deployments`
    pub async fn deployments(&self) -> Result<Vec<Deployment>, ApiError> {
        let url = format!("{}/v2/deployments", self.base_url);

        let response = self.http_client.get(&url).send().await?;

        handle_response(response).await
    }
}
