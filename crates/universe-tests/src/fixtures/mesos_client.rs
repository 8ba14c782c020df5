//! Mesos master state client fixture.
//!
//! Frameworks stand in for registered services, their tasks for the instances
//! backing them, and agents are split into public and private by role.

use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

use super::{handle_response, ApiError};

/// Role reserved on public agents.
pub const PUBLIC_AGENT_ROLE: &str = "slave_public";

/// Subset of `GET /mesos/state` used by the tests.
#[derive(Debug, Clone, Deserialize)]
pub struct MasterState {
    #[serde(default)]
    pub frameworks: Vec<Framework>,
}

impl MasterState {
    /// Find a framework by name, ignoring inactive ones unless asked.
    pub fn framework(&self, name: &str, include_inactive: bool) -> Option<&Framework> {
        self.frameworks
            .iter()
            .find(|f| f.name == name && (include_inactive || f.active))
    }
}

/// A registered framework.
#[derive(Debug, Clone, Deserialize)]
pub struct Framework {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub active: bool,

    #[serde(default)]
    pub tasks: Vec<MesosTask>,
}

impl Framework {
    /// Find a running (non-completed) task by name.
    pub fn task(&self, name: &str) -> Option<&MesosTask> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// A task launched by a framework.
#[derive(Debug, Clone, Deserialize)]
pub struct MesosTask {
    pub id: String,
    pub name: String,
    pub state: String,

    #[serde(default)]
    pub framework_id: Option<String>,
}

/// Subset of `GET /mesos/slaves`.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentList {
    #[serde(default)]
    pub slaves: Vec<Agent>,
}

/// A Mesos agent.
#[derive(Debug, Clone, Deserialize)]
pub struct Agent {
    pub id: String,
    pub hostname: String,

    #[serde(default)]
    pub active: bool,

    /// Reserved resources keyed by role.
    #[serde(default)]
    pub reserved_resources: HashMap<String, serde_json::Value>,
}

impl Agent {
    /// Public agents carry resources reserved for the public role.
    pub fn is_public(&self) -> bool {
        self.reserved_resources.contains_key(PUBLIC_AGENT_ROLE)
    }
}

/// Client for the Mesos master HTTP endpoints.
pub struct MesosClient {
    base_url: String,
    http_client: Client,
}

impl MesosClient {
    /// Create a new Mesos client.
    ///
    /// `base_url` is the master root, normally `<dcos_url>/mesos`.
    pub fn new(base_url: impl Into<String>, http_client: Client) -> Self {
        Self {
            base_url: base_url.into(),
            http_client,
        }
    }

    /// Fetch master state.
    ///
    /// # Endpoint
    ///
    /// `GET /state`
    pub async fn state(&self) -> Result<MasterState, ApiError> {
        let url = format!("{}/state", self.base_url);

        let response = self.http_client.get(&url).send().await?;

        handle_response(response).await
    }

    /// Fetch registered agents.
    ///
    /// # Endpoint
    ///
    /// `GET /slaves`
    pub async fn agents(&self) -> Result<Vec<Agent>, ApiError> {
        let url = format!("{}/slaves", self.base_url);

        let response = self.http_client.get(&url).send().await?;

        let list: AgentList = handle_response(response).await?;
        Ok(list.slaves)
    }
}
