//! Exhibitor client fixture for removing ZooKeeper nodes.
//!
//! Packages installed through Cosmos leave a node under `/universe/<service>`
//! that must be deleted before the same service name can be reused cleanly.

use reqwest::{Client, StatusCode};

use super::{check_status, ApiError};

/// Client for the Exhibitor ZooKeeper explorer API.
pub struct ExhibitorClient {
    base_url: String,
    http_client: Client,
}

impl ExhibitorClient {
    /// Create a new Exhibitor client.
    ///
    /// `base_url` is the Exhibitor root, normally `<dcos_url>/exhibitor`.
    pub fn new(base_url: impl Into<String>, http_client: Client) -> Self {
        Self {
            base_url: base_url.into(),
            http_client,
        }
    }

    /// Delete a znode. A node that is already gone is not an error.
    ///
    /// # Endpoint
    ///
    /// `DELETE /exhibitor/v1/explorer/znode/{path}`
    pub async fn delete_node(&self, node_path: &str) -> Result<(), ApiError> {
        let url = format!(
            "{}/exhibitor/v1/explorer/znode/{}",
            self.base_url,
            node_path.trim_start_matches('/')
        );

        let response = self.http_client.delete(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        check_status(response).await?;
        Ok(())
    }
}
