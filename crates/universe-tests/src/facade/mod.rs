//! Cluster control facade.
//!
//! `ClusterFacade` is the black-box contract the lifecycle harness drives:
//! every remote call it makes goes through this trait. [`DcosCluster`]
//! implements it over HTTP against a live cluster and [`mock::MockCluster`]
//! implements it in memory for harness tests.

mod dcos;
pub mod mock;

pub use dcos::DcosCluster;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::cluster::{ClusterError, ClusterInfo};
use crate::eventual::wait_until;
pub use crate::fixtures::cosmos_client::PackageDescription;

/// A catalog entry, optionally pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    pub name: String,
    pub version: Option<String>,
}

impl PackageRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

impl From<&str> for PackageRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

/// Options tree passed opaquely to install.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallOptions(Value);

impl InstallOptions {
    /// `{"service": {"name": <name>}}`
    pub fn with_service_name(name: impl Into<String>) -> Self {
        Self(json!({ "service": { "name": name.into() } }))
    }

    /// Service name override, if the tree carries one.
    pub fn service_name(&self) -> Option<&str> {
        self.0.get("service")?.get("name")?.as_str()
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for InstallOptions {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// A service registered with the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRef {
    pub id: String,
    pub name: String,
    pub active: bool,
}

/// A task backing a service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub state: String,
}

/// Remote operations the lifecycle harness depends on.
///
/// Required methods are single remote calls. The provided `*_wait` methods
/// poll them at [`poll_interval`](ClusterFacade::poll_interval) and report a
/// timeout as `false`; errors seen while polling count as "not yet".
#[async_trait]
pub trait ClusterFacade: Send + Sync {
    /// Interval between polls of remote state.
    fn poll_interval(&self) -> Duration;

    /// Default deadline for deployment and endpoint waits.
    fn default_wait_timeout(&self) -> Duration;

    /// Install a package. Fails if Cosmos rejects it (e.g. already installed).
    async fn install(
        &self,
        package: &PackageRef,
        options: Option<&InstallOptions>,
    ) -> Result<(), ClusterError>;

    /// Whether Cosmos lists at least one instance of the package.
    async fn is_installed(&self, package_name: &str) -> Result<bool, ClusterError>;

    /// The active service registered under `name`, if any.
    async fn get_service(&self, name: &str) -> Result<Option<ServiceRef>, ClusterError>;

    /// Whether the scheduler reports the service healthy.
    async fn is_healthy(&self, service_name: &str) -> Result<bool, ClusterError>;

    /// Number of deployments still in flight.
    async fn pending_deployments(&self) -> Result<usize, ClusterError>;

    /// Whether the service endpoint currently answers with success.
    async fn endpoint_reachable(&self, service_name: &str) -> Result<bool, ClusterError>;

    /// Uninstall a package instance, wiping its data when `wipe_data` is set.
    /// `service_name` of `None` targets every instance of the package.
    async fn uninstall_app(
        &self,
        package_name: &str,
        wipe_data: bool,
        service_name: Option<&str>,
    ) -> Result<(), ClusterError>;

    /// Delete a coordination node. Deleting an absent node succeeds.
    async fn delete_node(&self, path: &str) -> Result<(), ClusterError>;

    /// The task named `service_name` run by the `package_name` framework.
    async fn get_service_task(
        &self,
        package_name: &str,
        service_name: &str,
    ) -> Result<Option<Task>, ClusterError>;

    /// Catalog metadata for a package.
    async fn describe_package(
        &self,
        package: &PackageRef,
    ) -> Result<PackageDescription, ClusterError>;

    /// Version and agent counts.
    async fn cluster_info(&self) -> Result<ClusterInfo, ClusterError>;

    async fn private_agent_count(&self) -> Result<usize, ClusterError> {
        Ok(self.cluster_info().await?.private_agents)
    }

    /// Wait until no deployments are in flight.
    async fn deployment_wait(&self, timeout: Option<Duration>) -> bool {
        let this = self;
        let timeout = timeout.unwrap_or_else(|| self.default_wait_timeout());

        wait_until(self.poll_interval(), timeout, move || async move {
            match this.pending_deployments().await {
                Ok(pending) => pending == 0,
                Err(e) => {
                    debug!(error = %e, "Deployment query failed, retrying");
                    false
                }
            }
        })
        .await
    }

    /// Wait until the service endpoint becomes reachable.
    async fn wait_for_endpoint(&self, service_name: &str, timeout: Option<Duration>) -> bool {
        let this = self;
        let timeout = timeout.unwrap_or_else(|| self.default_wait_timeout());

        wait_until(self.poll_interval(), timeout, move || async move {
            match this.endpoint_reachable(service_name).await {
                Ok(reachable) => reachable,
                Err(e) => {
                    debug!(service = service_name, error = %e, "Endpoint probe failed, retrying");
                    false
                }
            }
        })
        .await
    }

    /// Wait until the service endpoint stops answering.
    async fn wait_for_endpoint_removal(
        &self,
        service_name: &str,
        timeout: Option<Duration>,
    ) -> bool {
        let this = self;
        let timeout = timeout.unwrap_or_else(|| self.default_wait_timeout());

        wait_until(self.poll_interval(), timeout, move || async move {
            match this.endpoint_reachable(service_name).await {
                Ok(reachable) => !reachable,
                Err(e) => {
                    debug!(service = service_name, error = %e, "Endpoint probe failed, retrying");
                    false
                }
            }
        })
        .await
    }
}
