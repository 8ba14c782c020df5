//! HTTP implementation of the facade against a live DC/OS cluster.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{ClusterFacade, InstallOptions, PackageDescription, PackageRef, ServiceRef, Task};
use crate::cluster::{ClusterConnection, ClusterError, ClusterInfo};
use crate::fixtures::cosmos_client::{
    DescribeRequest, InstallRequest, ListRequest, UninstallRequest,
};
use crate::fixtures::{CosmosClient, ExhibitorClient, MarathonClient, MesosClient};

/// Facade backed by the Cosmos, Marathon, Mesos and Exhibitor APIs.
pub struct DcosCluster {
    connection: ClusterConnection,
    cosmos: CosmosClient,
    marathon: MarathonClient,
    mesos: MesosClient,
    exhibitor: ExhibitorClient,
}

impl DcosCluster {
    pub fn new(connection: ClusterConnection) -> Self {
        Self {
            cosmos: connection.cosmos(),
            marathon: connection.marathon(),
            mesos: connection.mesos(),
            exhibitor: connection.exhibitor(),
            connection,
        }
    }

    /// Connect using `DCOS_*` environment variables.
    pub fn from_env() -> Result<Self, ClusterError> {
        Ok(Self::new(ClusterConnection::from_env()?))
    }

    pub fn connection(&self) -> &ClusterConnection {
        &self.connection
    }
}

#[async_trait]
impl ClusterFacade for DcosCluster {
    fn poll_interval(&self) -> Duration {
        self.connection.config().poll_interval
    }

    fn default_wait_timeout(&self) -> Duration {
        self.connection.config().deployment_timeout
    }

    #[instrument(skip_all, fields(package = %package))]
    async fn install(
        &self,
        package: &PackageRef,
        options: Option<&InstallOptions>,
    ) -> Result<(), ClusterError> {
        let request = InstallRequest {
            package_name: package.name.clone(),
            package_version: package.version.clone(),
            options: options.map(|o| o.as_value().clone()),
            app_id: None,
        };

        let response = self.cosmos.install(&request).await?;

        info!(
            version = %response.package_version,
            app_id = response.app_id.as_deref().unwrap_or("-"),
            "Package install accepted"
        );
        Ok(())
    }

    async fn is_installed(&self, package_name: &str) -> Result<bool, ClusterError> {
        let response = self
            .cosmos
            .list(&ListRequest {
                package_name: Some(package_name.to_string()),
                app_id: None,
            })
            .await?;

        Ok(response
            .packages
            .iter()
            .any(|p| p.package_information.package_definition.name == package_name))
    }

    /// Active Mesos framework named `name`.
    ///
    /// The root Marathon framework is always registered as `marathon`, so on a
    /// live cluster `get_service("marathon")` is always present. For
    /// Marathon-on-Marathon the health check on the service decides.
    async fn get_service(&self, name: &str) -> Result<Option<ServiceRef>, ClusterError> {
        let state = self.mesos.state().await?;

        Ok(state.framework(name, false).map(|f| ServiceRef {
            id: f.id.clone(),
            name: f.name.clone(),
            active: f.active,
        }))
    }

    async fn is_healthy(&self, service_name: &str) -> Result<bool, ClusterError> {
        let app = self.marathon.get_app(service_name).await?;
        Ok(app.is_some_and(|a| a.is_healthy()))
    }

    async fn pending_deployments(&self) -> Result<usize, ClusterError> {
        Ok(self.marathon.deployments().await?.len())
    }

    async fn endpoint_reachable(&self, service_name: &str) -> Result<bool, ClusterError> {
        let url = self.connection.service_url(service_name);

        let response = self.connection.http_client().get(&url).send().await?;
        let status = response.status();

        debug!(service = service_name, status = status.as_u16(), "Endpoint probe");
        Ok(status.is_success())
    }

    #[instrument(skip(self))]
    async fn uninstall_app(
        &self,
        package_name: &str,
        wipe_data: bool,
        service_name: Option<&str>,
    ) -> Result<(), ClusterError> {
        let request = UninstallRequest {
            package_name: package_name.to_string(),
            app_id: service_name.map(str::to_string),
            all: Some(wipe_data),
        };

        let response = self.cosmos.uninstall(&request).await?;

        for result in &response.results {
            info!(app_id = %result.app_id, "Package instance uninstalled");
        }
        Ok(())
    }

    async fn delete_node(&self, path: &str) -> Result<(), ClusterError> {
        self.exhibitor.delete_node(path).await?;
        Ok(())
    }

    async fn get_service_task(
        &self,
        package_name: &str,
        service_name: &str,
    ) -> Result<Option<Task>, ClusterError> {
        let state = self.mesos.state().await?;

        Ok(state
            .framework(package_name, true)
            .and_then(|f| f.task(service_name))
            .map(|t| Task {
                id: t.id.clone(),
                name: t.name.clone(),
                state: t.state.clone(),
            }))
    }

    async fn describe_package(
        &self,
        package: &PackageRef,
    ) -> Result<PackageDescription, ClusterError> {
        let response = self
            .cosmos
            .describe(&DescribeRequest {
                package_name: package.name.clone(),
                package_version: package.version.clone(),
            })
            .await?;

        Ok(response.package)
    }

    async fn cluster_info(&self) -> Result<ClusterInfo, ClusterError> {
        self.connection.cluster_info().await
    }
}
