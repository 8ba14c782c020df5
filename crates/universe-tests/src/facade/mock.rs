//! In-memory cluster for exercising the lifecycle harness without DC/OS.
//!
//! Installs create service instances that become registered and healthy only
//! after a configurable number of polls, duplicate installs conflict the way
//! Cosmos does, and individual operations can be made to fail.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use universe_tests::facade::mock::MockCluster;
//!
//! let cluster = MockCluster::builder()
//!     .default_service("marathon", "marathon-user")
//!     .registration_polls(3)
//!     .private_agents(4)
//!     .build();
//! ```

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{ClusterFacade, InstallOptions, PackageDescription, PackageRef, ServiceRef, Task};
use crate::cluster::{ClusterError, ClusterInfo};
use crate::fixtures::cosmos_client::CosmosError;
use crate::fixtures::ApiError;

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Install,
    IsInstalled,
    GetService,
    IsHealthy,
    PendingDeployments,
    EndpointReachable,
    Uninstall,
    DeleteNode,
    GetServiceTask,
    DescribePackage,
    ClusterInfo,
}

#[derive(Debug)]
struct MockService {
    package: String,
    task_id: String,
    registration_polls_left: u32,
    health_polls_left: u32,
}

impl MockService {
    fn registered(&self) -> bool {
        self.registration_polls_left == 0
    }
}

#[derive(Debug, Default)]
struct MockState {
    services: HashMap<String, MockService>,
    /// Endpoints still answering after uninstall, with polls left.
    lingering_endpoints: HashMap<String, u32>,
    nodes: HashSet<String>,
    deployment_polls_left: u32,
    failures: HashSet<MockOperation>,
    calls: HashMap<MockOperation, usize>,
    next_task: u32,
}

/// In-memory implementation of [`ClusterFacade`].
#[derive(Debug)]
pub struct MockCluster {
    state: Mutex<MockState>,
    default_services: HashMap<String, String>,
    unknown_packages: HashSet<String>,
    registration_polls: u32,
    health_polls: u32,
    deployment_polls: u32,
    endpoint_linger_polls: u32,
    allow_duplicates: bool,
    private_agents: usize,
    public_agents: usize,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl Default for MockCluster {
    fn default() -> Self {
        MockClusterBuilder::default().build()
    }
}

impl MockCluster {
    /// Create a MockCluster builder.
    #[must_use]
    pub fn builder() -> MockClusterBuilder {
        MockClusterBuilder::default()
    }

    /// Make `operation` fail until [`recover`](Self::recover) is called.
    pub fn fail(&self, operation: MockOperation) {
        self.lock().failures.insert(operation);
    }

    pub fn recover(&self, operation: MockOperation) {
        self.lock().failures.remove(&operation);
    }

    /// Number of times `operation` was called.
    pub fn call_count(&self, operation: MockOperation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Whether a service instance named `service_name` exists.
    pub fn has_service(&self, service_name: &str) -> bool {
        self.lock().services.contains_key(service_name)
    }

    /// Whether the coordination node exists.
    pub fn has_node(&self, path: &str) -> bool {
        self.lock().nodes.contains(path)
    }

    /// Place a service instance directly, already registered and healthy.
    pub fn seed_service(&self, package_name: &str, service_name: &str) {
        let mut state = self.lock();
        let task_id = format!("{}.seed", service_name);
        state.services.insert(
            service_name.to_string(),
            MockService {
                package: package_name.to_string(),
                task_id,
                registration_polls_left: 0,
                health_polls_left: 0,
            },
        );
        state.nodes.insert(node_path(service_name));
        state.nodes.insert(data_node_path(service_name));
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the call and fail it if injected.
    fn enter(&self, operation: MockOperation) -> Result<MutexGuard<'_, MockState>, ClusterError> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_insert(0) += 1;

        if state.failures.contains(&operation) {
            return Err(ClusterError::Api(ApiError::RequestFailed {
                status: 503,
                body: format!("injected failure for {:?}", operation),
            }));
        }

        Ok(state)
    }

    fn service_name_for(&self, package: &PackageRef, options: Option<&InstallOptions>) -> String {
        options
            .and_then(InstallOptions::service_name)
            .map(str::to_string)
            .or_else(|| self.default_services.get(&package.name).cloned())
            .unwrap_or_else(|| package.name.clone())
    }
}

fn node_path(service_name: &str) -> String {
    format!("/universe/{}", service_name)
}

fn data_node_path(service_name: &str) -> String {
    format!("/dcos-service-{}", service_name)
}

#[async_trait]
impl ClusterFacade for MockCluster {
    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn default_wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    async fn install(
        &self,
        package: &PackageRef,
        options: Option<&InstallOptions>,
    ) -> Result<(), ClusterError> {
        let service_name = self.service_name_for(package, options);
        let mut state = self.enter(MockOperation::Install)?;

        if self.unknown_packages.contains(&package.name) {
            return Err(CosmosError::Rejected {
                status: 400,
                error_type: "PackageNotFound".to_string(),
                message: format!("Package [{}] not found", package.name),
            }
            .into());
        }

        if state.services.contains_key(&service_name) && !self.allow_duplicates {
            return Err(CosmosError::AlreadyInstalled {
                package: package.name.clone(),
                message: format!("App [/{}] is already installed", service_name),
            }
            .into());
        }

        state.next_task += 1;
        let task_id = format!("{}.{}", service_name, state.next_task);
        state.lingering_endpoints.remove(&service_name);
        state.services.insert(
            service_name.clone(),
            MockService {
                package: package.name.clone(),
                task_id,
                registration_polls_left: self.registration_polls,
                health_polls_left: self.health_polls,
            },
        );
        state.nodes.insert(node_path(&service_name));
        state.nodes.insert(data_node_path(&service_name));
        state.deployment_polls_left = self.deployment_polls;
        Ok(())
    }

    async fn is_installed(&self, package_name: &str) -> Result<bool, ClusterError> {
        let state = self.enter(MockOperation::IsInstalled)?;
        Ok(state.services.values().any(|s| s.package == package_name))
    }

    async fn get_service(&self, name: &str) -> Result<Option<ServiceRef>, ClusterError> {
        let mut state = self.enter(MockOperation::GetService)?;

        let found = state
            .services
            .iter_mut()
            .find(|(service_name, s)| service_name.as_str() == name || s.package == name);

        let Some((_, service)) = found else {
            return Ok(None);
        };

        if !service.registered() {
            service.registration_polls_left -= 1;
            return Ok(None);
        }

        Ok(Some(ServiceRef {
            id: format!("{}-framework", name),
            name: name.to_string(),
            active: true,
        }))
    }

    async fn is_healthy(&self, service_name: &str) -> Result<bool, ClusterError> {
        let mut state = self.enter(MockOperation::IsHealthy)?;

        let Some(service) = state.services.get_mut(service_name) else {
            return Ok(false);
        };

        if !service.registered() {
            return Ok(false);
        }

        if service.health_polls_left > 0 {
            service.health_polls_left -= 1;
            return Ok(false);
        }

        Ok(true)
    }

    async fn pending_deployments(&self) -> Result<usize, ClusterError> {
        let mut state = self.enter(MockOperation::PendingDeployments)?;

        if state.deployment_polls_left > 0 {
            state.deployment_polls_left -= 1;
            return Ok(1);
        }

        Ok(0)
    }

    async fn endpoint_reachable(&self, service_name: &str) -> Result<bool, ClusterError> {
        let mut state = self.enter(MockOperation::EndpointReachable)?;

        if let Some(polls_left) = state.lingering_endpoints.get_mut(service_name) {
            if *polls_left > 0 {
                *polls_left -= 1;
                return Ok(true);
            }
            state.lingering_endpoints.remove(service_name);
            return Ok(false);
        }

        Ok(state
            .services
            .get(service_name)
            .is_some_and(MockService::registered))
    }

    async fn uninstall_app(
        &self,
        package_name: &str,
        _wipe_data: bool,
        service_name: Option<&str>,
    ) -> Result<(), ClusterError> {
        let mut state = self.enter(MockOperation::Uninstall)?;

        let targets: Vec<String> = state
            .services
            .iter()
            .filter(|(name, s)| match service_name {
                Some(wanted) => name.as_str() == wanted.trim_start_matches('/'),
                None => s.package == package_name,
            })
            .map(|(name, _)| name.clone())
            .collect();

        if targets.is_empty() {
            return Err(CosmosError::Rejected {
                status: 400,
                error_type: "UninstallNonExistentAppForPackage".to_string(),
                message: format!("No instances of package [{}] are installed", package_name),
            }
            .into());
        }

        for name in targets {
            state.services.remove(&name);
            if self.endpoint_linger_polls > 0 {
                state
                    .lingering_endpoints
                    .insert(name, self.endpoint_linger_polls);
            }
        }
        state.deployment_polls_left = self.deployment_polls;
        Ok(())
    }

    async fn delete_node(&self, path: &str) -> Result<(), ClusterError> {
        let mut state = self.enter(MockOperation::DeleteNode)?;
        state.nodes.remove(path);
        Ok(())
    }

    async fn get_service_task(
        &self,
        package_name: &str,
        service_name: &str,
    ) -> Result<Option<Task>, ClusterError> {
        let state = self.enter(MockOperation::GetServiceTask)?;

        Ok(state
            .services
            .get(service_name)
            .filter(|s| s.package == package_name)
            .map(|s| Task {
                id: s.task_id.clone(),
                name: service_name.to_string(),
                state: if s.registered() {
                    "TASK_RUNNING".to_string()
                } else {
                    "TASK_STAGING".to_string()
                },
            }))
    }

    async fn describe_package(
        &self,
        package: &PackageRef,
    ) -> Result<PackageDescription, ClusterError> {
        let _state = self.enter(MockOperation::DescribePackage)?;

        if self.unknown_packages.contains(&package.name) {
            return Err(CosmosError::Rejected {
                status: 400,
                error_type: "PackageNotFound".to_string(),
                message: format!("Package [{}] not found", package.name),
            }
            .into());
        }

        Ok(PackageDescription {
            name: package.name.clone(),
            version: package
                .version
                .clone()
                .unwrap_or_else(|| "1.0.0".to_string()),
            description: None,
            framework: true,
        })
    }

    async fn cluster_info(&self) -> Result<ClusterInfo, ClusterError> {
        let _state = self.enter(MockOperation::ClusterInfo)?;

        Ok(ClusterInfo {
            version: "1.9.0".to_string(),
            public_agents: self.public_agents,
            private_agents: self.private_agents,
        })
    }
}

/// Builder for MockCluster configuration.
#[derive(Debug)]
pub struct MockClusterBuilder {
    default_services: HashMap<String, String>,
    unknown_packages: HashSet<String>,
    registration_polls: u32,
    health_polls: u32,
    deployment_polls: u32,
    endpoint_linger_polls: u32,
    allow_duplicates: bool,
    private_agents: usize,
    public_agents: usize,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl Default for MockClusterBuilder {
    fn default() -> Self {
        Self {
            default_services: HashMap::new(),
            unknown_packages: HashSet::new(),
            registration_polls: 0,
            health_polls: 0,
            deployment_polls: 0,
            endpoint_linger_polls: 0,
            allow_duplicates: false,
            private_agents: 5,
            public_agents: 1,
            poll_interval: Duration::from_millis(5),
            wait_timeout: Duration::from_secs(2),
        }
    }
}

impl MockClusterBuilder {
    /// Service name used when installing `package` without a name override.
    #[must_use]
    pub fn default_service(mut self, package: &str, service_name: &str) -> Self {
        self.default_services
            .insert(package.to_string(), service_name.to_string());
        self
    }

    /// Packages the catalog does not know.
    #[must_use]
    pub fn unknown_package(mut self, package: &str) -> Self {
        self.unknown_packages.insert(package.to_string());
        self
    }

    /// `get_service` polls answered with "absent" before a new install registers.
    #[must_use]
    pub fn registration_polls(mut self, polls: u32) -> Self {
        self.registration_polls = polls;
        self
    }

    /// `is_healthy` polls answered with "unhealthy" after registration.
    #[must_use]
    pub fn health_polls(mut self, polls: u32) -> Self {
        self.health_polls = polls;
        self
    }

    /// Deployment polls answered with "pending" after install or uninstall.
    #[must_use]
    pub fn deployment_polls(mut self, polls: u32) -> Self {
        self.deployment_polls = polls;
        self
    }

    /// Endpoint probes still answering after uninstall.
    #[must_use]
    pub fn endpoint_linger_polls(mut self, polls: u32) -> Self {
        self.endpoint_linger_polls = polls;
        self
    }

    /// Accept duplicate installs instead of conflicting.
    #[must_use]
    pub fn allow_duplicate_installs(mut self) -> Self {
        self.allow_duplicates = true;
        self
    }

    #[must_use]
    pub fn private_agents(mut self, count: usize) -> Self {
        self.private_agents = count;
        self
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    #[must_use]
    pub fn build(self) -> MockCluster {
        MockCluster {
            state: Mutex::new(MockState::default()),
            default_services: self.default_services,
            unknown_packages: self.unknown_packages,
            registration_polls: self.registration_polls,
            health_polls: self.health_polls,
            deployment_polls: self.deployment_polls,
            endpoint_linger_polls: self.endpoint_linger_polls,
            allow_duplicates: self.allow_duplicates,
            private_agents: self.private_agents,
            public_agents: self.public_agents,
            poll_interval: self.poll_interval,
            wait_timeout: self.wait_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_install_registers_after_polls() {
        let cluster = MockCluster::builder()
            .default_service("marathon", "marathon-user")
            .registration_polls(2)
            .build();

        cluster
            .install(&PackageRef::new("marathon"), None)
            .await
            .unwrap();

        assert!(cluster.has_service("marathon-user"));
        assert!(cluster.has_node("/universe/marathon-user"));
        assert!(cluster.has_node("/dcos-service-marathon-user"));
        assert!(cluster.get_service("marathon").await.unwrap().is_none());
        assert!(cluster.get_service("marathon").await.unwrap().is_none());
        assert!(cluster.get_service("marathon").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_install_conflicts() {
        let cluster = MockCluster::default();
        let package = PackageRef::new("neo4j");

        cluster.install(&package, None).await.unwrap();
        let err = cluster.install(&package, None).await.unwrap_err();

        assert!(err.is_already_installed());
    }

    #[tokio::test]
    async fn test_options_override_service_name() {
        let cluster = MockCluster::builder()
            .default_service("marathon", "marathon-user")
            .build();

        cluster
            .install(
                &PackageRef::new("marathon"),
                Some(&InstallOptions::with_service_name("test-marathon")),
            )
            .await
            .unwrap();

        assert!(cluster.has_service("test-marathon"));
        assert!(!cluster.has_service("marathon-user"));
    }

    #[tokio::test]
    async fn test_injected_failure_is_counted() {
        let cluster = MockCluster::default();
        cluster.fail(MockOperation::DeleteNode);

        assert!(cluster.delete_node("/universe/x").await.is_err());
        assert_eq!(cluster.call_count(MockOperation::DeleteNode), 1);

        cluster.recover(MockOperation::DeleteNode);
        assert!(cluster.delete_node("/universe/x").await.is_ok());
    }

    #[tokio::test]
    async fn test_endpoint_lingers_after_uninstall() {
        let cluster = MockCluster::builder().endpoint_linger_polls(1).build();
        cluster.seed_service("marathon", "test-marathon");

        cluster
            .uninstall_app("marathon", true, Some("test-marathon"))
            .await
            .unwrap();

        assert!(cluster.endpoint_reachable("test-marathon").await.unwrap());
        assert!(!cluster.endpoint_reachable("test-marathon").await.unwrap());
    }
}
