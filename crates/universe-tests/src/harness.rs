//! Install/uninstall lifecycle harness.
//!
//! `LifecycleHarness` sequences [`ClusterFacade`] calls into the steps the
//! acceptance suites assert on. Two rules shape every method here:
//!
//! - Primary flows (`install_*`) propagate remote errors so the test fails.
//!   Waits report timeouts as `false` and leave the assertion to the caller.
//! - Cleanup flows (`uninstall*`, `setup_module`, `teardown_*`) never return
//!   an error. Failures are logged and reported through [`UninstallOutcome`]
//!   so a broken cleanup cannot mask or replace a test's own failure.

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::cluster::ClusterError;
use crate::eventual::{wait_until, ConsistencyCategory};
use crate::facade::{ClusterFacade, InstallOptions, PackageRef};

/// Package providing the scheduler under test.
pub const MARATHON_PACKAGE: &str = "marathon";

/// Service name Marathon-on-Marathon registers by default.
pub const MARATHON_SERVICE: &str = "marathon-user";

/// Service name used by the custom service name scenario.
pub const CUSTOM_SERVICE: &str = "test-marathon";

/// Coordination node Cosmos keeps for an installed service.
pub fn universe_node(service_name: &str) -> String {
    format!("/universe/{}", service_name.trim_start_matches('/'))
}

/// Coordination node holding a framework's persistent state.
pub fn framework_data_node(service_name: &str) -> String {
    format!("/dcos-service-{}", service_name.trim_start_matches('/'))
}

/// Failures detected by the harness itself.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Installing an already-installed package succeeded when it must not.
    #[error("Error: install of already-installed package {package} was accepted")]
    DuplicateInstallAccepted { package: String },

    #[error("Deployments still pending after {0:?}")]
    DeploymentTimeout(Duration),

    #[error("Endpoint for service {service} still reachable after uninstall")]
    EndpointStillPresent { service: String },

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Result of a cleanup uninstall. Never an error by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallOutcome {
    /// No task backed the service; nothing to do.
    AlreadyAbsent,
    /// Uninstalled, endpoint gone, coordination node deleted.
    Removed,
    /// Cleanup failed; the reason was logged.
    Failed(String),
}

impl UninstallOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, UninstallOutcome::Failed(_))
    }
}

/// Position of a service instance in its lifecycle, derived from polled facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Absent,
    Installing,
    Registered,
    Healthy,
    Uninstalling,
}

impl ServiceState {
    /// Derive the state from the facts a single observation collects.
    pub fn from_facts(installed: bool, registered: bool, healthy: bool, endpoint: bool) -> Self {
        match (installed, registered) {
            (true, true) if healthy => ServiceState::Healthy,
            (true, true) => ServiceState::Registered,
            (true, false) => ServiceState::Installing,
            (false, _) if registered || endpoint => ServiceState::Uninstalling,
            (false, _) => ServiceState::Absent,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Absent => "ABSENT",
            ServiceState::Installing => "INSTALLING",
            ServiceState::Registered => "REGISTERED",
            ServiceState::Healthy => "HEALTHY",
            ServiceState::Uninstalling => "UNINSTALLING",
        };
        f.write_str(name)
    }
}

/// Drives package lifecycles against a [`ClusterFacade`].
pub struct LifecycleHarness<F> {
    cluster: F,
    install_timeout: Duration,
}

impl<F: ClusterFacade> LifecycleHarness<F> {
    pub fn new(cluster: F) -> Self {
        Self {
            cluster,
            install_timeout: ConsistencyCategory::PackageInstall.timeout(),
        }
    }

    /// Override the install deadline (300s by default).
    #[must_use]
    pub fn with_install_timeout(mut self, timeout: Duration) -> Self {
        self.install_timeout = timeout;
        self
    }

    pub fn cluster(&self) -> &F {
        &self.cluster
    }

    pub fn install_timeout(&self) -> Duration {
        self.install_timeout
    }

    /// Install `package` and wait until Cosmos reports it installed.
    ///
    /// Returns whether the package was reported installed before the install
    /// deadline. Errors from the install call itself propagate.
    #[instrument(skip(self))]
    pub async fn install_and_wait(&self, package: &str) -> Result<bool, ClusterError> {
        self.cluster.install(&PackageRef::new(package), None).await?;

        let cluster = &self.cluster;
        let installed = wait_until(
            cluster.poll_interval(),
            self.install_timeout,
            move || async move {
                match cluster.is_installed(package).await {
                    Ok(installed) => installed,
                    Err(e) => {
                        warn!(error = %e, "Install status query failed");
                        false
                    }
                }
            },
        )
        .await;

        if installed && !cluster.deployment_wait(None).await {
            warn!("Deployments still pending after install");
        }

        info!(installed, "Install finished");
        Ok(installed)
    }

    /// Poll until `package` is registered and `service` is healthy.
    ///
    /// True iff both were observed before `timeout` elapsed. For `marathon`
    /// the root framework already satisfies the existence check on a live
    /// cluster, so health alone decides there. Never errors:
    /// failed queries are logged and count as "not yet".
    #[instrument(skip(self))]
    pub async fn poll_until_healthy(&self, package: &str, service: &str, timeout: Duration) -> bool {
        let cluster = &self.cluster;

        let found = wait_until(cluster.poll_interval(), timeout, move || async move {
            match cluster.get_service(package).await {
                Ok(Some(_)) => {}
                Ok(None) => return false,
                Err(e) => {
                    warn!(error = %e, "Service lookup failed");
                    return false;
                }
            }

            match cluster.is_healthy(service).await {
                Ok(healthy) => healthy,
                Err(e) => {
                    warn!(error = %e, "Health query failed");
                    false
                }
            }
        })
        .await;

        info!(found, "Health poll finished");
        found
    }

    /// Install with an options tree and wait for the service endpoint.
    ///
    /// Success is endpoint reachability for `service`, not an installed flag.
    #[instrument(skip(self, options))]
    pub async fn install_with_options(
        &self,
        package: &str,
        service: &str,
        options: &InstallOptions,
    ) -> Result<bool, ClusterError> {
        self.cluster
            .install(&PackageRef::new(package), Some(options))
            .await?;

        if !self.cluster.deployment_wait(None).await {
            warn!("Deployments still pending after install");
        }

        let reachable = self.cluster.wait_for_endpoint(service, None).await;
        info!(reachable, "Install with options finished");
        Ok(reachable)
    }

    /// Install a package that is already installed; the install must fail.
    ///
    /// Returns `Ok(())` when the cluster rejects the install and
    /// `Err(DuplicateInstallAccepted)` when it does not. The missing error is
    /// the failure signal.
    #[instrument(skip(self))]
    pub async fn install_duplicate(&self, package: &str) -> Result<(), HarnessError> {
        match self.cluster.install(&PackageRef::new(package), None).await {
            Err(e) => {
                info!(
                    conflict = e.is_already_installed(),
                    error = %e,
                    "Duplicate install rejected"
                );
                Ok(())
            }
            Ok(()) => Err(HarnessError::DuplicateInstallAccepted {
                package: package.to_string(),
            }),
        }
    }

    /// Remove `service` (installed from `package`) if a task backs it.
    ///
    /// Uninstalls with data wipe, waits for deployments and for the endpoint
    /// to disappear, then deletes the coordination node. Never errors.
    #[instrument(skip(self))]
    pub async fn uninstall(&self, service: &str, package: &str) -> UninstallOutcome {
        match self.try_uninstall(service, package).await {
            Ok(outcome) => {
                info!(?outcome, "Uninstall finished");
                outcome
            }
            Err(e) => {
                warn!(error = %e, "Uninstall failed, continuing");
                UninstallOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_uninstall(
        &self,
        service: &str,
        package: &str,
    ) -> Result<UninstallOutcome, HarnessError> {
        if self
            .cluster
            .get_service_task(package, service)
            .await?
            .is_none()
        {
            return Ok(UninstallOutcome::AlreadyAbsent);
        }

        self.cluster
            .uninstall_app(package, true, Some(service))
            .await?;

        self.wait_for_deployments().await?;

        if !self.cluster.wait_for_endpoint_removal(service, None).await {
            return Err(HarnessError::EndpointStillPresent {
                service: service.to_string(),
            });
        }

        self.cluster.delete_node(&universe_node(service)).await?;
        Ok(UninstallOutcome::Removed)
    }

    /// Remove every instance of a catalog package with its data. Never errors.
    ///
    /// A failed uninstall is logged and the framework's data node and the
    /// Cosmos node are still deleted. `Failed` is returned only after both
    /// deletes were attempted.
    #[instrument(skip(self))]
    pub async fn uninstall_package_and_data(&self, package: &str) -> UninstallOutcome {
        let mut failures = Vec::new();

        let removed = match self.try_uninstall_package(package).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Package uninstall failed, deleting data anyway");
                failures.push(e.to_string());
                false
            }
        };

        for node in [framework_data_node(package), universe_node(package)] {
            if let Err(e) = self.cluster.delete_node(&node).await {
                warn!(node = %node, error = %e, "Node delete failed");
                failures.push(format!("{}: {}", node, e));
            }
        }

        let outcome = match (failures.is_empty(), removed) {
            (false, _) => UninstallOutcome::Failed(failures.join("; ")),
            (true, true) => UninstallOutcome::Removed,
            (true, false) => UninstallOutcome::AlreadyAbsent,
        };
        info!(?outcome, "Package cleanup finished");
        outcome
    }

    /// Uninstall every instance of `package`. False if none was installed.
    async fn try_uninstall_package(&self, package: &str) -> Result<bool, HarnessError> {
        if !self.cluster.is_installed(package).await? {
            return Ok(false);
        }

        self.cluster.uninstall_app(package, true, None).await?;
        self.wait_for_deployments().await?;
        Ok(true)
    }

    /// Before a suite: make sure `service` is gone and log cluster diagnostics.
    pub async fn setup_module(&self, service: &str, package: &str) -> UninstallOutcome {
        let outcome = self.uninstall(service, package).await;

        match self.cluster.cluster_info().await {
            Ok(cluster) => info!(
                version = %cluster.version,
                public_agents = cluster.public_agents,
                private_agents = cluster.private_agents,
                "Running against cluster"
            ),
            Err(e) => warn!(error = %e, "Could not collect cluster info"),
        }

        outcome
    }

    /// After each test.
    pub async fn teardown_function(&self, service: &str, package: &str) -> UninstallOutcome {
        self.uninstall(service, package).await
    }

    /// After the whole suite.
    pub async fn teardown_module(&self, service: &str, package: &str) -> UninstallOutcome {
        self.uninstall(service, package).await
    }

    /// Observe where `service` currently sits in its lifecycle.
    pub async fn observe_state(
        &self,
        package: &str,
        service: &str,
    ) -> Result<ServiceState, ClusterError> {
        let installed = self.cluster.is_installed(package).await?;
        let registered = self.cluster.get_service(service).await?.is_some();
        let healthy = registered && self.cluster.is_healthy(service).await?;
        let endpoint = !installed && self.cluster.endpoint_reachable(service).await?;

        Ok(ServiceState::from_facts(
            installed, registered, healthy, endpoint,
        ))
    }

    /// Whether the cluster has at least `count` private agents.
    pub async fn required_private_agents(&self, count: usize) -> Result<bool, ClusterError> {
        Ok(self.cluster.private_agent_count().await? >= count)
    }

    async fn wait_for_deployments(&self) -> Result<(), HarnessError> {
        let timeout = self.cluster.default_wait_timeout();

        if self.cluster.deployment_wait(Some(timeout)).await {
            Ok(())
        } else {
            Err(HarnessError::DeploymentTimeout(timeout))
        }
    }
}
