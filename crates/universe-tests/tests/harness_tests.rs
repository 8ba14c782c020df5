//! Lifecycle harness tests against the in-memory cluster.
//!
//! These run without a cluster and cover the harness contract: bounded health
//! polling, the inverted duplicate-install assertion, and cleanup that never
//! propagates failures.

use std::time::Duration;
use universe_tests::facade::mock::{MockCluster, MockOperation};
use universe_tests::facade::{ClusterFacade, InstallOptions};
use universe_tests::harness::{
    framework_data_node, universe_node, HarnessError, LifecycleHarness, ServiceState,
    UninstallOutcome, CUSTOM_SERVICE, MARATHON_PACKAGE, MARATHON_SERVICE,
};
use universe_tests::logging::init_tracing;

fn marathon_cluster() -> MockCluster {
    MockCluster::builder()
        .default_service(MARATHON_PACKAGE, MARATHON_SERVICE)
        .build()
}

fn harness(cluster: MockCluster) -> LifecycleHarness<MockCluster> {
    init_tracing();
    LifecycleHarness::new(cluster).with_install_timeout(Duration::from_secs(2))
}

// ============================================================================
// Install and health polling
// ============================================================================

#[tokio::test]
async fn test_install_and_wait_reports_installed() {
    let harness = harness(marathon_cluster());

    let installed = harness
        .install_and_wait(MARATHON_PACKAGE)
        .await
        .expect("install should not error");

    assert!(installed, "Package failed to install");
    assert!(harness.cluster().has_service(MARATHON_SERVICE));
}

#[tokio::test]
async fn test_install_error_propagates() {
    let cluster = marathon_cluster();
    cluster.fail(MockOperation::Install);
    let harness = harness(cluster);

    let result = harness.install_and_wait(MARATHON_PACKAGE).await;

    assert!(result.is_err(), "install failure must fail the test");
}

#[tokio::test]
async fn test_install_and_wait_status_errors_count_as_not_installed() {
    let cluster = marathon_cluster();
    cluster.fail(MockOperation::IsInstalled);
    let harness = harness(cluster).with_install_timeout(Duration::from_millis(50));

    let installed = harness
        .install_and_wait(MARATHON_PACKAGE)
        .await
        .expect("status query errors must not fail the install call");

    assert!(!installed);
    assert!(harness.cluster().call_count(MockOperation::IsInstalled) >= 1);
}

#[tokio::test]
async fn test_poll_until_healthy_after_registration_delay() {
    let cluster = MockCluster::builder()
        .default_service(MARATHON_PACKAGE, MARATHON_SERVICE)
        .registration_polls(3)
        .health_polls(2)
        .build();
    let harness = harness(cluster);

    harness.install_and_wait(MARATHON_PACKAGE).await.unwrap();

    let found = harness
        .poll_until_healthy(MARATHON_PACKAGE, MARATHON_SERVICE, Duration::from_secs(2))
        .await;

    assert!(found, "Service did not register with DCOS");
    assert!(harness.cluster().call_count(MockOperation::GetService) >= 4);
}

#[tokio::test]
async fn test_poll_until_healthy_times_out_with_false() {
    let cluster = MockCluster::builder()
        .default_service(MARATHON_PACKAGE, MARATHON_SERVICE)
        .health_polls(u32::MAX)
        .build();
    let harness = harness(cluster);

    harness.install_and_wait(MARATHON_PACKAGE).await.unwrap();

    let found = harness
        .poll_until_healthy(
            MARATHON_PACKAGE,
            MARATHON_SERVICE,
            Duration::from_millis(50),
        )
        .await;

    assert!(!found, "registered but never healthy must not count as found");
}

#[tokio::test]
async fn test_poll_until_healthy_absent_service() {
    let harness = harness(marathon_cluster());

    let found = harness
        .poll_until_healthy(
            MARATHON_PACKAGE,
            MARATHON_SERVICE,
            Duration::from_millis(50),
        )
        .await;

    assert!(!found);
    assert_eq!(harness.cluster().call_count(MockOperation::IsHealthy), 0);
}

#[tokio::test]
async fn test_poll_until_healthy_swallows_query_errors() {
    let cluster = marathon_cluster();
    cluster.seed_service(MARATHON_PACKAGE, MARATHON_SERVICE);
    cluster.fail(MockOperation::IsHealthy);
    let harness = harness(cluster);

    let found = harness
        .poll_until_healthy(
            MARATHON_PACKAGE,
            MARATHON_SERVICE,
            Duration::from_millis(50),
        )
        .await;

    assert!(!found);
    assert!(harness.cluster().call_count(MockOperation::IsHealthy) >= 1);
}

// ============================================================================
// Duplicate install (inverted assertion)
// ============================================================================

#[tokio::test]
async fn test_duplicate_install_error_is_success() {
    let harness = harness(marathon_cluster());
    harness.install_and_wait(MARATHON_PACKAGE).await.unwrap();

    harness
        .install_duplicate(MARATHON_PACKAGE)
        .await
        .expect("a rejected duplicate install is the expected outcome");
}

#[tokio::test]
async fn test_duplicate_install_accepted_is_failure() {
    let cluster = MockCluster::builder()
        .default_service(MARATHON_PACKAGE, MARATHON_SERVICE)
        .allow_duplicate_installs()
        .build();
    let harness = harness(cluster);
    harness.install_and_wait(MARATHON_PACKAGE).await.unwrap();

    let result = harness.install_duplicate(MARATHON_PACKAGE).await;

    assert!(
        matches!(
            result,
            Err(HarnessError::DuplicateInstallAccepted { ref package }) if package == MARATHON_PACKAGE
        ),
        "missing install error must be reported as failure, got {result:?}"
    );
}

// ============================================================================
// Install with options
// ============================================================================

#[tokio::test]
async fn test_install_with_custom_service_name() {
    let cluster = MockCluster::builder()
        .default_service(MARATHON_PACKAGE, MARATHON_SERVICE)
        .deployment_polls(2)
        .build();
    let harness = harness(cluster);

    let reachable = harness
        .install_with_options(
            MARATHON_PACKAGE,
            CUSTOM_SERVICE,
            &InstallOptions::with_service_name(CUSTOM_SERVICE),
        )
        .await
        .expect("install should not error");

    assert!(reachable, "endpoint for {CUSTOM_SERVICE} should be reachable");
    assert!(harness.cluster().has_service(CUSTOM_SERVICE));
    assert!(!harness.cluster().has_service(MARATHON_SERVICE));
}

#[tokio::test]
async fn test_install_with_options_endpoint_never_reachable() {
    let cluster = MockCluster::builder()
        .registration_polls(u32::MAX)
        .wait_timeout(Duration::from_millis(50))
        .build();
    let harness = harness(cluster);

    let reachable = harness
        .install_with_options(
            MARATHON_PACKAGE,
            CUSTOM_SERVICE,
            &InstallOptions::with_service_name(CUSTOM_SERVICE),
        )
        .await
        .expect("install should not error");

    assert!(!reachable);
}

// ============================================================================
// Uninstall (cleanup never propagates)
// ============================================================================

#[tokio::test]
async fn test_uninstall_removes_service_endpoint_and_node() {
    let cluster = MockCluster::builder()
        .default_service(MARATHON_PACKAGE, MARATHON_SERVICE)
        .endpoint_linger_polls(3)
        .deployment_polls(2)
        .build();
    cluster.seed_service(MARATHON_PACKAGE, MARATHON_SERVICE);
    let harness = harness(cluster);

    let outcome = harness.uninstall(MARATHON_SERVICE, MARATHON_PACKAGE).await;

    assert_eq!(outcome, UninstallOutcome::Removed);
    let cluster = harness.cluster();
    assert!(cluster.get_service(MARATHON_SERVICE).await.unwrap().is_none());
    assert!(
        cluster
            .wait_for_endpoint_removal(MARATHON_SERVICE, None)
            .await
    );
    assert!(!cluster.has_node(&universe_node(MARATHON_SERVICE)));
}

#[tokio::test]
async fn test_uninstall_is_idempotent() {
    let harness = harness(marathon_cluster());

    let first = harness.uninstall(MARATHON_SERVICE, MARATHON_PACKAGE).await;
    let second = harness.uninstall(MARATHON_SERVICE, MARATHON_PACKAGE).await;

    assert_eq!(first, UninstallOutcome::AlreadyAbsent);
    assert_eq!(second, UninstallOutcome::AlreadyAbsent);
    assert_eq!(harness.cluster().call_count(MockOperation::Uninstall), 0);
}

#[tokio::test]
async fn test_uninstall_swallows_remote_errors() {
    let cluster = marathon_cluster();
    cluster.seed_service(MARATHON_PACKAGE, MARATHON_SERVICE);
    cluster.fail(MockOperation::Uninstall);
    let harness = harness(cluster);

    let outcome = harness.uninstall(MARATHON_SERVICE, MARATHON_PACKAGE).await;

    assert!(outcome.is_failed());
    assert!(harness.cluster().has_service(MARATHON_SERVICE));
}

#[tokio::test]
async fn test_uninstall_swallows_task_lookup_errors() {
    let cluster = marathon_cluster();
    cluster.fail(MockOperation::GetServiceTask);
    let harness = harness(cluster);

    let outcome = harness.uninstall(MARATHON_SERVICE, MARATHON_PACKAGE).await;

    assert!(outcome.is_failed());
}

#[tokio::test]
async fn test_uninstall_keeps_node_when_endpoint_lingers() {
    let cluster = MockCluster::builder()
        .endpoint_linger_polls(u32::MAX)
        .wait_timeout(Duration::from_millis(50))
        .build();
    cluster.seed_service(MARATHON_PACKAGE, CUSTOM_SERVICE);
    let harness = harness(cluster);

    let outcome = harness.uninstall(CUSTOM_SERVICE, MARATHON_PACKAGE).await;

    match outcome {
        UninstallOutcome::Failed(reason) => assert!(reason.contains("still reachable")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(harness.cluster().has_node(&universe_node(CUSTOM_SERVICE)));
    assert_eq!(harness.cluster().call_count(MockOperation::DeleteNode), 0);
}

#[tokio::test]
async fn test_uninstall_node_delete_failure_is_swallowed() {
    let cluster = marathon_cluster();
    cluster.seed_service(MARATHON_PACKAGE, MARATHON_SERVICE);
    cluster.fail(MockOperation::DeleteNode);
    let harness = harness(cluster);

    let outcome = harness.uninstall(MARATHON_SERVICE, MARATHON_PACKAGE).await;

    assert!(outcome.is_failed());
    assert!(!harness.cluster().has_service(MARATHON_SERVICE));
}

#[tokio::test]
async fn test_uninstall_package_and_data() {
    let cluster = MockCluster::default();
    cluster.seed_service("cassandra", "cassandra");
    let harness = harness(cluster);

    assert_eq!(
        harness.uninstall_package_and_data("cassandra").await,
        UninstallOutcome::Removed
    );
    assert_eq!(
        harness.uninstall_package_and_data("cassandra").await,
        UninstallOutcome::AlreadyAbsent
    );
    assert!(!harness.cluster().has_node(&universe_node("cassandra")));
    assert!(!harness.cluster().has_node(&framework_data_node("cassandra")));
}

#[tokio::test]
async fn test_uninstall_package_and_data_deletes_nodes_after_uninstall_failure() {
    let cluster = MockCluster::default();
    cluster.seed_service("cassandra", "cassandra");
    cluster.fail(MockOperation::Uninstall);
    let harness = harness(cluster);

    let outcome = harness.uninstall_package_and_data("cassandra").await;

    assert!(
        outcome.is_failed(),
        "uninstall failure must be reported, got {outcome:?}"
    );
    let cluster = harness.cluster();
    assert_eq!(cluster.call_count(MockOperation::DeleteNode), 2);
    assert!(!cluster.has_node(&framework_data_node("cassandra")));
    assert!(!cluster.has_node(&universe_node("cassandra")));
}

#[tokio::test]
async fn test_uninstall_package_and_data_reports_node_delete_failure() {
    let cluster = MockCluster::default();
    cluster.seed_service("neo4j", "neo4j");
    cluster.fail(MockOperation::DeleteNode);
    let harness = harness(cluster);

    let outcome = harness.uninstall_package_and_data("neo4j").await;

    match outcome {
        UninstallOutcome::Failed(reason) => {
            assert!(reason.contains(&framework_data_node("neo4j")));
            assert!(reason.contains(&universe_node("neo4j")));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!harness.cluster().has_service("neo4j"));
    assert_eq!(harness.cluster().call_count(MockOperation::DeleteNode), 2);
}

// ============================================================================
// Setup / teardown hooks
// ============================================================================

#[tokio::test]
async fn test_setup_module_survives_cluster_info_failure() {
    let cluster = marathon_cluster();
    cluster.seed_service(MARATHON_PACKAGE, MARATHON_SERVICE);
    cluster.fail(MockOperation::ClusterInfo);
    let harness = harness(cluster);

    let outcome = harness
        .setup_module(MARATHON_SERVICE, MARATHON_PACKAGE)
        .await;

    assert_eq!(outcome, UninstallOutcome::Removed);
    assert_eq!(harness.cluster().call_count(MockOperation::ClusterInfo), 1);
}

#[tokio::test]
async fn test_teardown_hooks_are_idempotent() {
    let cluster = marathon_cluster();
    cluster.seed_service(MARATHON_PACKAGE, CUSTOM_SERVICE);
    let harness = harness(cluster);

    assert_eq!(
        harness
            .teardown_function(CUSTOM_SERVICE, MARATHON_PACKAGE)
            .await,
        UninstallOutcome::Removed
    );
    assert_eq!(
        harness
            .teardown_module(CUSTOM_SERVICE, MARATHON_PACKAGE)
            .await,
        UninstallOutcome::AlreadyAbsent
    );
}

// ============================================================================
// Full scenarios
// ============================================================================

#[tokio::test]
async fn test_marathon_install_uninstall_reinstall_scenario() {
    let cluster = MockCluster::builder()
        .default_service(MARATHON_PACKAGE, MARATHON_SERVICE)
        .registration_polls(2)
        .health_polls(1)
        .deployment_polls(1)
        .endpoint_linger_polls(2)
        .build();
    let harness = harness(cluster);

    assert!(harness.install_and_wait(MARATHON_PACKAGE).await.unwrap());
    assert!(
        harness
            .poll_until_healthy(MARATHON_PACKAGE, MARATHON_SERVICE, Duration::from_secs(2))
            .await
    );
    assert_eq!(
        harness
            .observe_state(MARATHON_PACKAGE, MARATHON_SERVICE)
            .await
            .unwrap(),
        ServiceState::Healthy
    );

    assert_eq!(
        harness.uninstall(MARATHON_SERVICE, MARATHON_PACKAGE).await,
        UninstallOutcome::Removed
    );
    assert_eq!(
        harness
            .observe_state(MARATHON_PACKAGE, MARATHON_SERVICE)
            .await
            .unwrap(),
        ServiceState::Absent
    );

    assert!(
        harness.install_and_wait(MARATHON_PACKAGE).await.unwrap(),
        "Package failed to reinstall"
    );
    harness
        .install_duplicate(MARATHON_PACKAGE)
        .await
        .expect("installing an installed package must error");
}

#[tokio::test]
async fn test_observe_state_walks_lifecycle() {
    let cluster = MockCluster::builder()
        .default_service(MARATHON_PACKAGE, MARATHON_SERVICE)
        .registration_polls(1)
        .health_polls(1)
        .endpoint_linger_polls(1)
        .build();
    let harness = harness(cluster);

    let state = || harness.observe_state(MARATHON_PACKAGE, MARATHON_SERVICE);

    assert_eq!(state().await.unwrap(), ServiceState::Absent);

    harness
        .cluster()
        .install(&MARATHON_PACKAGE.into(), None)
        .await
        .unwrap();
    // first lookup consumes the registration delay
    assert_eq!(state().await.unwrap(), ServiceState::Installing);
    // registered; first health query consumes the health delay
    assert_eq!(state().await.unwrap(), ServiceState::Registered);
    assert_eq!(state().await.unwrap(), ServiceState::Healthy);

    harness
        .cluster()
        .uninstall_app(MARATHON_PACKAGE, true, Some(MARATHON_SERVICE))
        .await
        .unwrap();
    assert_eq!(state().await.unwrap(), ServiceState::Uninstalling);
    assert_eq!(state().await.unwrap(), ServiceState::Absent);
}

#[tokio::test]
async fn test_required_private_agents() {
    let harness = harness(MockCluster::builder().private_agents(3).build());

    assert!(harness.required_private_agents(3).await.unwrap());
    assert!(!harness.required_private_agents(4).await.unwrap());
}
