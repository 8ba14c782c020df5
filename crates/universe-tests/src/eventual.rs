//! Eventual consistency helpers for cluster-state polling.
//!
//! Everything the suites wait on (package registration, health, deployments,
//! endpoint routing) is observed by polling the remote cluster at a fixed
//! interval until a deadline. A timeout is reported as `false`, never as an
//! error, so callers decide whether it fails the test.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::debug;

/// Categories of eventual consistency with documented deadlines.
#[derive(Debug, Clone, Copy)]
pub enum ConsistencyCategory {
    /// Package install until registered and healthy (300s).
    PackageInstall,

    /// Catalog package deployment on a multi-agent cluster (5min).
    UniversePackage,

    /// Marathon deployment queue drain (120s).
    DeploymentWait,

    /// Admin Router picking up or dropping a service endpoint (120s).
    EndpointChange,
}

impl ConsistencyCategory {
    /// Get the maximum timeout for this consistency category.
    pub fn timeout(&self) -> Duration {
        match self {
            ConsistencyCategory::PackageInstall => Duration::from_secs(300),
            ConsistencyCategory::UniversePackage => Duration::from_secs(5 * 60),
            ConsistencyCategory::DeploymentWait => Duration::from_secs(120),
            ConsistencyCategory::EndpointChange => Duration::from_secs(120),
        }
    }
}

/// Poll `condition` every `interval` until it returns true or `timeout` elapses.
///
/// The condition is only evaluated strictly before the deadline, so a zero
/// timeout returns false without polling. The final sleep is capped at the
/// time remaining.
pub async fn wait_until<F, Fut>(interval: Duration, timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    let mut attempts: u32 = 0;

    loop {
        let now = Instant::now();
        if now >= deadline {
            debug!(attempts, ?timeout, "Condition not met before deadline");
            return false;
        }

        attempts += 1;
        if condition().await {
            debug!(attempts, "Condition met");
            return true;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        sleep(interval.min(remaining)).await;
    }
}

/// Assert that a condition becomes true within the timeout for the given category.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use universe_tests::eventual::{assert_eventually, ConsistencyCategory};
///
/// # async fn example() {
/// assert_eventually(
///     ConsistencyCategory::EndpointChange,
///     Duration::from_secs(1),
///     || async { true },
/// )
/// .await
/// .expect("endpoint should appear within timeout");
/// # }
/// ```
pub async fn assert_eventually<F, Fut>(
    category: ConsistencyCategory,
    interval: Duration,
    condition: F,
) -> Result<(), String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let timeout = category.timeout();

    if wait_until(interval, timeout, condition).await {
        Ok(())
    } else {
        Err(format!(
            "Condition not met within {:?} (category: {:?})",
            timeout, category
        ))
    }
}
