//! Universe Package Lifecycle Test Suite
//!
//! This crate provides acceptance tests for installing, health-checking and
//! uninstalling packages through the DC/OS package manager. Marathon is the
//! primary package under test (as a user-level "Marathon on Marathon"
//! service); catalog packages such as neo4j and cassandra exercise Marathon's
//! role in deploying Universe packages.
//!
//! # Features
//!
//! - `smoke`: Cluster reachability checks (30s)
//! - `lifecycle`: Marathon install, reinstall, duplicate install and custom service name (10-15min)
//! - `universe`: Catalog packages that need 3-4 private agents (10min+)
//! - `all`: Enable all test categories
//!
//! Without features only the harness tests against [`facade::mock::MockCluster`]
//! and the fixture unit tests run.
//!
//! # Prerequisites
//!
//! 1. A DC/OS cluster reachable at `DCOS_URL`
//! 2. `DCOS_ACS_TOKEN` set when the cluster requires authentication
//! 3. No `marathon-user` or `test-marathon` service you care about (they are uninstalled)
//!
//! # Usage
//!
//! ```bash
//! # Harness and fixture tests only
//! cargo test -p universe-tests
//!
//! # Smoke tests only (30s)
//! DCOS_URL=https://dcos.example.com cargo test -p universe-tests --features smoke
//!
//! # Full suite
//! DCOS_URL=https://dcos.example.com DCOS_ACS_TOKEN=... cargo test -p universe-tests --features all
//! ```

pub mod cluster;
pub mod config;
pub mod eventual;
pub mod facade;
pub mod fixtures;
pub mod harness;
pub mod logging;
