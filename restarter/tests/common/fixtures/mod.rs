//! This module provides reusable test utilities:
//! - An in-memory cluster acting as control plane and SQL probe
//! - A manual clock
//! - A mock CrateDB `_sql` server
//! - Test configuration builders
//! - Common test data

// Allow unused code in test fixtures - each test binary uses a subset
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fake_cluster;
pub mod manual_clock;
pub mod mock_sql;
pub mod test_config;
pub mod test_data;

// Re-export commonly used items
pub use fake_cluster::{cluster_spec, running_pod, FakeCluster};
pub use manual_clock::ManualClock;
pub use mock_sql::MockSqlServer;
pub use test_config::TestConfigBuilder;
pub use test_data::*;
