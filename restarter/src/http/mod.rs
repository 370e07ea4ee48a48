//! Database access over CrateDB's HTTP `_sql` endpoint

pub mod sql_client;

use crate::types::{ClusterSpec, HealthStatus};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use sql_client::HttpSqlProbe;

/// Successful `_sql` response body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqlResponse {
    #[serde(default)]
    pub cols: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub rowcount: i64,
    #[serde(default)]
    pub duration: f64,
}

/// Health queries and administrative statements against a cluster
#[async_trait]
pub trait ClusterProbe: Send + Sync {
    /// Most severe health reported by the cluster. Unreachable clusters
    /// report `Unreachable`; other failures are returned as errors.
    async fn cluster_health(&self, cluster: &ClusterSpec) -> Result<HealthStatus>;

    /// Runs one statement on the node backing `pod`
    async fn execute(&self, cluster: &ClusterSpec, pod: &str, statement: &str) -> Result<SqlResponse>;
}
