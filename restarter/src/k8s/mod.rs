//! Kubernetes access used by the restart engine
//!
//! The engine only talks to [`ControlPlane`]; [`KubeControlPlane`] is the
//! production implementation.

pub mod client;
pub mod discovery;

use crate::errors::ControlPlaneError;
use crate::types::ClusterSpec;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub use client::KubeControlPlane;
pub use discovery::DiscoveryResult;

/// Pod state relevant to a restart
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodFacts {
    pub name: String,
    pub uid: Option<String>,
    pub node_name: Option<String>,
    pub phase: Option<String>,
    pub ready: bool,
    /// Restart count of the database container
    pub database_restarts: i32,
    /// Whether the database container is currently running
    pub database_running: bool,
}

impl PodFacts {
    pub fn is_running_and_ready(&self) -> bool {
        self.phase.as_deref() == Some("Running") && self.ready
    }
}

/// Node state relevant to the suspended-node filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFacts {
    pub name: String,
    pub unschedulable: bool,
    pub taint_keys: Vec<String>,
    pub annotations: BTreeMap<String, String>,
}

/// The workload behind a cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackingSpec {
    pub statefulset_name: String,
    pub replicas: i32,
    /// Pre-stop command of the database container, if it has one
    pub prestop_command: Option<Vec<String>>,
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Finds clusters, optionally restricted to the given names
    async fn discover_clusters(&self, names: &[String]) -> Result<DiscoveryResult, ControlPlaneError>;

    async fn backing_spec(&self, cluster: &ClusterSpec) -> Result<BackingSpec, ControlPlaneError>;

    async fn get_pod(&self, namespace: &str, pod: &str) -> Result<PodFacts, ControlPlaneError>;

    async fn delete_pod(
        &self,
        namespace: &str,
        pod: &str,
        grace_period_secs: u32,
    ) -> Result<(), ControlPlaneError>;

    async fn get_node(&self, node: &str) -> Result<NodeFacts, ControlPlaneError>;
}
