// File: restarter/src/config/mod.rs
pub mod manager;
use crate::constants::{orchestrator, pod};
use crate::types::RunOptions;
use serde::{Deserialize, Serialize};
pub use manager::ConfigManager;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Clusters to restart; empty means every discovered cluster
    #[serde(default)]
    pub clusters: Vec<String>,
    pub kube_context: Option<String>,
    /// TOML file, or directory of TOML files, with maintenance windows
    pub maintenance_config_path: Option<String>,
    #[serde(default)]
    pub only_on_suspended_nodes: bool,
    #[serde(default)]
    pub ignore_maintenance_windows: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_pod_ready_timeout")]
    pub pod_ready_timeout_seconds: u64,
    #[serde(default = "default_max_concurrent_clusters")]
    pub max_concurrent_clusters: usize,
    #[serde(default)]
    pub sql: SqlConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlConfig {
    /// Endpoint for cluster-wide queries. Placeholders: {cluster}, {crd}, {namespace}, {statefulset}
    #[serde(default = "default_cluster_url_template")]
    pub cluster_url_template: String,
    /// Endpoint for statements addressed to one pod. Adds the {pod} placeholder
    #[serde(default = "default_pod_url_template")]
    pub pod_url_template: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_sql_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            cluster_url_template: default_cluster_url_template(),
            pod_url_template: default_pod_url_template(),
            username: None,
            password: None,
            accept_invalid_certs: default_accept_invalid_certs(),
            request_timeout_seconds: default_sql_timeout(),
        }
    }
}

impl Config {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            only_on_suspended_nodes: self.only_on_suspended_nodes,
            ignore_maintenance_windows: self.ignore_maintenance_windows,
            pod_ready_timeout_secs: self.pod_ready_timeout_seconds,
            dry_run: self.dry_run,
        }
    }
}

fn default_pod_ready_timeout() -> u64 {
    pod::READY_TIMEOUT_SECS
}

fn default_max_concurrent_clusters() -> usize {
    orchestrator::DEFAULT_MAX_CONCURRENT_CLUSTERS
}

fn default_cluster_url_template() -> String {
    "https://crate-{crd}.{namespace}.svc.cluster.local:4200/_sql".to_string()
}

fn default_pod_url_template() -> String {
    "https://{pod}.crate-discovery-{crd}.{namespace}.svc.cluster.local:4200/_sql".to_string()
}

fn default_accept_invalid_certs() -> bool {
    true // in-cluster endpoints use self-signed certificates
}

fn default_sql_timeout() -> u64 {
    30
}
