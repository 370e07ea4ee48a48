//! Value records shared across the restart engine

use crate::constants::{decommission, pod};
use crate::errors::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Cluster health as reported by the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
    Unknown,
    Unreachable,
}

impl HealthStatus {
    /// Unrecognised values map to `Unknown`
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "GREEN" => HealthStatus::Green,
            "YELLOW" => HealthStatus::Yellow,
            "RED" => HealthStatus::Red,
            "UNREACHABLE" => HealthStatus::Unreachable,
            _ => HealthStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Green => "GREEN",
            HealthStatus::Yellow => "YELLOW",
            HealthStatus::Red => "RED",
            HealthStatus::Unknown => "UNKNOWN",
            HealthStatus::Unreachable => "UNREACHABLE",
        }
    }

    pub fn is_green(&self) -> bool {
        matches!(self, HealthStatus::Green)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shard availability the database must keep while a node leaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MinAvailability {
    #[default]
    Primaries,
    Full,
    None,
}

impl MinAvailability {
    pub fn as_str(&self) -> &'static str {
        match self {
            MinAvailability::Primaries => "PRIMARIES",
            MinAvailability::Full => "FULL",
            MinAvailability::None => "NONE",
        }
    }
}

impl FromStr for MinAvailability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PRIMARIES" => Ok(MinAvailability::Primaries),
            "FULL" => Ok(MinAvailability::Full),
            "NONE" => Ok(MinAvailability::None),
            other => Err(format!(
                "unknown min_availability '{}', expected PRIMARIES, FULL or NONE",
                other
            )),
        }
    }
}

impl fmt::Display for MinAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the database is drained before its pod is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecommissionStrategy {
    /// The pod's pre-stop hook runs the decommission utility
    PlatformManaged,
    /// The engine issues the decommission statements itself
    Manual,
}

impl fmt::Display for DecommissionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecommissionStrategy::PlatformManaged => f.write_str("platform-managed"),
            DecommissionStrategy::Manual => f.write_str("manual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecommissionConfig {
    pub has_managed_hook: bool,
    pub hook_timeout_secs: u64,
    pub min_availability: MinAvailability,
    /// Replaces the detected hook timeout and the manual timeout when set
    pub timeout_override_secs: Option<u64>,
}

impl DecommissionConfig {
    pub fn new(
        has_managed_hook: bool,
        hook_timeout_secs: u64,
        min_availability: MinAvailability,
    ) -> Result<Self, ValidationError> {
        if hook_timeout_secs == 0 {
            return Err(ValidationError::InvalidField {
                field: "hook_timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            has_managed_hook,
            hook_timeout_secs,
            min_availability,
            timeout_override_secs: None,
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.hook_timeout_secs == 0 {
            return Err("hook timeout must be greater than zero".to_string());
        }
        if self.timeout_override_secs == Some(0) {
            return Err("decommission timeout override must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl Default for DecommissionConfig {
    fn default() -> Self {
        Self {
            has_managed_hook: false,
            hook_timeout_secs: decommission::DEFAULT_HOOK_TIMEOUT_SECS,
            min_availability: MinAvailability::Primaries,
            timeout_override_secs: None,
        }
    }
}

/// Where a cluster lives in the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterIdentity {
    pub name: String,
    pub namespace: String,
    pub crd_name: String,
    pub statefulset_name: String,
}

/// Compact reference used in results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRef {
    pub name: String,
    pub namespace: String,
}

/// A discovered cluster, validated on construction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSpec {
    identity: ClusterIdentity,
    pods: Vec<String>,
    decommission: DecommissionConfig,
    health: HealthStatus,
    replicas: i32,
}

impl ClusterSpec {
    pub fn new(
        identity: ClusterIdentity,
        pods: Vec<String>,
        decommission: DecommissionConfig,
        health: HealthStatus,
        replicas: i32,
    ) -> Result<Self, ValidationError> {
        for (field, value) in [
            ("name", &identity.name),
            ("namespace", &identity.namespace),
            ("crd_name", &identity.crd_name),
            ("statefulset_name", &identity.statefulset_name),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidField {
                    field: field.to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }

        let mut seen = HashSet::new();
        for pod in &pods {
            if pod.trim().is_empty() {
                return Err(ValidationError::InvalidField {
                    field: "pods".to_string(),
                    reason: "pod names must not be empty".to_string(),
                });
            }
            if !seen.insert(pod.as_str()) {
                return Err(ValidationError::InvalidField {
                    field: "pods".to_string(),
                    reason: format!("duplicate pod '{}'", pod),
                });
            }
        }

        if replicas < 0 {
            return Err(ValidationError::InvalidField {
                field: "replicas".to_string(),
                reason: format!("must not be negative, got {}", replicas),
            });
        }

        Ok(Self {
            identity,
            pods,
            decommission,
            health,
            replicas,
        })
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn namespace(&self) -> &str {
        &self.identity.namespace
    }

    pub fn identity(&self) -> &ClusterIdentity {
        &self.identity
    }

    pub fn pods(&self) -> &[String] {
        &self.pods
    }

    pub fn decommission(&self) -> &DecommissionConfig {
        &self.decommission
    }

    pub fn health(&self) -> HealthStatus {
        self.health
    }

    pub fn replicas(&self) -> i32 {
        self.replicas
    }

    pub fn is_suspended(&self) -> bool {
        self.replicas == 0
    }

    pub fn reference(&self) -> ClusterRef {
        ClusterRef {
            name: self.identity.name.clone(),
            namespace: self.identity.namespace.clone(),
        }
    }

    /// Applies per-cluster overrides from the maintenance configuration
    pub fn with_decommission_overrides(
        mut self,
        timeout_secs: Option<u64>,
        min_availability: Option<MinAvailability>,
    ) -> Self {
        if let Some(timeout) = timeout_secs {
            self.decommission.timeout_override_secs = Some(timeout);
        }
        if let Some(policy) = min_availability {
            self.decommission.min_availability = policy;
        }
        self
    }
}

/// Result of setting shard allocation back to "all" after a manual decommission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingResetOutcome {
    pub success: bool,
    pub attempts: u32,
    /// Pod that accepted the statement
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecommissionOutcome {
    pub pod: String,
    pub strategy: DecommissionStrategy,
    pub success: bool,
    pub duration_secs: f64,
    pub process_exited: bool,
    pub timeout_secs: u64,
    /// Only present for manual decommissions. `success: false` means shard
    /// allocation is still restricted and must be reset by hand.
    #[serde(default)]
    pub routing_reset: Option<RoutingResetOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartResult {
    pub run_id: String,
    pub cluster: ClusterRef,
    pub success: bool,
    pub cancelled: bool,
    pub duration_secs: f64,
    pub restarted_pods: Vec<String>,
    pub skipped_pods: Vec<String>,
    pub total_pods: usize,
    pub final_health: HealthStatus,
    pub decommissions: Vec<DecommissionOutcome>,
    pub maintenance_override: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetRestartResult {
    pub results: Vec<RestartResult>,
    pub discovery_errors: Vec<String>,
    pub total_clusters: usize,
    pub successful_clusters: usize,
    pub failed_clusters: usize,
    pub total_duration_secs: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SuspensionReason {
    Unschedulable,
    Taint(String),
    Annotation(String),
}

impl fmt::Display for SuspensionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspensionReason::Unschedulable => f.write_str("node is unschedulable"),
            SuspensionReason::Taint(key) => write!(f, "taint {}", key),
            SuspensionReason::Annotation(key) => write!(f, "annotation {}", key),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSuspensionFact {
    pub node_name: String,
    pub suspended: bool,
    pub reason: Option<SuspensionReason>,
}

/// Invocation-time switches for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    pub only_on_suspended_nodes: bool,
    pub ignore_maintenance_windows: bool,
    pub pod_ready_timeout_secs: u64,
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            only_on_suspended_nodes: false,
            ignore_maintenance_windows: false,
            pod_ready_timeout_secs: pod::READY_TIMEOUT_SECS,
            dry_run: false,
        }
    }
}
