//! Error types for the rolling restart engine
//!
//! Validation errors are terminal for a run. Health exhaustion and
//! decommission failures are terminal for the pod they occur on, which in
//! turn ends the run with a partial result.

use crate::types::HealthStatus;
use std::fmt;

/// Main error type for a cluster restart run
#[derive(Debug)]
pub enum RestartError {
    /// The cluster cannot be restarted as described
    Validation(ValidationError),

    /// The health gate ran out of retries without observing GREEN
    HealthCheckExhausted {
        last_status: HealthStatus,
        attempts: u32,
    },

    /// Decommissioning a pod failed
    Decommission(DecommissionError),

    /// A control-plane or database call failed
    ControlPlane(ControlPlaneError),

    /// The replacement pod never became Ready in time
    PodReadyTimeout { pod: String, timeout_secs: u64 },

    /// A single pod restart failed, wrapping the cause
    PodFailed {
        pod: String,
        cause: Box<RestartError>,
    },

    /// A paused run was not resumed in time
    PauseExpired { pod: String, waited_secs: u64 },

    /// The operator cancelled the run
    Cancelled { reason: String },
}

/// Validation error variants
#[derive(Debug)]
pub enum ValidationError {
    /// The cluster lists no pods
    EmptyPodSet { cluster: String },

    /// The backing workload could not be read
    BackingSpecUnresolvable { cluster: String, reason: String },

    /// Timeouts or policies are not usable
    InvalidDecommissionConfig { cluster: String, reason: String },

    /// The cluster is scaled to zero
    ClusterSuspended { cluster: String },

    /// A single field failed validation during construction
    InvalidField { field: String, reason: String },
}

/// Decommission error variants
#[derive(Debug)]
pub enum DecommissionError {
    /// The administrative decommission did not complete in time
    Timeout { pod: String, timeout_secs: u64 },

    /// The database process kept running after decommission
    ProcessNeverExited { pod: String, waited_secs: u64 },
}

/// Control-plane error variants
#[derive(Debug)]
pub enum ControlPlaneError {
    /// A resource does not exist
    NotFound { kind: String, name: String },

    /// An API call failed
    Api { operation: String, reason: String },

    /// An SQL statement was rejected or could not be delivered
    Statement {
        pod: String,
        statement: String,
        reason: String,
    },
}

/// Configuration error variants
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to load configuration file
    LoadFailed { path: String, reason: String },

    /// Invalid configuration value
    InvalidValue { field: String, reason: String },

    /// Configuration parsing error
    ParseError { reason: String },
}

impl RestartError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, RestartError::Cancelled { .. })
    }

    /// Last health status carried by the error, looking through pod failures
    pub fn last_health(&self) -> Option<HealthStatus> {
        match self {
            RestartError::HealthCheckExhausted { last_status, .. } => Some(*last_status),
            RestartError::PodFailed { cause, .. } => cause.last_health(),
            _ => None,
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        RestartError::Cancelled {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RestartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartError::Validation(e) => write!(f, "Validation error: {}", e),
            RestartError::HealthCheckExhausted {
                last_status,
                attempts,
            } => {
                write!(
                    f,
                    "Health check exhausted after {} attempts (last status: {})",
                    attempts, last_status
                )
            }
            RestartError::Decommission(e) => write!(f, "Decommission error: {}", e),
            RestartError::ControlPlane(e) => write!(f, "Control plane error: {}", e),
            RestartError::PodReadyTimeout { pod, timeout_secs } => {
                write!(
                    f,
                    "Pod {} did not become ready within {}s",
                    pod, timeout_secs
                )
            }
            RestartError::PodFailed { pod, cause } => {
                write!(f, "Pod {} failed: {}", pod, cause)
            }
            RestartError::PauseExpired { pod, waited_secs } => {
                write!(f, "Paused before pod {} and not resumed within {}s", pod, waited_secs)
            }
            RestartError::Cancelled { reason } => write!(f, "Cancelled: {}", reason),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyPodSet { cluster } => {
                write!(f, "Cluster '{}' has no pods", cluster)
            }
            ValidationError::BackingSpecUnresolvable { cluster, reason } => {
                write!(
                    f,
                    "Cannot resolve backing workload for cluster '{}': {}",
                    cluster, reason
                )
            }
            ValidationError::InvalidDecommissionConfig { cluster, reason } => {
                write!(
                    f,
                    "Invalid decommission configuration for cluster '{}': {}",
                    cluster, reason
                )
            }
            ValidationError::ClusterSuspended { cluster } => {
                write!(f, "Cluster '{}' is suspended (0 replicas)", cluster)
            }
            ValidationError::InvalidField { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl fmt::Display for DecommissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecommissionError::Timeout { pod, timeout_secs } => {
                write!(
                    f,
                    "Decommission of {} did not complete within {}s",
                    pod, timeout_secs
                )
            }
            DecommissionError::ProcessNeverExited { pod, waited_secs } => {
                write!(
                    f,
                    "Database process in {} still running after {}s",
                    pod, waited_secs
                )
            }
        }
    }
}

impl fmt::Display for ControlPlaneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlPlaneError::NotFound { kind, name } => {
                write!(f, "{} '{}' not found", kind, name)
            }
            ControlPlaneError::Api { operation, reason } => {
                write!(f, "Failed to {}: {}", operation, reason)
            }
            ControlPlaneError::Statement {
                pod,
                statement,
                reason,
            } => {
                write!(f, "Statement '{}' on {} failed: {}", statement, pod, reason)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::LoadFailed { path, reason } => {
                write!(f, "Failed to load config from '{}': {}", path, reason)
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            ConfigError::ParseError { reason } => {
                write!(f, "Failed to parse config: {}", reason)
            }
        }
    }
}

impl std::error::Error for RestartError {}
impl std::error::Error for ValidationError {}
impl std::error::Error for DecommissionError {}
impl std::error::Error for ControlPlaneError {}
impl std::error::Error for ConfigError {}

impl From<ValidationError> for RestartError {
    fn from(err: ValidationError) -> Self {
        RestartError::Validation(err)
    }
}

impl From<DecommissionError> for RestartError {
    fn from(err: DecommissionError) -> Self {
        RestartError::Decommission(err)
    }
}

impl From<ControlPlaneError> for RestartError {
    fn from(err: ControlPlaneError) -> Self {
        RestartError::ControlPlane(err)
    }
}
