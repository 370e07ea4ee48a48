//! Health gate: polls until the cluster is GREEN or a retry budget runs out

use super::backoff::{backoff_delay, RetryBudget};
use crate::constants::health::MAX_TOTAL_POLLS;
use crate::errors::RestartError;
use crate::http::ClusterProbe;
use crate::runtime::{Cancellation, Clock};
use crate::types::{ClusterSpec, HealthStatus};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Progress of a single health gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthState {
    Unknown,
    Checking,
    Yellow,
    Red,
    Unreachable,
    Green,
    Failed,
}

impl HealthState {
    pub fn observed(status: HealthStatus) -> Self {
        match status {
            HealthStatus::Green => HealthState::Green,
            HealthStatus::Yellow => HealthState::Yellow,
            HealthStatus::Red => HealthState::Red,
            HealthStatus::Unknown => HealthState::Unknown,
            HealthStatus::Unreachable => HealthState::Unreachable,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, HealthState::Green | HealthState::Failed)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthState::Unknown => "UNKNOWN",
            HealthState::Checking => "CHECKING",
            HealthState::Yellow => "YELLOW",
            HealthState::Red => "RED",
            HealthState::Unreachable => "UNREACHABLE",
            HealthState::Green => "GREEN",
            HealthState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckOutcome {
    pub status: HealthStatus,
    /// Polls made across all observed states
    pub polls: u32,
}

pub struct HealthCheckController {
    probe: Arc<dyn ClusterProbe>,
    clock: Arc<dyn Clock>,
}

impl HealthCheckController {
    pub fn new(probe: Arc<dyn ClusterProbe>, clock: Arc<dyn Clock>) -> Self {
        Self { probe, clock }
    }

    /// Returns once the cluster reports GREEN.
    ///
    /// Each non-green status has its own retry budget and the attempt counter
    /// restarts whenever the observed status changes. A hard cap on total polls
    /// stops clusters that keep flapping between states.
    pub async fn await_healthy(
        &self,
        cluster: &ClusterSpec,
        cancel: &Cancellation,
    ) -> Result<HealthCheckOutcome, RestartError> {
        let mut state = HealthState::Checking;
        let mut current: Option<HealthStatus> = None;
        let mut attempts = 0u32;
        let mut polls = 0u32;

        loop {
            cancel.check()?;

            let observed = match self.probe.cluster_health(cluster).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("Health query for {} failed: {:#}", cluster.name(), e);
                    HealthStatus::Unknown
                }
            };
            polls += 1;

            let next_state = HealthState::observed(observed);
            if next_state != state {
                debug!("Health state for {}: {} -> {}", cluster.name(), state, next_state);
                state = next_state;
            }

            let Some(budget) = RetryBudget::for_status(observed) else {
                info!("Cluster {} is GREEN after {} poll(s)", cluster.name(), polls);
                return Ok(HealthCheckOutcome {
                    status: observed,
                    polls,
                });
            };

            if current != Some(observed) {
                current = Some(observed);
                attempts = 0;
            }
            attempts += 1;

            if attempts >= budget.max_attempts || polls >= MAX_TOTAL_POLLS {
                error!(
                    "Cluster {} did not reach GREEN: {} after {} attempt(s), {} poll(s) in total",
                    cluster.name(),
                    observed,
                    attempts,
                    polls
                );
                debug!("Health state for {}: {} -> {}", cluster.name(), state, HealthState::Failed);
                return Err(RestartError::HealthCheckExhausted {
                    last_status: observed,
                    attempts,
                });
            }

            let delay = backoff_delay(budget.base_delay, attempts);
            info!(
                "Cluster {} health is {} (attempt {}/{}), retrying in {:.1}s",
                cluster.name(),
                observed,
                attempts,
                budget.max_attempts,
                delay.as_secs_f64()
            );
            cancel.sleep(self.clock.as_ref(), delay).await?;
        }
    }
}
