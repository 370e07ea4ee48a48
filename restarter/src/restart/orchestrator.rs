//! Drives one cluster through a rolling restart
//!
//! A run moves through MAINTENANCE_CHECK, VALIDATION, INITIAL_HEALTH,
//! POD_RESTARTS and FINAL_HEALTH before reaching COMPLETE. Any error ends it
//! in FAILED, an operator cancellation ends it in CANCELLED. An operator may
//! pause the run, which holds it before its next pod. Progress made before
//! the end is always reported.

use super::pod::PodRestartCoordinator;
use super::suspension::pod_node_suspension;
use crate::constants::maintenance::RECHECK_INTERVAL;
use crate::constants::orchestrator::{MAX_PAUSE, STABILIZATION_DELAY};
use crate::decommission::{analyze_hook, DecommissionStrategyEngine};
use crate::errors::{RestartError, ValidationError};
use crate::health::HealthCheckController;
use crate::http::ClusterProbe;
use crate::k8s::ControlPlane;
use crate::maintenance::{MaintenanceDecision, MaintenanceWindowChecker};
use crate::runtime::{Cancellation, Clock, PauseGate, RunSignals};
use crate::types::{ClusterSpec, DecommissionOutcome, HealthStatus, RestartResult, RunOptions};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    MaintenanceCheck,
    Validation,
    InitialHealth,
    PodRestarts,
    FinalHealth,
    Complete,
    Failed,
    Cancelled,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::MaintenanceCheck => "MAINTENANCE_CHECK",
            RunState::Validation => "VALIDATION",
            RunState::InitialHealth => "INITIAL_HEALTH",
            RunState::PodRestarts => "POD_RESTARTS",
            RunState::FinalHealth => "FINAL_HEALTH",
            RunState::Complete => "COMPLETE",
            RunState::Failed => "FAILED",
            RunState::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// Accumulator owned by a single run
struct RunProgress {
    state: RunState,
    restarted: Vec<String>,
    skipped: Vec<String>,
    decommissions: Vec<DecommissionOutcome>,
    processed: usize,
    last_health: HealthStatus,
    maintenance_override: Option<String>,
}

impl RunProgress {
    fn new(cluster: &ClusterSpec) -> Self {
        Self {
            state: RunState::MaintenanceCheck,
            restarted: Vec::new(),
            skipped: Vec::new(),
            decommissions: Vec::new(),
            processed: 0,
            last_health: cluster.health(),
            maintenance_override: None,
        }
    }

    fn enter(&mut self, cluster: &ClusterSpec, state: RunState) {
        info!("[STATE: {}] {} (was {})", state, cluster.name(), self.state);
        self.state = state;
    }
}

/// Message attached to a run that did not complete
pub fn failure_message(
    cluster: &str,
    cause: &RestartError,
    last_health: HealthStatus,
    restarted: usize,
    total: usize,
) -> String {
    let verb = if cause.is_cancellation() { "cancelled" } else { "failed" };
    format!(
        "Cluster restart {} for {}: {} (last health: {}, restarted {}/{} pods)",
        verb, cluster, cause, last_health, restarted, total
    )
}

pub struct ClusterRestartOrchestrator {
    control_plane: Arc<dyn ControlPlane>,
    health: Arc<HealthCheckController>,
    pods: PodRestartCoordinator,
    maintenance: Arc<MaintenanceWindowChecker>,
    clock: Arc<dyn Clock>,
}

impl ClusterRestartOrchestrator {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        probe: Arc<dyn ClusterProbe>,
        maintenance: Arc<MaintenanceWindowChecker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let health = Arc::new(HealthCheckController::new(probe.clone(), clock.clone()));
        let engine = DecommissionStrategyEngine::new(control_plane.clone(), probe, clock.clone());
        let pods = PodRestartCoordinator::new(control_plane.clone(), health.clone(), engine, clock.clone());

        Self {
            control_plane,
            health,
            pods,
            maintenance,
            clock,
        }
    }

    /// Runs a full restart of `cluster`. Never fails: errors end up in the result.
    pub async fn run(&self, cluster: &ClusterSpec, options: &RunOptions, mut signals: RunSignals) -> RestartResult {
        let run_id = Uuid::new_v4().to_string();
        let started_at = self.clock.now();
        let cancel = signals.cancellation();
        let mut progress = RunProgress::new(cluster);

        info!(
            "Starting restart run {} for cluster {} ({} pods, dry run: {})",
            run_id,
            cluster.name(),
            cluster.pods().len(),
            options.dry_run
        );

        let outcome = self
            .drive(cluster, options, &mut signals, &cancel, &mut progress)
            .await;

        let total = cluster.pods().len();
        let (success, cancelled, final_health, error) = match outcome {
            Ok(final_health) => {
                progress.enter(cluster, RunState::Complete);
                if !progress.skipped.is_empty() {
                    info!(
                        "[STATE: COMPLETE] Restarted {} pods, skipped {}: {}",
                        progress.restarted.len(),
                        progress.skipped.len(),
                        progress.skipped.join(", ")
                    );
                }
                (final_health.is_green(), false, final_health, None)
            }
            Err(e) => {
                if let Some(health) = e.last_health() {
                    progress.last_health = health;
                }
                let message = failure_message(
                    cluster.name(),
                    &e,
                    progress.last_health,
                    progress.restarted.len(),
                    total,
                );
                if e.is_cancellation() {
                    progress.enter(cluster, RunState::Cancelled);
                    warn!("[STATE: CANCELLED] {}", message);
                } else {
                    progress.enter(cluster, RunState::Failed);
                    error!("[STATE: FAILED] {}", message);
                }
                (false, e.is_cancellation(), progress.last_health, Some(message))
            }
        };

        let completed_at = self.clock.now();
        RestartResult {
            run_id,
            cluster: cluster.reference(),
            success,
            cancelled,
            duration_secs: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            restarted_pods: progress.restarted,
            skipped_pods: progress.skipped,
            total_pods: total,
            final_health,
            decommissions: progress.decommissions,
            maintenance_override: progress.maintenance_override,
            error,
            started_at,
            completed_at,
        }
    }

    async fn drive(
        &self,
        cluster: &ClusterSpec,
        options: &RunOptions,
        signals: &mut RunSignals,
        cancel: &Cancellation,
        progress: &mut RunProgress,
    ) -> Result<HealthStatus, RestartError> {
        if options.ignore_maintenance_windows {
            info!("[STATE: MAINTENANCE_CHECK] Maintenance windows ignored for {}", cluster.name());
        } else {
            self.await_maintenance(cluster, signals, cancel, progress).await?;
        }

        progress.enter(cluster, RunState::Validation);
        self.validate(cluster).await?;

        progress.enter(cluster, RunState::InitialHealth);
        let initial = self.health.await_healthy(cluster, cancel).await?;
        progress.last_health = initial.status;

        progress.enter(cluster, RunState::PodRestarts);
        let total = cluster.pods().len();
        let pause = signals.pause_gate();
        for (idx, pod) in cluster.pods().iter().enumerate() {
            cancel.check()?;
            signals.report(|p| p.current_pod = Some(pod.clone()));
            self.await_resume(pod, &pause, cancel).await?;

            if options.only_on_suspended_nodes && !self.on_suspended_node(cluster, pod).await {
                progress.skipped.push(pod.clone());
                signals.report(|p| p.skipped_pods.push(pod.clone()));
                continue;
            }

            if progress.processed > 0 {
                cancel.sleep(self.clock.as_ref(), STABILIZATION_DELAY).await?;
            }
            progress.processed += 1;

            info!("[STATE: POD_RESTARTS] Restarting pod {}/{}: {}", idx + 1, total, pod);
            match self.pods.restart_one(cluster, pod, options, cancel).await {
                Ok(outcome) => {
                    progress.restarted.push(pod.clone());
                    progress.decommissions.push(outcome);
                    signals.report(|p| p.pods_completed.push(pod.clone()));
                    progress.last_health = HealthStatus::Green;
                    info!("[STATE: POD_RESTARTS] Successfully restarted pod {}", pod);
                }
                Err(failure) => {
                    progress.decommissions.extend(failure.record);
                    if failure.cause.is_cancellation() {
                        return Err(failure.cause);
                    }
                    return Err(RestartError::PodFailed {
                        pod: pod.clone(),
                        cause: Box::new(failure.cause),
                    });
                }
            }
        }
        signals.report(|p| p.current_pod = None);
        cancel.check()?;

        if progress.processed == 0 {
            info!(
                "[STATE: FINAL_HEALTH] Skipping final health check for {}, no pods were restarted",
                cluster.name()
            );
            return Ok(progress.last_health);
        }

        progress.enter(cluster, RunState::FinalHealth);
        let final_health = self.health.await_healthy(cluster, cancel).await?;
        progress.last_health = final_health.status;
        Ok(final_health.status)
    }

    /// Waits until the cluster's maintenance window allows a restart or an
    /// operator forces it through
    async fn await_maintenance(
        &self,
        cluster: &ClusterSpec,
        signals: &mut RunSignals,
        cancel: &Cancellation,
        progress: &mut RunProgress,
    ) -> Result<(), RestartError> {
        loop {
            cancel.check()?;

            match self.maintenance.check(cluster.name(), self.clock.now()) {
                MaintenanceDecision::Proceed { reason } => {
                    info!("[STATE: MAINTENANCE_CHECK] {}: {}", cluster.name(), reason);
                    return Ok(());
                }
                MaintenanceDecision::Wait {
                    next_window_start,
                    reason,
                } => {
                    info!(
                        "[STATE: MAINTENANCE_CHECK] Waiting for {}: {} (next window: {})",
                        cluster.name(),
                        reason,
                        next_window_start
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "none found".to_string())
                    );

                    tokio::select! {
                        biased;
                        reason = signals.next_override() => {
                            warn!(
                                "[STATE: MAINTENANCE_CHECK] Maintenance window overridden for {}: {}",
                                cluster.name(),
                                reason
                            );
                            progress.maintenance_override = Some(reason);
                            return Ok(());
                        }
                        slept = cancel.sleep(self.clock.as_ref(), RECHECK_INTERVAL) => slept?,
                    }
                }
            }
        }
    }

    /// Holds the run before `pod` while the operator has it paused
    async fn await_resume(&self, pod: &str, pause: &PauseGate, cancel: &Cancellation) -> Result<(), RestartError> {
        if !pause.is_paused() {
            return Ok(());
        }

        info!("[STATE: POD_RESTARTS] Restart paused at pod {}", pod);
        tokio::select! {
            biased;
            reason = cancel.cancelled() => {
                info!("[STATE: POD_RESTARTS] Restart cancelled during pause");
                return Err(RestartError::cancelled(reason));
            }
            _ = pause.resumed() => {}
            _ = self.clock.sleep(MAX_PAUSE) => {
                return Err(RestartError::PauseExpired {
                    pod: pod.to_string(),
                    waited_secs: MAX_PAUSE.as_secs(),
                });
            }
        }

        info!("[STATE: POD_RESTARTS] Restart resumed at pod {}", pod);
        Ok(())
    }

    async fn validate(&self, cluster: &ClusterSpec) -> Result<(), RestartError> {
        if cluster.pods().is_empty() {
            return Err(ValidationError::EmptyPodSet {
                cluster: cluster.name().to_string(),
            }
            .into());
        }
        if cluster.is_suspended() {
            return Err(ValidationError::ClusterSuspended {
                cluster: cluster.name().to_string(),
            }
            .into());
        }

        let backing = self
            .control_plane
            .backing_spec(cluster)
            .await
            .map_err(|e| ValidationError::BackingSpecUnresolvable {
                cluster: cluster.name().to_string(),
                reason: e.to_string(),
            })?;

        cluster
            .decommission()
            .validate()
            .map_err(|reason| ValidationError::InvalidDecommissionConfig {
                cluster: cluster.name().to_string(),
                reason,
            })?;

        let hook = analyze_hook(backing.prestop_command.as_deref());
        if !hook.has_prestop_hook {
            warn!(
                "Cluster {}: no pre-stop hook on {}, pods will be decommissioned manually",
                cluster.name(),
                backing.statefulset_name
            );
        } else if !hook.has_managed_hook {
            warn!(
                "Cluster {}: pre-stop hook on {} does not run the decommission utility",
                cluster.name(),
                backing.statefulset_name
            );
        }
        if !cluster.health().is_green() {
            warn!(
                "Cluster {} reported {} at discovery, waiting for GREEN before restarting",
                cluster.name(),
                cluster.health()
            );
        }

        info!("[STATE: VALIDATION] Cluster {} validated", cluster.name());
        Ok(())
    }

    /// Conservative: a pod whose node cannot be classified is skipped
    async fn on_suspended_node(&self, cluster: &ClusterSpec, pod: &str) -> bool {
        match pod_node_suspension(self.control_plane.as_ref(), cluster.namespace(), pod).await {
            Ok(fact) if fact.suspended => {
                info!(
                    "[STATE: POD_RESTARTS] Pod {} is on suspended node {}, restarting",
                    pod, fact.node_name
                );
                true
            }
            Ok(fact) => {
                info!(
                    "[STATE: POD_RESTARTS] Skipping pod {}, node {} is not suspended",
                    pod, fact.node_name
                );
                false
            }
            Err(e) => {
                warn!(
                    "[STATE: POD_RESTARTS] Skipping pod {}, node status could not be determined: {}",
                    pod, e
                );
                false
            }
        }
    }
}
