//! Restart of a single pod

use crate::constants::pod::{READY_POLL_INTERVAL, READY_STABILITY};
use crate::decommission::{DecommissionPlan, DecommissionStrategyEngine};
use crate::errors::{ControlPlaneError, RestartError};
use crate::health::HealthCheckController;
use crate::k8s::{ControlPlane, PodFacts};
use crate::runtime::{span_secs, Cancellation, Clock};
use crate::types::{ClusterSpec, DecommissionOutcome, DecommissionStrategy, RunOptions};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A pod restart that did not finish. `record` is set once the pod was
/// touched, so the run report still shows what happened to it.
#[derive(Debug)]
pub struct PodRestartFailure {
    pub cause: RestartError,
    pub record: Option<DecommissionOutcome>,
}

impl From<RestartError> for PodRestartFailure {
    fn from(cause: RestartError) -> Self {
        Self { cause, record: None }
    }
}

pub struct PodRestartCoordinator {
    control_plane: Arc<dyn ControlPlane>,
    health: Arc<HealthCheckController>,
    engine: DecommissionStrategyEngine,
    clock: Arc<dyn Clock>,
}

impl PodRestartCoordinator {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        health: Arc<HealthCheckController>,
        engine: DecommissionStrategyEngine,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            control_plane,
            health,
            engine,
            clock,
        }
    }

    /// Restarts `pod` once the cluster is GREEN.
    ///
    /// Cancellation is honoured until the first destructive call. From then
    /// on the pod is carried through to readiness.
    pub async fn restart_one(
        &self,
        cluster: &ClusterSpec,
        pod: &str,
        options: &RunOptions,
        cancel: &Cancellation,
    ) -> Result<DecommissionOutcome, PodRestartFailure> {
        info!("Restarting pod {} of cluster {}", pod, cluster.name());

        self.health.await_healthy(cluster, cancel).await?;
        let plan = self
            .engine
            .plan(cluster, pod, options.pod_ready_timeout_secs)
            .await?;
        let before = self
            .control_plane
            .get_pod(cluster.namespace(), pod)
            .await
            .map_err(RestartError::from)?;

        cancel.check()?;
        let started = self.clock.now();

        if options.dry_run {
            info!(
                "[DRY RUN] Would decommission {} ({}) and delete it with a {}s grace period",
                pod, plan.strategy, plan.grace_period_secs
            );
            return Ok(self.outcome(&plan, started, false));
        }

        let result = self.decommission_and_replace(cluster, &plan, &before).await;

        let routing_reset = match plan.strategy {
            DecommissionStrategy::Manual => Some(self.engine.reset_allocation(cluster, pod).await),
            DecommissionStrategy::PlatformManaged => None,
        };

        match result {
            Ok(process_exited) => Ok(DecommissionOutcome {
                routing_reset,
                ..self.outcome(&plan, started, process_exited)
            }),
            Err(cause) => Err(PodRestartFailure {
                cause,
                record: Some(DecommissionOutcome {
                    success: false,
                    routing_reset,
                    ..self.outcome(&plan, started, false)
                }),
            }),
        }
    }

    async fn decommission_and_replace(
        &self,
        cluster: &ClusterSpec,
        plan: &DecommissionPlan,
        before: &PodFacts,
    ) -> Result<bool, RestartError> {
        let process_exited = self.engine.prepare(cluster, plan, before).await?;

        info!("Deleting pod {} with grace period {}s", plan.pod, plan.grace_period_secs);
        self.control_plane
            .delete_pod(cluster.namespace(), &plan.pod, plan.grace_period_secs)
            .await?;

        self.await_replacement_ready(cluster, plan, before).await?;
        Ok(process_exited)
    }

    /// Waits for a pod with a new UID that stays Ready long enough
    async fn await_replacement_ready(
        &self,
        cluster: &ClusterSpec,
        plan: &DecommissionPlan,
        before: &PodFacts,
    ) -> Result<(), RestartError> {
        let started = self.clock.now();
        let timeout = span_secs(plan.ready_timeout_secs);
        let stability = span_secs(READY_STABILITY.as_secs());
        let mut ready_since: Option<DateTime<Utc>> = None;

        while self.clock.now() - started < timeout {
            match self.control_plane.get_pod(cluster.namespace(), &plan.pod).await {
                Ok(current) if current.uid != before.uid && current.is_running_and_ready() => {
                    let now = self.clock.now();
                    let since = *ready_since.get_or_insert(now);
                    if now - since >= stability {
                        info!(
                            "Pod {} is ready and stable for {}s",
                            plan.pod,
                            (now - since).num_seconds()
                        );
                        return Ok(());
                    }
                    debug!("Pod {} is ready, waiting for stability", plan.pod);
                }
                Ok(_) => {
                    ready_since = None;
                    debug!("Replacement for {} is not ready yet", plan.pod);
                }
                Err(ControlPlaneError::NotFound { .. }) => {
                    ready_since = None;
                    debug!("Pod {} not recreated yet", plan.pod);
                }
                Err(e) => {
                    ready_since = None;
                    warn!("Failed to read pod {}: {}", plan.pod, e);
                }
            }

            self.clock.sleep(READY_POLL_INTERVAL).await;
        }

        Err(RestartError::PodReadyTimeout {
            pod: plan.pod.clone(),
            timeout_secs: plan.ready_timeout_secs,
        })
    }

    fn outcome(&self, plan: &DecommissionPlan, started: DateTime<Utc>, process_exited: bool) -> DecommissionOutcome {
        let elapsed = self.clock.now() - started;
        DecommissionOutcome {
            pod: plan.pod.clone(),
            strategy: plan.strategy,
            success: true,
            duration_secs: elapsed.num_milliseconds() as f64 / 1000.0,
            process_exited,
            timeout_secs: plan.timeout_secs,
            routing_reset: None,
        }
    }
}
