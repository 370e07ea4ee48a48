//! Chooses and runs the decommission strategy for one pod

use super::detect::{analyze_hook, HookAnalysis};
use crate::constants::decommission::*;
use crate::errors::{ControlPlaneError, DecommissionError, RestartError, ValidationError};
use crate::http::ClusterProbe;
use crate::k8s::{ControlPlane, PodFacts};
use crate::runtime::{span_secs, Clock};
use crate::types::{ClusterSpec, DecommissionConfig, DecommissionStrategy, MinAvailability, RoutingResetOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Everything decided about a pod before anything destructive happens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecommissionPlan {
    pub pod: String,
    pub strategy: DecommissionStrategy,
    pub hook: HookAnalysis,
    /// Hook timeout for a managed decommission, graceful-stop timeout for a manual one
    pub timeout_secs: u64,
    pub min_availability: MinAvailability,
    pub grace_period_secs: u32,
    /// Budget for the replacement pod to become ready after deletion
    pub ready_timeout_secs: u64,
}

impl DecommissionPlan {
    pub fn new(
        pod: &str,
        hook: HookAnalysis,
        config: &DecommissionConfig,
        pod_ready_timeout_secs: u64,
    ) -> Self {
        if hook.has_managed_hook {
            let timeout_secs = config.timeout_override_secs.unwrap_or(hook.hook_timeout_secs);
            let grace = timeout_secs.saturating_add(MANAGED_GRACE_BUFFER_SECS);
            Self {
                pod: pod.to_string(),
                strategy: DecommissionStrategy::PlatformManaged,
                hook,
                timeout_secs,
                min_availability: config.min_availability,
                grace_period_secs: u32::try_from(grace).unwrap_or(u32::MAX),
                ready_timeout_secs: timeout_secs.saturating_add(pod_ready_timeout_secs),
            }
        } else {
            Self {
                pod: pod.to_string(),
                strategy: DecommissionStrategy::Manual,
                hook,
                timeout_secs: config.timeout_override_secs.unwrap_or(MANUAL_TIMEOUT_SECS),
                min_availability: config.min_availability,
                grace_period_secs: MANUAL_GRACE_PERIOD_SECS as u32,
                ready_timeout_secs: MANUAL_GRACE_PERIOD_SECS.saturating_add(pod_ready_timeout_secs),
            }
        }
    }
}

/// Node name the database uses for a pod, from its ordinal suffix
pub fn node_name_for_pod(pod: &str) -> Result<String, ValidationError> {
    let suffix = pod.rsplit('-').next().unwrap_or_default();
    if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidField {
            field: "pod".to_string(),
            reason: format!("'{}' has no ordinal suffix", pod),
        });
    }
    Ok(format!("{}-{}", NODE_NAME_PREFIX, suffix))
}

/// Statements of a manual decommission, in execution order
pub fn manual_statements(plan: &DecommissionPlan, node_name: &str) -> Vec<String> {
    vec![
        r#"set global transient "cluster.routing.allocation.enable" = "new_primaries""#.to_string(),
        format!(
            r#"set global transient "cluster.graceful_stop.timeout" = "{}s""#,
            plan.timeout_secs
        ),
        r#"set global transient "cluster.graceful_stop.force" = true"#.to_string(),
        format!(
            r#"set global transient "cluster.graceful_stop.min_availability" = "{}""#,
            plan.min_availability
        ),
        format!("alter cluster decommission $${}$$", node_name),
    ]
}

/// True once the database process of the original pod is gone
fn process_exited(before: &PodFacts, now: &PodFacts) -> bool {
    now.uid != before.uid || now.database_restarts > before.database_restarts || !now.database_running
}

pub struct DecommissionStrategyEngine {
    control_plane: Arc<dyn ControlPlane>,
    probe: Arc<dyn ClusterProbe>,
    clock: Arc<dyn Clock>,
}

impl DecommissionStrategyEngine {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        probe: Arc<dyn ClusterProbe>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            control_plane,
            probe,
            clock,
        }
    }

    /// Reads the current pre-stop hook and fixes the strategy for this pod
    pub async fn plan(
        &self,
        cluster: &ClusterSpec,
        pod: &str,
        pod_ready_timeout_secs: u64,
    ) -> Result<DecommissionPlan, RestartError> {
        let backing = self.control_plane.backing_spec(cluster).await?;
        let hook = analyze_hook(backing.prestop_command.as_deref());
        let plan = DecommissionPlan::new(pod, hook, cluster.decommission(), pod_ready_timeout_secs);

        info!(
            "Decommission strategy for {}: {} (timeout {}s, grace period {}s)",
            pod, plan.strategy, plan.timeout_secs, plan.grace_period_secs
        );
        Ok(plan)
    }

    /// Drains the pod's node ahead of deletion.
    ///
    /// A managed hook drains on deletion, so nothing happens here. A manual
    /// decommission issues the statements and waits for the database process
    /// to exit. Returns whether the process was seen exiting.
    pub async fn prepare(
        &self,
        cluster: &ClusterSpec,
        plan: &DecommissionPlan,
        before: &PodFacts,
    ) -> Result<bool, RestartError> {
        match plan.strategy {
            DecommissionStrategy::PlatformManaged => {
                info!(
                    "Pod {} has a managed decommission hook, it will run on deletion",
                    plan.pod
                );
                Ok(false)
            }
            DecommissionStrategy::Manual => {
                let node_name = node_name_for_pod(&plan.pod)?;
                info!("Decommissioning node {} of pod {} manually", node_name, plan.pod);

                let statements = manual_statements(plan, &node_name);
                tokio::select! {
                    biased;
                    executed = self.run_statements(cluster, &plan.pod, &statements) => executed?,
                    _ = self.clock.sleep(Duration::from_secs(plan.timeout_secs)) => {
                        return Err(DecommissionError::Timeout {
                            pod: plan.pod.clone(),
                            timeout_secs: plan.timeout_secs,
                        }
                        .into());
                    }
                }

                self.await_process_exit(cluster, plan, before).await?;
                Ok(true)
            }
        }
    }

    async fn run_statements(
        &self,
        cluster: &ClusterSpec,
        pod: &str,
        statements: &[String],
    ) -> Result<(), RestartError> {
        for (idx, statement) in statements.iter().enumerate() {
            debug!("Decommission statement {}/{} on {}: {}", idx + 1, statements.len(), pod, statement);
            self.probe
                .execute(cluster, pod, statement)
                .await
                .map_err(|e| ControlPlaneError::Statement {
                    pod: pod.to_string(),
                    statement: statement.clone(),
                    reason: format!("{:#}", e),
                })?;
        }
        Ok(())
    }

    async fn await_process_exit(
        &self,
        cluster: &ClusterSpec,
        plan: &DecommissionPlan,
        before: &PodFacts,
    ) -> Result<(), RestartError> {
        let started = self.clock.now();
        let limit = span_secs(plan.timeout_secs);

        loop {
            match self.control_plane.get_pod(cluster.namespace(), &plan.pod).await {
                Ok(now) if process_exited(before, &now) => {
                    info!("Database process in {} has exited", plan.pod);
                    return Ok(());
                }
                Ok(_) => debug!("Waiting for database process in {} to exit", plan.pod),
                Err(ControlPlaneError::NotFound { .. }) => {
                    info!("Pod {} is gone, database process has exited", plan.pod);
                    return Ok(());
                }
                Err(e) => warn!("Failed to read pod {} while waiting for exit: {}", plan.pod, e),
            }

            let waited = self.clock.now() - started;
            if waited >= limit {
                return Err(DecommissionError::ProcessNeverExited {
                    pod: plan.pod.clone(),
                    waited_secs: waited.num_seconds().max(0) as u64,
                }
                .into());
            }
            self.clock.sleep(PROCESS_EXIT_POLL).await;
        }
    }

    /// Sets shard allocation back to "all".
    ///
    /// Runs whether or not the restart succeeded. Failure never changes the
    /// restart result; it is logged as critical with manual instructions.
    pub async fn reset_allocation(&self, cluster: &ClusterSpec, pod: &str) -> RoutingResetOutcome {
        let fallback = cluster.pods().iter().find(|p| p.as_str() != pod).cloned();
        let mut targets = vec![pod.to_string()];
        targets.extend(fallback);

        for attempt in 1..=ROUTING_RESET_ATTEMPTS {
            for target in &targets {
                match self.probe.execute(cluster, target, RESET_ROUTING_STATEMENT).await {
                    Ok(_) => {
                        info!(
                            "Shard allocation reset to 'all' via {} (attempt {}/{})",
                            target, attempt, ROUTING_RESET_ATTEMPTS
                        );
                        return RoutingResetOutcome {
                            success: true,
                            attempts: attempt,
                            target: Some(target.clone()),
                        };
                    }
                    Err(e) => warn!(
                        "Shard allocation reset via {} failed (attempt {}/{}): {:#}",
                        target, attempt, ROUTING_RESET_ATTEMPTS, e
                    ),
                }
            }

            if let Some(wait) = ROUTING_RESET_BACKOFF_SECS.get(attempt as usize - 1) {
                self.clock.sleep(Duration::from_secs(*wait)).await;
            }
        }

        error!(
            "CRITICAL: could not reset shard allocation for cluster {} after {} attempts. \
             Manual intervention required: kubectl exec -n {} {} -c {} -- \
             curl -sSk -H 'Content-Type: application/json' -X POST https://127.0.0.1:4200/_sql \
             -d '{{\"stmt\": \"set global transient \\\"cluster.routing.allocation.enable\\\" = \\\"all\\\"\"}}'",
            cluster.name(),
            ROUTING_RESET_ATTEMPTS,
            cluster.namespace(),
            pod,
            DATABASE_CONTAINER
        );

        RoutingResetOutcome {
            success: false,
            attempts: ROUTING_RESET_ATTEMPTS,
            target: None,
        }
    }
}
