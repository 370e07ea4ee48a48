//! Registry of the services a restart needs, built once at startup
//!
//! The binary constructs a [`RestartWorker`] from explicit [`Dependencies`]
//! and drives every run through it. Nothing below it reaches for globals.

use crate::errors::ControlPlaneError;
use crate::http::ClusterProbe;
use crate::k8s::{ControlPlane, DiscoveryResult};
use crate::maintenance::MaintenanceWindowChecker;
use crate::restart::ClusterRestartOrchestrator;
use crate::run_tracker::RunTracker;
use crate::runtime::Clock;
use crate::types::{ClusterSpec, FleetRestartResult, RestartResult, RunOptions};
use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct Dependencies {
    pub control_plane: Arc<dyn ControlPlane>,
    pub probe: Arc<dyn ClusterProbe>,
    pub clock: Arc<dyn Clock>,
    pub maintenance: Arc<MaintenanceWindowChecker>,
}

/// Key under which a cluster's active run is tracked
pub fn run_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

pub struct RestartWorker {
    control_plane: Arc<dyn ControlPlane>,
    maintenance: Arc<MaintenanceWindowChecker>,
    clock: Arc<dyn Clock>,
    orchestrator: ClusterRestartOrchestrator,
    tracker: Arc<RunTracker>,
}

impl RestartWorker {
    pub fn new(deps: Dependencies) -> Self {
        let orchestrator = ClusterRestartOrchestrator::new(
            deps.control_plane.clone(),
            deps.probe,
            deps.maintenance.clone(),
            deps.clock.clone(),
        );

        Self {
            control_plane: deps.control_plane,
            maintenance: deps.maintenance,
            clock: deps.clock,
            orchestrator,
            tracker: Arc::new(RunTracker::new()),
        }
    }

    pub fn tracker(&self) -> Arc<RunTracker> {
        self.tracker.clone()
    }

    /// Discovers clusters and applies their maintenance-config overrides
    pub async fn discover(&self, names: &[String]) -> Result<DiscoveryResult, ControlPlaneError> {
        let mut discovered = self.control_plane.discover_clusters(names).await?;

        discovered.clusters = discovered
            .clusters
            .into_iter()
            .map(|cluster| match self.maintenance.cluster_config(cluster.name()) {
                Some(config) => {
                    if config.decommission_timeout_override.is_some() || config.min_availability_override.is_some() {
                        info!(
                            "Applying decommission overrides for {}: timeout {:?}, min availability {:?}",
                            cluster.name(),
                            config.decommission_timeout_override,
                            config.min_availability_override
                        );
                    }
                    cluster.with_decommission_overrides(
                        config.decommission_timeout_override,
                        config.min_availability_override,
                    )
                }
                None => cluster,
            })
            .collect();

        for e in &discovered.errors {
            warn!("Discovery problem: {}", e);
        }
        info!("Discovered {} cluster(s)", discovered.clusters.len());
        Ok(discovered)
    }

    /// Restarts one cluster. Fails only when the cluster already has a run.
    pub async fn restart_cluster(&self, cluster: &ClusterSpec, options: &RunOptions) -> Result<RestartResult> {
        let key = run_key(cluster.namespace(), cluster.name());
        let signals = self.tracker.try_start(&key).await?;

        let result = self.orchestrator.run(cluster, options, signals).await;
        self.tracker.finish(&key).await;

        if result.success {
            info!(
                "Cluster {} restarted: {}/{} pods in {:.1}s",
                cluster.name(),
                result.restarted_pods.len(),
                result.total_pods,
                result.duration_secs
            );
        }
        Ok(result)
    }

    /// Discovers and restarts several clusters, at most `max_concurrency` at once
    pub async fn restart_fleet(
        &self,
        names: &[String],
        options: &RunOptions,
        max_concurrency: usize,
    ) -> Result<FleetRestartResult, ControlPlaneError> {
        let started_at = self.clock.now();
        let discovered = self.discover(names).await?;
        let total_clusters = discovered.clusters.len();
        let mut discovery_errors = discovered.errors;

        let outcomes: Vec<(String, Result<RestartResult>)> = stream::iter(discovered.clusters.iter())
            .map(|cluster| async move {
                (cluster.name().to_string(), self.restart_cluster(cluster, options).await)
            })
            .buffer_unordered(max_concurrency.max(1))
            .collect()
            .await;

        let mut results = Vec::with_capacity(outcomes.len());
        for (name, outcome) in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!("Restart of {} not started: {}", name, e);
                    discovery_errors.push(format!("{}: {}", name, e));
                }
            }
        }
        results.sort_by(|a, b| {
            (a.cluster.namespace.as_str(), a.cluster.name.as_str())
                .cmp(&(b.cluster.namespace.as_str(), b.cluster.name.as_str()))
        });

        let successful_clusters = results.iter().filter(|r| r.success).count();
        let completed_at = self.clock.now();
        info!(
            "Fleet restart finished: {}/{} cluster(s) successful",
            successful_clusters, total_clusters
        );

        Ok(FleetRestartResult {
            results,
            discovery_errors,
            total_clusters,
            successful_clusters,
            failed_clusters: total_clusters - successful_clusters,
            total_duration_secs: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            started_at,
            completed_at,
        })
    }
}
