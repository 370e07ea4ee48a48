//! Tracking of active restart runs
//!
//! Only one run per cluster may be active at a time. Each active run keeps
//! the operator half of its signal pair here, so overrides, pauses and
//! cancellations can be delivered by cluster name, and the run's progress
//! can be read back.

use crate::runtime::{run_channel, RunHandle, RunSignals};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

struct ActiveRun {
    started_at: DateTime<Utc>,
    handle: Arc<RunHandle>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveRunInfo {
    pub cluster: String,
    pub started_at: DateTime<Utc>,
    pub current_pod: Option<String>,
    pub pods_completed: Vec<String>,
    pub skipped_pods: Vec<String>,
    pub paused: bool,
    pub cancelled: bool,
    /// A maintenance override was delivered to the run
    pub force_restart_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub active_runs: Vec<ActiveRunInfo>,
    pub total_active: usize,
}

pub struct RunTracker {
    active_runs: Arc<RwLock<HashMap<String, ActiveRun>>>, // cluster key -> run
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RunTracker {
    pub fn new() -> Self {
        Self {
            active_runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers a run for `cluster` and returns its signals.
    /// Fails if the cluster already has an active run.
    #[instrument(skip(self), fields(cluster = %cluster))]
    pub async fn try_start(&self, cluster: &str) -> Result<RunSignals> {
        let mut active = self.active_runs.write().await;

        if let Some(current) = active.get(cluster) {
            let minutes = Utc::now().signed_duration_since(current.started_at).num_minutes();
            return Err(anyhow!(
                "Cluster {} already has a restart in progress (started {}m ago)",
                cluster,
                minutes
            ));
        }

        let (handle, signals) = run_channel();
        active.insert(
            cluster.to_string(),
            ActiveRun {
                started_at: Utc::now(),
                handle: Arc::new(handle),
            },
        );
        info!("Registered restart run for {}", cluster);
        Ok(signals)
    }

    #[instrument(skip(self), fields(cluster = %cluster))]
    pub async fn finish(&self, cluster: &str) {
        let mut active = self.active_runs.write().await;
        if let Some(run) = active.remove(cluster) {
            let duration = Utc::now().signed_duration_since(run.started_at);
            info!("Restart run for {} finished (took {}m)", cluster, duration.num_minutes());
        }
    }

    /// Delivers a maintenance override to the active run of `cluster`
    pub async fn force_proceed(&self, cluster: &str, reason: &str) -> Result<bool> {
        let handle = self.handle(cluster).await?;
        let delivered = handle.force_proceed(reason);
        if delivered {
            warn!("Maintenance override delivered to {}: {}", cluster, reason);
        }
        Ok(delivered)
    }

    /// Holds the run of `cluster` before its next pod
    pub async fn pause(&self, cluster: &str, reason: &str) -> Result<bool> {
        let handle = self.handle(cluster).await?;
        let paused = handle.pause();
        if paused {
            info!("Restart run for {} paused: {}", cluster, reason);
        }
        Ok(paused)
    }

    pub async fn resume(&self, cluster: &str) -> Result<bool> {
        let handle = self.handle(cluster).await?;
        let resumed = handle.resume();
        if resumed {
            info!("Restart run for {} resumed", cluster);
        }
        Ok(resumed)
    }

    pub async fn cancel(&self, cluster: &str, reason: &str) -> Result<()> {
        let handle = self.handle(cluster).await?;
        warn!("Cancelling restart run for {}: {}", cluster, reason);
        handle.cancel(reason);
        Ok(())
    }

    /// Cancels every active run, returning how many were signalled
    pub async fn cancel_all(&self, reason: &str) -> usize {
        let active = self.active_runs.read().await;
        for (cluster, run) in active.iter() {
            warn!("Cancelling restart run for {}: {}", cluster, reason);
            run.handle.cancel(reason);
        }
        active.len()
    }

    pub async fn is_active(&self, cluster: &str) -> bool {
        self.active_runs.read().await.contains_key(cluster)
    }

    pub async fn get_status(&self) -> RunStatus {
        let active = self.active_runs.read().await;
        let mut active_runs: Vec<ActiveRunInfo> = active
            .iter()
            .map(|(cluster, run)| {
                let progress = run.handle.progress();
                ActiveRunInfo {
                    cluster: cluster.clone(),
                    started_at: run.started_at,
                    current_pod: progress.current_pod,
                    pods_completed: progress.pods_completed,
                    skipped_pods: progress.skipped_pods,
                    paused: run.handle.is_paused(),
                    cancelled: run.handle.is_cancelled(),
                    force_restart_active: run.handle.override_delivered(),
                }
            })
            .collect();
        active_runs.sort_by(|a, b| a.cluster.cmp(&b.cluster));

        RunStatus {
            total_active: active_runs.len(),
            active_runs,
        }
    }

    async fn handle(&self, cluster: &str) -> Result<Arc<RunHandle>> {
        self.active_runs
            .read()
            .await
            .get(cluster)
            .map(|run| run.handle.clone())
            .ok_or_else(|| anyhow!("No active restart run for cluster {}", cluster))
    }
}
