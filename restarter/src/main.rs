// File: restarter/src/main.rs
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use restarter::config::ConfigManager;
use restarter::http::HttpSqlProbe;
use restarter::k8s::KubeControlPlane;
use restarter::maintenance::{MaintenanceSchedule, MaintenanceWindowChecker};
use restarter::runtime::SystemClock;
use restarter::worker::{Dependencies, RestartWorker};

#[tokio::main]
async fn main() -> Result<()> {
    // `restarter sample-maintenance-config [cluster...]` prints a starting maintenance file
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("sample-maintenance-config") {
        let mut names: Vec<&str> = args[1..].iter().map(String::as_str).collect();
        if names.is_empty() {
            names.push("production-cluster");
        }
        print!("{}", MaintenanceSchedule::sample_toml(&names));
        return Ok(());
    }

    let env_filter = EnvFilter::from_default_env()
        .add_directive("restarter=info".parse()?)
        .add_directive("kube=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting CrateDB rolling restarter");

    let config_dir = std::env::var("RESTARTER_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let config_manager = ConfigManager::new(config_dir).await?;
    let config = config_manager.get_current_config();

    let maintenance = Arc::new(MaintenanceWindowChecker::load(config.maintenance_config_path.as_deref()).await);
    info!("Maintenance window checker initialized");

    let control_plane = Arc::new(KubeControlPlane::connect(config.kube_context.as_deref()).await?);

    let probe = Arc::new(HttpSqlProbe::new(config.sql.clone())?);
    info!("SQL probe initialized");

    let worker = RestartWorker::new(Dependencies {
        control_plane,
        probe,
        clock: Arc::new(SystemClock),
        maintenance,
    });

    // Ctrl-C cancels every active run; pods already being replaced finish first
    let tracker = worker.tracker();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let cancelled = tracker.cancel_all("interrupted by operator").await;
                warn!("Interrupt received, cancelled {} active run(s)", cancelled);
            }
            Err(e) => error!("Failed to listen for interrupt: {}", e),
        }
    });

    let fleet = worker
        .restart_fleet(&config.clusters, &config.run_options(), config.max_concurrent_clusters)
        .await
        .map_err(|e| anyhow!("Cluster discovery failed: {}", e))?;

    println!("{}", serde_json::to_string_pretty(&fleet)?);

    if fleet.failed_clusters > 0 || !fleet.discovery_errors.is_empty() {
        error!(
            "{} of {} cluster restart(s) failed, {} discovery error(s)",
            fleet.failed_clusters,
            fleet.total_clusters,
            fleet.discovery_errors.len()
        );
        std::process::exit(1);
    }

    info!("All {} cluster restart(s) completed", fleet.total_clusters);
    Ok(())
}
