pub mod config;
pub mod constants;
pub mod decommission;
pub mod errors;
pub mod health;
pub mod http;
pub mod k8s;
pub mod maintenance;
pub mod restart;
pub mod run_tracker;
pub mod runtime;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use config::{Config, ConfigManager};
pub use errors::RestartError;
pub use http::HttpSqlProbe;
pub use k8s::KubeControlPlane;
pub use maintenance::MaintenanceWindowChecker;
pub use restart::ClusterRestartOrchestrator;
pub use run_tracker::RunTracker;
pub use runtime::SystemClock;
pub use types::{ClusterSpec, FleetRestartResult, RestartResult, RunOptions};
pub use worker::{Dependencies, RestartWorker};
