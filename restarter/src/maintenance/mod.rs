pub mod checker;
pub mod config;
pub mod window;

pub use checker::{evaluate, parse_instant, MaintenanceDecision, MaintenanceWindowChecker};
pub use config::{ClusterMaintenanceConfig, MaintenanceSchedule};
pub use window::{MaintenanceWindow, Ordinal, OrdinalDay, TimeOfDay};
