//! Cluster health gate
//!
//! Destructive steps only run after the cluster reports GREEN.

pub mod backoff;
pub mod controller;

pub use backoff::{backoff_delay, jitter_factor, RetryBudget};
pub use controller::{HealthCheckController, HealthCheckOutcome, HealthState};
