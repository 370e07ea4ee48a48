//! Draining a database node before its pod is deleted

pub mod detect;
pub mod engine;

pub use detect::{analyze_hook, HookAnalysis};
pub use crate::types::RoutingResetOutcome;
pub use engine::{DecommissionPlan, DecommissionStrategyEngine};
