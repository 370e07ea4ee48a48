//! Retry budgets and backoff for the health gate

use crate::constants::health::*;
use crate::types::HealthStatus;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryBudget {
    /// GREEN needs no retries
    pub fn for_status(status: HealthStatus) -> Option<Self> {
        let (max_attempts, base_delay) = match status {
            HealthStatus::Green => return None,
            HealthStatus::Yellow => (YELLOW_MAX_ATTEMPTS, YELLOW_BASE_DELAY),
            HealthStatus::Red => (RED_MAX_ATTEMPTS, RED_BASE_DELAY),
            HealthStatus::Unknown => (UNKNOWN_MAX_ATTEMPTS, UNKNOWN_BASE_DELAY),
            HealthStatus::Unreachable => (UNREACHABLE_MAX_ATTEMPTS, UNREACHABLE_BASE_DELAY),
        };
        Some(Self {
            max_attempts,
            base_delay,
        })
    }
}

/// Jitter fraction derived from the attempt counter, between 10% and 28%
pub fn jitter_factor(attempt: u32) -> f64 {
    JITTER_BASE + f64::from(attempt % JITTER_CYCLE) * JITTER_STEP
}

/// `min(base * 2^attempt, 60s)` plus deterministic jitter
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.min(MAX_EXPONENT);
    let delay = base.saturating_mul(1u32 << exponent).min(MAX_BACKOFF);
    delay + delay.mul_f64(jitter_factor(attempt))
}
