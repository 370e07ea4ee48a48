//! Clock that only moves when something sleeps on it

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use restarter::runtime::Clock;
use std::sync::Mutex;
use std::time::Duration;

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
    hold_from: Option<Duration>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
            sleeps: Mutex::new(Vec::new()),
            hold_from: None,
        }
    }

    /// Sleeps of at least `threshold` are recorded but never finish
    pub fn holding_sleeps_from(mut self, threshold: Duration) -> Self {
        self.hold_from = Some(threshold);
        self
    }

    /// Monday 2024-01-15 02:00 UTC
    pub fn new() -> Self {
        Self::starting_at(Utc.with_ymd_and_hms(2024, 1, 15, 2, 0, 0).unwrap())
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn slept_total(&self) -> Duration {
        self.sleeps().iter().sum()
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        if self.hold_from.is_some_and(|threshold| duration >= threshold) {
            self.sleeps.lock().unwrap().push(duration);
            return std::future::pending().await;
        }
        self.advance(duration);
        self.sleeps.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}
