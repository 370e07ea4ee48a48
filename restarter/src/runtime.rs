//! Timers and operator signals for restart runs
//!
//! A run receives a [`RunSignals`] and the operator keeps the matching
//! [`RunHandle`]. The handle can force a run past a maintenance wait once,
//! pause it between pods, and cancel it at any point. The run publishes its
//! pod progress back through the same pair.

use crate::errors::RestartError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

/// Source of time for everything that waits
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Whole seconds as a span for clock arithmetic, clamped instead of overflowing
pub fn span_secs(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

/// Pod-level progress of a run, as last published by the run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressReport {
    pub current_pod: Option<String>,
    pub pods_completed: Vec<String>,
    pub skipped_pods: Vec<String>,
}

/// Creates the operator and run halves of a signal pair
pub fn run_channel() -> (RunHandle, RunSignals) {
    let (override_tx, override_rx) = oneshot::channel();
    let (cancel_tx, cancel_rx) = watch::channel(None);
    let (pause_tx, pause_rx) = watch::channel(false);
    let (progress_tx, progress_rx) = watch::channel(ProgressReport::default());

    (
        RunHandle {
            override_tx: Mutex::new(Some(override_tx)),
            cancel_tx,
            pause_tx,
            progress_rx,
        },
        RunSignals {
            override_rx: Some(override_rx),
            cancellation: Cancellation { rx: cancel_rx },
            pause: PauseGate { rx: pause_rx },
            progress_tx,
        },
    )
}

/// Operator side of a run
pub struct RunHandle {
    override_tx: Mutex<Option<oneshot::Sender<String>>>,
    cancel_tx: watch::Sender<Option<String>>,
    pause_tx: watch::Sender<bool>,
    progress_rx: watch::Receiver<ProgressReport>,
}

impl RunHandle {
    /// Forces the run past its maintenance wait. Only the first call counts.
    pub fn force_proceed(&self, reason: impl Into<String>) -> bool {
        let sender = match self.override_tx.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match sender {
            Some(tx) => tx.send(reason.into()).is_ok(),
            None => {
                warn!("Maintenance override already delivered, ignoring");
                false
            }
        }
    }

    /// True once an override has been handed to the run
    pub fn override_delivered(&self) -> bool {
        match self.override_tx.lock() {
            Ok(slot) => slot.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        debug!("Cancellation requested: {}", reason);
        self.cancel_tx.send_replace(Some(reason));
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_tx.borrow().is_some()
    }

    /// Holds the run before its next pod. Returns false if it was already paused.
    pub fn pause(&self) -> bool {
        !self.pause_tx.send_replace(true)
    }

    /// Returns false if the run was not paused
    pub fn resume(&self) -> bool {
        self.pause_tx.send_replace(false)
    }

    pub fn is_paused(&self) -> bool {
        *self.pause_tx.borrow()
    }

    pub fn progress(&self) -> ProgressReport {
        self.progress_rx.borrow().clone()
    }
}

/// Run side of the signal pair
pub struct RunSignals {
    override_rx: Option<oneshot::Receiver<String>>,
    cancellation: Cancellation,
    pause: PauseGate,
    progress_tx: watch::Sender<ProgressReport>,
}

impl RunSignals {
    /// Signals for a run nobody can interrupt
    pub fn detached() -> Self {
        run_channel().1
    }

    pub fn cancellation(&self) -> Cancellation {
        self.cancellation.clone()
    }

    pub fn pause_gate(&self) -> PauseGate {
        self.pause.clone()
    }

    /// Updates the progress the operator sees
    pub fn report(&self, update: impl FnOnce(&mut ProgressReport)) {
        self.progress_tx.send_modify(update);
    }

    /// Resolves with the override reason. Pends forever once consumed or when
    /// the operator side is gone.
    pub async fn next_override(&mut self) -> String {
        let received = match self.override_rx.as_mut() {
            Some(rx) => rx.await,
            None => return std::future::pending().await,
        };
        self.override_rx = None;

        match received {
            Ok(reason) => reason,
            Err(_) => std::future::pending().await,
        }
    }
}

/// Cloneable view of a run's pause state
#[derive(Clone)]
pub struct PauseGate {
    rx: watch::Receiver<bool>,
}

impl PauseGate {
    pub fn is_paused(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the run is not paused. A run whose operator side is gone
    /// while paused stays paused.
    pub async fn resumed(&self) {
        let mut rx = self.rx.clone();
        loop {
            if !*rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

/// Cloneable view of a run's cancellation state
#[derive(Clone)]
pub struct Cancellation {
    rx: watch::Receiver<Option<String>>,
}

impl Cancellation {
    pub fn reason(&self) -> Option<String> {
        self.rx.borrow().clone()
    }

    pub fn check(&self) -> Result<(), RestartError> {
        match self.reason() {
            Some(reason) => Err(RestartError::cancelled(reason)),
            None => Ok(()),
        }
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&self) -> String {
        let mut rx = self.rx.clone();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    /// Sleeps on `clock`, unwinding early if the run is cancelled
    pub async fn sleep(&self, clock: &dyn Clock, duration: Duration) -> Result<(), RestartError> {
        self.check()?;
        tokio::select! {
            reason = self.cancelled() => Err(RestartError::cancelled(reason)),
            _ = clock.sleep(duration) => Ok(()),
        }
    }
}
