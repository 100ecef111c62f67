// src/scheduler.rs
//! Cancellable periodic evaluation.
//!
//! At most one task runs at a time. `start` replaces a running task, `stop`
//! signals it and awaits the in-flight tick before returning. Each tick runs
//! in its own tokio task so a failing or panicking tick is logged and the
//! loop carries on.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::LearningError;

/// Work executed on every tick.
#[async_trait::async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    async fn tick(&self) -> Result<(), LearningError>;
}

struct Running {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
    period: Duration,
}

impl Running {
    async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!(target: "learning", error = %e, "scheduler task ended abnormally");
        }
    }
}

#[derive(Default)]
pub struct Scheduler {
    slot: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking every `period`; the first tick fires one period from now.
    /// A task that is already running is stopped (and joined) first.
    pub async fn start(&self, task: Arc<dyn PeriodicTask>, period: Duration) {
        let mut slot = self.slot.lock().await;
        if let Some(prev) = slot.take() {
            prev.shutdown().await;
        }
        *slot = Some(spawn_loop(task, period));
        tracing::info!(target: "learning", period_ms = period.as_millis() as u64, "evaluation scheduler started");
    }

    /// Restart with a new period, but only if a task is currently running.
    pub async fn restart_if_running(&self, task: Arc<dyn PeriodicTask>, period: Duration) -> bool {
        let mut slot = self.slot.lock().await;
        let Some(prev) = slot.take() else {
            return false;
        };
        prev.shutdown().await;
        *slot = Some(spawn_loop(task, period));
        tracing::info!(target: "learning", period_ms = period.as_millis() as u64, "evaluation scheduler restarted");
        true
    }

    /// Cancel the timer and wait for an in-flight tick to finish.
    pub async fn stop(&self) {
        if let Some(r) = self.slot.lock().await.take() {
            r.shutdown().await;
            tracing::info!(target: "learning", "evaluation scheduler stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    pub async fn period(&self) -> Option<Duration> {
        self.slot.lock().await.as_ref().map(|r| r.period)
    }
}

fn spawn_loop(task: Arc<dyn PeriodicTask>, period: Duration) -> Running {
    let (stop, mut stop_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                _ = ticker.tick() => {
                    let t = Arc::clone(&task);
                    match tokio::spawn(async move { t.tick().await }).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::warn!(target: "learning", error = %e, "periodic evaluation failed");
                        }
                        Err(e) => {
                            tracing::warn!(target: "learning", error = %e, "periodic evaluation panicked");
                        }
                    }
                }
            }
        }
    });
    Running {
        stop,
        handle,
        period,
    }
}
