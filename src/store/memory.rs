// src/store/memory.rs
//! In-process store. Records every write so tests can assert on persistence,
//! and can be told to fail or stall to exercise the best-effort policy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use super::{matches_window, PersistentStore};
use crate::adjustment::Adjustment;
use crate::feedback::Feedback;
use crate::metrics::Metrics;
use crate::weights::Weight;

#[derive(Debug, Default)]
pub struct MemoryStore {
    weights: Mutex<Vec<Weight>>,
    feedback: Mutex<Vec<Feedback>>,
    adjustments: Mutex<Vec<Adjustment>>,
    metrics: Mutex<Vec<Metrics>>,
    /// Every `save_weight` call in order (one entry per call).
    weight_writes: Mutex<Vec<Weight>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate persisted weights as if saved by an earlier run.
    pub fn with_weights(weights: Vec<Weight>) -> Self {
        let s = Self::default();
        *s.weights.lock().expect("store mutex poisoned") = weights;
        s
    }

    pub fn with_feedback(self, feedback: Vec<Feedback>) -> Self {
        *self.feedback.lock().expect("store mutex poisoned") = feedback;
        self
    }

    pub fn set_fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    /// Stall every call by `d` (to trip the engine's persistence timeout).
    pub fn set_delay(&self, d: Option<Duration>) {
        *self.delay.lock().expect("store mutex poisoned") = d;
    }

    pub fn weight_writes(&self) -> Vec<Weight> {
        self.weight_writes
            .lock()
            .expect("store mutex poisoned")
            .clone()
    }

    pub fn weight_write_count(&self, factor: &str) -> usize {
        self.weight_writes
            .lock()
            .expect("store mutex poisoned")
            .iter()
            .filter(|w| w.factor == factor)
            .count()
    }

    pub fn saved_weights(&self) -> Vec<Weight> {
        self.weights.lock().expect("store mutex poisoned").clone()
    }

    pub fn saved_feedback(&self) -> Vec<Feedback> {
        self.feedback.lock().expect("store mutex poisoned").clone()
    }

    pub fn saved_adjustments(&self) -> Vec<Adjustment> {
        self.adjustments.lock().expect("store mutex poisoned").clone()
    }

    pub fn saved_metrics(&self) -> Vec<Metrics> {
        self.metrics.lock().expect("store mutex poisoned").clone()
    }

    async fn before_call(&self, write: bool) -> Result<()> {
        let delay = *self.delay.lock().expect("store mutex poisoned");
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if write && self.fail_writes.load(Ordering::SeqCst) {
            bail!("memory store: injected write failure");
        }
        if !write && self.fail_reads.load(Ordering::SeqCst) {
            bail!("memory store: injected read failure");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PersistentStore for MemoryStore {
    async fn load_weights(&self) -> Result<Vec<Weight>> {
        self.before_call(false).await?;
        Ok(self.saved_weights())
    }

    async fn save_weight(&self, weight: &Weight) -> Result<()> {
        self.before_call(true).await?;
        self.weight_writes
            .lock()
            .expect("store mutex poisoned")
            .push(weight.clone());
        let mut g = self.weights.lock().expect("store mutex poisoned");
        match g.iter_mut().find(|w| w.factor == weight.factor) {
            Some(existing) => *existing = weight.clone(),
            None => g.push(weight.clone()),
        }
        Ok(())
    }

    async fn load_recent_feedback(&self, limit: usize) -> Result<Vec<Feedback>> {
        self.before_call(false).await?;
        let g = self.feedback.lock().expect("store mutex poisoned");
        let start = g.len().saturating_sub(limit);
        Ok(g[start..].to_vec())
    }

    async fn save_feedback(&self, feedback: &Feedback) -> Result<()> {
        self.before_call(true).await?;
        self.feedback
            .lock()
            .expect("store mutex poisoned")
            .push(feedback.clone());
        Ok(())
    }

    async fn query_feedback(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> Result<Vec<Feedback>> {
        self.before_call(false).await?;
        let g = self.feedback.lock().expect("store mutex poisoned");
        let mut out: Vec<Feedback> = g
            .iter()
            .filter(|f| matches_window(f, start, end, user_id))
            .cloned()
            .collect();
        out.sort_by_key(|f| f.timestamp());
        Ok(out)
    }

    async fn save_adjustment(&self, adjustment: &Adjustment) -> Result<()> {
        self.before_call(true).await?;
        self.adjustments
            .lock()
            .expect("store mutex poisoned")
            .push(adjustment.clone());
        Ok(())
    }

    async fn save_metrics(&self, metrics: &Metrics) -> Result<()> {
        self.before_call(true).await?;
        self.metrics
            .lock()
            .expect("store mutex poisoned")
            .push(metrics.clone());
        Ok(())
    }
}
