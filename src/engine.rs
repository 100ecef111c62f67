//! # Learning Engine
//! Host-owned facade over the feedback history, weight registry, adjustment
//! log, metrics, and evaluation scheduler.
//!
//! Lock discipline:
//! - One coarse `Mutex` guards history + registry + adjustment log. Appending
//!   feedback and evaluating its decision happen under a single acquisition, so
//!   two concurrent captures for the same decision can never both act on a
//!   stale average.
//! - Store calls are made only after the guard is dropped, each bounded by
//!   `persist_timeout_ms`. Failures are logged and swallowed; in-memory state
//!   is never rolled back.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use crate::adjustment::{
    Adjustment, AdjustmentEngine, AdjustmentLog, AdjustmentParams, AdjustmentType, AffectedFactors,
};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigPatch, LearningConfig};
use crate::error::LearningError;
use crate::feedback::{BehaviorData, ContextInput, ExplicitKind, Feedback, FeedbackChannel};
use crate::history::{FeedbackStore, DEFAULT_FEEDBACK_CAPACITY};
use crate::metrics::{self as learning_metrics, Metrics, MetricsCache, MetricsInput, Period};
use crate::scheduler::{PeriodicTask, Scheduler};
use crate::store::PersistentStore;
use crate::telemetry::{
    ensure_metrics_described, EVALUATION_TICKS, FEEDBACK_CAPTURED, FEEDBACK_REJECTED,
    IMPROVEMENT_TREND, PERSISTENCE_FAILURES, WEIGHT_ADJUSTMENTS,
};
use crate::weights::{default_seed, Weight, WeightRegistry};

pub const DEFAULT_ADJUSTMENT_HISTORY_LIMIT: usize = 50;
/// Trend (in percent) beyond which a periodic evaluation is worth logging.
pub const SIGNIFICANT_TREND: f64 = 10.0;

#[derive(Debug, Default)]
struct LearningState {
    history: FeedbackStore,
    registry: WeightRegistry,
    adjustments: AdjustmentLog,
    adjuster: AdjustmentEngine,
}

struct Shared {
    state: Mutex<LearningState>,
    config: RwLock<LearningConfig>,
    cache: Mutex<MetricsCache>,
    store: Arc<dyn PersistentStore>,
    clock: Arc<dyn Clock>,
    initialized: AtomicBool,
    /// Set when weights could not be loaded and the registry holds untouched
    /// defaults; cleared by the first applied adjustment.
    unloaded_defaults: AtomicBool,
}

impl Shared {
    fn config(&self) -> LearningConfig {
        self.config.read().expect("config lock poisoned").clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, LearningState> {
        self.state.lock().expect("learning state mutex poisoned")
    }

    async fn with_timeout<T, F>(
        &self,
        op: &'static str,
        timeout: Duration,
        fut: F,
    ) -> Result<T, LearningError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(LearningError::Persistence {
                op,
                message: format!("{e:#}"),
            }),
            Err(_) => Err(LearningError::PersistenceTimeout { op, timeout }),
        }
    }

    /// Best-effort write: failures are logged and counted, never returned.
    async fn persist<F>(&self, op: &'static str, timeout: Duration, fut: F)
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        if let Err(e) = self.with_timeout(op, timeout, fut).await {
            warn!(target: "learning", op, error = %e, "persistence failed; in-memory state kept");
            counter!(PERSISTENCE_FAILURES, "op" => op).increment(1);
        }
    }

    async fn ingest(&self, fb: &Feedback, cfg: &LearningConfig) {
        let now = self.clock.now();
        let outcome = {
            let mut guard = self.lock_state();
            let st = &mut *guard;
            st.history.append(fb.clone());
            if cfg.auto_adjust_enabled {
                st.adjuster.evaluate(
                    fb,
                    &st.history,
                    &mut st.registry,
                    &mut st.adjustments,
                    AdjustmentParams {
                        learning_rate: cfg.learning_rate,
                        min_feedbacks: cfg.min_feedbacks_for_adjustment,
                    },
                    now,
                )
            } else {
                None
            }
        };

        if outcome.is_some() {
            self.unloaded_defaults.store(false, Ordering::SeqCst);
        }

        let channel = if fb.explicit { "explicit" } else { "implicit" };
        counter!(FEEDBACK_CAPTURED, "channel" => channel).increment(1);
        if let Some(out) = &outcome {
            let direction = match out.adjustment.adjustment_type {
                AdjustmentType::WeightDecrease => "decrease",
                _ => "increase",
            };
            counter!(WEIGHT_ADJUSTMENTS, "direction" => direction).increment(1);
        }

        if !cfg.persistence_enabled {
            return;
        }
        let timeout = cfg.persist_timeout();
        self.persist("save_feedback", timeout, self.store.save_feedback(fb))
            .await;
        if let Some(out) = outcome {
            for w in &out.weights {
                self.persist("save_weight", timeout, self.store.save_weight(w))
                    .await;
            }
            self.persist(
                "save_adjustment",
                timeout,
                self.store.save_adjustment(&out.adjustment),
            )
            .await;
        }
    }

    /// Window-then-fallback selection shared by ticks and on-demand metrics.
    /// In-memory feedback is read under the state lock; the store is queried
    /// only when memory has nothing for the window (older rows may have been
    /// evicted). A failed fallback leaves the selection empty and is returned
    /// next to it.
    async fn select_input(
        &self,
        user_id: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> (MetricsInput, Option<LearningError>) {
        let period = Period::resolve(start, end, self.clock.now());
        let mut input = {
            let st = self.lock_state();
            MetricsInput {
                user_id: user_id.map(str::to_string),
                period,
                feedback: st.history.in_window(period.start, period.end, user_id),
                adjustments_made: st.adjustments.count_in_window(period.start, period.end),
                average_confidence: st.registry.average_confidence(),
            }
        };
        if !input.feedback.is_empty() {
            return (input, None);
        }
        let timeout = self.config().persist_timeout();
        match self
            .with_timeout(
                "query_feedback",
                timeout,
                self.store.query_feedback(period.start, period.end, user_id),
            )
            .await
        {
            Ok(v) => {
                input.feedback = v;
                (input, None)
            }
            Err(e) => (input, Some(e)),
        }
    }

    fn finish(&self, input: MetricsInput) -> Metrics {
        let m = learning_metrics::compute(input);
        self.cache
            .lock()
            .expect("metrics cache mutex poisoned")
            .put(m.clone());
        m
    }

    /// Strict variant: a failed store fallback is an error.
    async fn compute_metrics(
        &self,
        user_id: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Metrics, LearningError> {
        match self.select_input(user_id, start, end).await {
            (input, None) => Ok(self.finish(input)),
            (_, Some(e)) => Err(e),
        }
    }
}

#[async_trait::async_trait]
impl PeriodicTask for Shared {
    async fn tick(&self) -> Result<(), LearningError> {
        let cfg = self.config();
        if !cfg.enabled {
            debug!(target: "learning", "learning disabled; skipping evaluation tick");
            return Ok(());
        }
        counter!(EVALUATION_TICKS).increment(1);

        let m = self
            .compute_metrics(None, None, None)
            .await
            .map_err(|e| LearningError::PeriodicEvaluation(e.to_string()))?;

        let trend = m.summary.improvement_trend;
        gauge!(IMPROVEMENT_TREND).set(trend);
        if trend > SIGNIFICANT_TREND {
            info!(target: "learning", trend, total = m.summary.total_feedbacks, "decision quality improving");
        } else if trend < -SIGNIFICANT_TREND {
            warn!(target: "learning", trend, total = m.summary.total_feedbacks, "decision quality declining");
        }

        if cfg.persistence_enabled {
            self.persist("save_metrics", cfg.persist_timeout(), self.store.save_metrics(&m))
                .await;
        }
        Ok(())
    }
}

/// The learning subsystem. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct FeedbackLearner {
    shared: Arc<Shared>,
    scheduler: Arc<Scheduler>,
}

impl FeedbackLearner {
    pub fn new(
        config: LearningConfig,
        store: Arc<dyn PersistentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        ensure_metrics_described();
        let config = config.sanitized();
        let state = LearningState {
            adjuster: AdjustmentEngine::new(AffectedFactors::new(config.affected_factors.clone())),
            ..LearningState::default()
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                config: RwLock::new(config),
                cache: Mutex::new(MetricsCache::default()),
                store,
                clock,
                initialized: AtomicBool::new(false),
                unloaded_defaults: AtomicBool::new(false),
            }),
            scheduler: Arc::new(Scheduler::new()),
        }
    }

    pub fn with_system_clock(config: LearningConfig, store: Arc<dyn PersistentStore>) -> Self {
        Self::new(config, store, Arc::new(SystemClock))
    }

    /// Load weights (seeding defaults when the store has none), warm the
    /// feedback history, and start the evaluation scheduler.
    pub async fn initialize(&self) {
        if self.shared.initialized.swap(true, Ordering::SeqCst) {
            debug!(target: "learning", "initialize called twice; ignoring");
            return;
        }
        let cfg = self.shared.config();
        let timeout = cfg.persist_timeout();
        let now = self.shared.clock.now();

        // Defaults are persisted only when the store answered with nothing;
        // after a failed read they stay in memory so learned rows survive.
        let (registry, persist_defaults) = match self
            .shared
            .with_timeout("load_weights", timeout, self.shared.store.load_weights())
            .await
        {
            Ok(v) if v.is_empty() => (default_seed(now), true),
            Ok(v) => (v, false),
            Err(e) => {
                warn!(target: "learning", error = %e, "loading weights failed; using defaults in memory only");
                self.shared.unloaded_defaults.store(true, Ordering::SeqCst);
                (default_seed(now), false)
            }
        };

        let recent = match self
            .shared
            .with_timeout(
                "load_recent_feedback",
                timeout,
                self.shared
                    .store
                    .load_recent_feedback(DEFAULT_FEEDBACK_CAPACITY),
            )
            .await
        {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "learning", error = %e, "loading recent feedback failed");
                Vec::new()
            }
        };

        let (weight_count, feedback_count) = {
            let mut st = self.shared.lock_state();
            st.registry = WeightRegistry::from_loaded(registry);
            for fb in recent {
                st.history.append(fb);
            }
            (st.registry.len(), st.history.len())
        };

        if persist_defaults && cfg.persistence_enabled {
            for w in self.get_all_weights() {
                self.shared
                    .persist("save_weight", timeout, self.shared.store.save_weight(&w))
                    .await;
            }
        }

        info!(
            target: "learning",
            weights = weight_count,
            feedback = feedback_count,
            "learning engine initialized"
        );

        self.scheduler
            .start(self.periodic_task(), cfg.evaluation_interval())
            .await;
    }

    /// Stop the scheduler (waiting for an in-flight tick), then flush every weight.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        let cfg = self.shared.config();
        if self.shared.unloaded_defaults.load(Ordering::SeqCst) {
            warn!(target: "learning", "weights were never loaded or adjusted; skipping shutdown flush");
        } else if cfg.persistence_enabled {
            let weights = self.get_all_weights();
            let timeout = cfg.persist_timeout();
            for w in &weights {
                self.shared
                    .persist("save_weight", timeout, self.shared.store.save_weight(w))
                    .await;
            }
            info!(target: "learning", count = weights.len(), "weights flushed on shutdown");
        }
        self.shared.initialized.store(false, Ordering::SeqCst);
    }

    pub async fn capture_explicit_feedback(
        &self,
        user_id: &str,
        decision_id: &str,
        kind: ExplicitKind,
        comment: Option<String>,
        context: Option<ContextInput>,
    ) -> Result<Feedback, LearningError> {
        let cfg = self.shared.config();
        if !cfg.enabled || !cfg.explicit_feedback_enabled {
            return Err(self.reject(FeedbackChannel::Explicit));
        }
        let fb = Feedback::explicit(
            user_id,
            decision_id,
            kind,
            comment,
            context,
            self.shared.clock.now(),
        );
        debug!(target: "learning", decision_id, kind = ?fb.kind, "explicit feedback captured");
        self.shared.ingest(&fb, &cfg).await;
        Ok(fb)
    }

    pub async fn capture_implicit_feedback(
        &self,
        user_id: &str,
        decision_id: &str,
        behavior: BehaviorData,
        context: Option<ContextInput>,
    ) -> Result<Feedback, LearningError> {
        let cfg = self.shared.config();
        if !cfg.enabled || !cfg.implicit_feedback_enabled {
            return Err(self.reject(FeedbackChannel::Implicit));
        }
        let fb = Feedback::implicit(
            user_id,
            decision_id,
            &behavior,
            context,
            self.shared.clock.now(),
        );
        debug!(target: "learning", decision_id, value = fb.value, "implicit feedback captured");
        self.shared.ingest(&fb, &cfg).await;
        Ok(fb)
    }

    fn reject(&self, channel: FeedbackChannel) -> LearningError {
        let label = match channel {
            FeedbackChannel::Explicit => "explicit",
            FeedbackChannel::Implicit => "implicit",
        };
        counter!(FEEDBACK_REJECTED, "channel" => label).increment(1);
        LearningError::ChannelDisabled(channel)
    }

    /// Windowed metrics; the window defaults to the last seven days.
    /// A failing store fallback is logged and treated as "no feedback".
    pub async fn calculate_metrics(
        &self,
        user_id: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Metrics {
        let (input, err) = self.shared.select_input(user_id, start, end).await;
        if let Some(e) = err {
            warn!(target: "learning", error = %e, "metrics store fallback failed");
        }
        self.shared.finish(input)
    }

    /// Last metrics computed for `user_id` (`None` = global), if any.
    pub fn cached_metrics(&self, user_id: Option<&str>) -> Option<Metrics> {
        self.shared
            .cache
            .lock()
            .expect("metrics cache mutex poisoned")
            .get(user_id)
    }

    pub fn get_decision_weight(&self, factor: &str) -> Option<Weight> {
        self.shared.lock_state().registry.get(factor)
    }

    pub fn get_all_weights(&self) -> Vec<Weight> {
        self.shared.lock_state().registry.all()
    }

    /// Newest first.
    pub fn get_adjustment_history(&self, limit: usize) -> Vec<Adjustment> {
        self.shared.lock_state().adjustments.recent(limit)
    }

    /// Apply a partial update. A changed evaluation interval restarts the scheduler.
    pub async fn update_config(&self, patch: ConfigPatch) -> LearningConfig {
        let (cfg, change) = {
            let mut g = self.shared.config.write().expect("config lock poisoned");
            let change = g.apply(patch);
            (g.clone(), change)
        };
        if change.factors_changed {
            self.shared
                .lock_state()
                .adjuster
                .set_affected(AffectedFactors::new(cfg.affected_factors.clone()));
        }
        if change.interval_changed {
            self.scheduler
                .restart_if_running(self.periodic_task(), cfg.evaluation_interval())
                .await;
        }
        info!(target: "learning", ?change, "configuration updated");
        cfg
    }

    pub fn get_config(&self) -> LearningConfig {
        self.shared.config()
    }

    pub async fn is_scheduler_running(&self) -> bool {
        self.scheduler.is_running().await
    }

    pub async fn scheduler_period(&self) -> Option<Duration> {
        self.scheduler.period().await
    }

    /// Number of feedback events currently retained in memory.
    pub fn retained_feedback(&self) -> usize {
        self.shared.lock_state().history.len()
    }

    fn periodic_task(&self) -> Arc<dyn PeriodicTask> {
        self.shared.clone()
    }
}
