//! # Decision Weights
//!
//! Registry of named decision factors (e.g. `risk_weight`) and their current
//! trust level in `[0.0, 1.0]` plus a confidence score in `[0, 100]`.
//!
//! - Seeded from the store on start, or from [`default_seed`] when the store is empty.
//! - Every mutation clamps; no sequence of increases/decreases escapes the bounds.
//! - The registry is the only mutator of weight state. It never does I/O; callers
//!   persist the returned snapshots after releasing their lock.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIDENCE: f64 = 70.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Weight {
    pub factor: String,
    pub category: String,
    pub current_weight: f64,
    /// Baseline captured when the factor was first created; never mutated.
    pub historical_weight: f64,
    pub adjustment_count: u32,
    pub last_adjusted: DateTime<Utc>,
    pub confidence: f64,
}

impl Weight {
    pub fn new(
        factor: impl Into<String>,
        category: impl Into<String>,
        weight: f64,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> Self {
        let w = clamp01(weight);
        Self {
            factor: factor.into(),
            category: category.into(),
            current_weight: w,
            historical_weight: w,
            adjustment_count: 0,
            last_adjusted: now,
            confidence: clamp_confidence(confidence),
        }
    }
}

/// Built-in factors used when the store has nothing persisted.
pub fn default_seed(now: DateTime<Utc>) -> Vec<Weight> {
    [
        ("efficiency_weight", "performance", 0.3),
        ("risk_weight", "safety", 0.4),
        ("quality_weight", "quality", 0.3),
    ]
    .into_iter()
    .map(|(f, c, w)| Weight::new(f, c, w, DEFAULT_CONFIDENCE, now))
    .collect()
}

/// Factor name → weight record.
#[derive(Debug, Default, Clone)]
pub struct WeightRegistry {
    weights: BTreeMap<String, Weight>,
}

impl WeightRegistry {
    /// Build from persisted records. Out-of-range values are clamped on load.
    pub fn from_loaded(loaded: Vec<Weight>) -> Self {
        let mut weights = BTreeMap::new();
        for mut w in loaded {
            w.current_weight = clamp01(w.current_weight);
            w.confidence = clamp_confidence(w.confidence);
            weights.insert(w.factor.clone(), w);
        }
        Self { weights }
    }

    pub fn with_defaults(now: DateTime<Utc>) -> Self {
        Self::from_loaded(default_seed(now))
    }

    /// `current = max(0, current - delta)`, `confidence = max(0, confidence - confidence_delta)`.
    /// Returns the updated snapshot, or `None` for an unknown factor.
    pub fn decrease(
        &mut self,
        factor: &str,
        delta: f64,
        confidence_delta: f64,
        now: DateTime<Utc>,
    ) -> Option<Weight> {
        self.apply(factor, -delta, -confidence_delta, now)
    }

    /// Symmetric to [`WeightRegistry::decrease`] with upper clamps `1` and `100`.
    pub fn increase(
        &mut self,
        factor: &str,
        delta: f64,
        confidence_delta: f64,
        now: DateTime<Utc>,
    ) -> Option<Weight> {
        self.apply(factor, delta, confidence_delta, now)
    }

    fn apply(
        &mut self,
        factor: &str,
        delta: f64,
        confidence_delta: f64,
        now: DateTime<Utc>,
    ) -> Option<Weight> {
        let w = self.weights.get_mut(factor)?;
        w.current_weight = clamp01(w.current_weight + delta);
        w.confidence = clamp_confidence(w.confidence + confidence_delta);
        w.adjustment_count = w.adjustment_count.saturating_add(1);
        w.last_adjusted = now;
        Some(w.clone())
    }

    pub fn get(&self, factor: &str) -> Option<Weight> {
        self.weights.get(factor).cloned()
    }

    /// Snapshot ordered by factor name.
    pub fn all(&self) -> Vec<Weight> {
        self.weights.values().cloned().collect()
    }

    /// Mean confidence across all current weights, `0` when empty.
    pub fn average_confidence(&self) -> f64 {
        if self.weights.is_empty() {
            return 0.0;
        }
        self.weights.values().map(|w| w.confidence).sum::<f64>() / self.weights.len() as f64
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Clamp to [0.0, 1.0]. NaN collapses to 0.
fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

fn clamp_confidence(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 100.0)
    }
}
