//! # Adjustment Engine
//! Turns accumulated feedback for one decision into weight mutations.
//!
//! Policy: once a decision has at least `min_feedbacks` retained events, the
//! mean value decides the direction. Below `-0.3` every affected factor is
//! decreased by `learning_rate * 0.5` (and loses 10 confidence); above `0.3`
//! it is increased by `learning_rate * 0.3` (and gains 5). The band in
//! between is a dead zone. Penalties are deliberately larger than rewards.
//!
//! No I/O happens here. The caller holds the state lock while calling
//! [`AdjustmentEngine::evaluate`] and persists the returned outcome afterwards.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::feedback::Feedback;
use crate::history::FeedbackStore;
use crate::weights::{Weight, WeightRegistry};

pub const NEGATIVE_THRESHOLD: f64 = -0.3;
pub const POSITIVE_THRESHOLD: f64 = 0.3;
pub const PENALTY_COEFFICIENT: f64 = 0.5;
pub const REWARD_COEFFICIENT: f64 = 0.3;
pub const PENALTY_CONFIDENCE: f64 = 10.0;
pub const REWARD_CONFIDENCE: f64 = 5.0;

const ADJUSTMENT_LOG_CAP: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    WeightIncrease,
    WeightDecrease,
    ParameterChange,
    RuleModification,
}

/// Before/after capture; reserved, not filled by the weight policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentResult {
    pub before: serde_json::Value,
    pub after: serde_json::Value,
    pub impact: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adjustment {
    pub id: String,
    pub triggered_by: String,
    pub adjustment_type: AdjustmentType,
    pub affected: Vec<String>,
    pub magnitude: f64,
    pub reasoning: String,
    pub applied_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AdjustmentResult>,
}

/// Append-only record of applied adjustments (bounded, oldest dropped).
#[derive(Debug, Default)]
pub struct AdjustmentLog {
    entries: VecDeque<Adjustment>,
}

impl AdjustmentLog {
    pub fn push(&mut self, adj: Adjustment) {
        if self.entries.len() >= ADJUSTMENT_LOG_CAP {
            self.entries.pop_front();
        }
        self.entries.push_back(adj);
    }

    /// Most recent `limit` adjustments, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Adjustment> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn count_in_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
        self.entries
            .iter()
            .filter(|a| a.applied_at >= start && a.applied_at <= end)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Which factors a decision's feedback is allowed to move.
///
/// Every decision currently maps to the same configured set; nothing derives
/// the set from the decision itself.
#[derive(Debug, Clone, PartialEq)]
pub struct AffectedFactors {
    factors: Vec<String>,
}

impl Default for AffectedFactors {
    fn default() -> Self {
        Self::new(default_affected_factors())
    }
}

impl AffectedFactors {
    pub fn new(factors: Vec<String>) -> Self {
        Self { factors }
    }

    pub fn for_decision(&self, _feedback: &Feedback) -> &[String] {
        &self.factors
    }
}

pub fn default_affected_factors() -> Vec<String> {
    vec![
        "efficiency_weight".to_string(),
        "risk_weight".to_string(),
        "quality_weight".to_string(),
    ]
}

/// Tunables read from config at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustmentParams {
    pub learning_rate: f64,
    pub min_feedbacks: usize,
}

/// What an evaluation changed; persisted by the caller outside the lock.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentOutcome {
    pub adjustment: Adjustment,
    pub weights: Vec<Weight>,
}

#[derive(Debug, Clone, Default)]
pub struct AdjustmentEngine {
    affected: AffectedFactors,
}

impl AdjustmentEngine {
    pub fn new(affected: AffectedFactors) -> Self {
        Self { affected }
    }

    pub fn set_affected(&mut self, affected: AffectedFactors) {
        self.affected = affected;
    }

    /// Evaluate the decision `feedback` belongs to and mutate state if sentiment
    /// leaves the dead zone.
    pub fn evaluate(
        &self,
        feedback: &Feedback,
        history: &FeedbackStore,
        registry: &mut WeightRegistry,
        log: &mut AdjustmentLog,
        params: AdjustmentParams,
        now: DateTime<Utc>,
    ) -> Option<AdjustmentOutcome> {
        let related = history.by_decision(&feedback.decision_id);
        if related.len() < params.min_feedbacks.max(1) {
            debug!(
                target: "learning",
                decision_id = %feedback.decision_id,
                count = related.len(),
                required = params.min_feedbacks,
                "not enough feedback for adjustment"
            );
            return None;
        }

        let avg = mean_value(&related);
        let (kind, magnitude, confidence_delta) = if avg < NEGATIVE_THRESHOLD {
            (
                AdjustmentType::WeightDecrease,
                params.learning_rate * PENALTY_COEFFICIENT,
                PENALTY_CONFIDENCE,
            )
        } else if avg > POSITIVE_THRESHOLD {
            (
                AdjustmentType::WeightIncrease,
                params.learning_rate * REWARD_COEFFICIENT,
                REWARD_CONFIDENCE,
            )
        } else {
            debug!(
                target: "learning",
                decision_id = %feedback.decision_id,
                avg,
                "sentiment inside dead zone"
            );
            return None;
        };

        let factors = self.affected.for_decision(feedback).to_vec();
        let mut weights = Vec::with_capacity(factors.len());
        for f in &factors {
            let updated = match kind {
                AdjustmentType::WeightDecrease => {
                    registry.decrease(f, magnitude, confidence_delta, now)
                }
                _ => registry.increase(f, magnitude, confidence_delta, now),
            };
            match updated {
                Some(w) => weights.push(w),
                None => debug!(target: "learning", factor = %f, "affected factor not registered"),
            }
        }

        let reasoning = match kind {
            AdjustmentType::WeightDecrease => format!(
                "Negative feedback pattern detected (avg: {avg:.2}) over {} events",
                related.len()
            ),
            _ => format!(
                "Positive feedback pattern detected (avg: {avg:.2}) over {} events",
                related.len()
            ),
        };

        let adjustment = Adjustment {
            id: format!("adj_{}", Uuid::new_v4().simple()),
            triggered_by: related[0].id.clone(),
            adjustment_type: kind,
            affected: factors,
            magnitude,
            reasoning,
            applied_at: now,
            result: None,
        };
        log.push(adjustment.clone());

        info!(
            target: "learning",
            decision_id = %feedback.decision_id,
            avg,
            magnitude,
            kind = ?kind,
            "weights adjusted"
        );

        Some(AdjustmentOutcome {
            adjustment,
            weights,
        })
    }
}

fn mean_value(items: &[Feedback]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    items.iter().map(|f| f.value).sum::<f64>() / items.len() as f64
}
