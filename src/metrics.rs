//! # Learning Metrics
//! Windowed summary statistics over feedback, weights, and the adjustment log.
//!
//! The computation is pure: [`compute`] takes an already-selected,
//! chronologically ordered feedback set and the current-state aggregates.
//! Source selection (in-memory window first, store fallback when empty) is
//! done by [`crate::engine::FeedbackLearner`] so no lock is held across I/O.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::feedback::Feedback;

/// Default lookback when no explicit window is given.
pub const DEFAULT_WINDOW_DAYS: i64 = 7;
/// Size of the "first" and "last" samples compared by the improvement trend.
pub const TREND_SAMPLE: usize = 10;
/// Target number of buckets for the over-time series.
pub const TIME_BUCKETS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    /// Fill missing bounds: `end` defaults to `now`, `start` to `end - 7d`.
    pub fn resolve(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let end = end.unwrap_or(now);
        let start = start.unwrap_or(end - Duration::days(DEFAULT_WINDOW_DAYS));
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub total_feedbacks: usize,
    pub approval_rate: f64,
    pub rejection_rate: f64,
    pub adjustments_made: usize,
    pub average_confidence: f64,
    pub improvement_trend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyPoint {
    pub timestamp: DateTime<Utc>,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivenessPoint {
    pub timestamp: DateTime<Utc>,
    pub effectiveness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub period: Period,
    pub summary: MetricsSummary,
    pub accuracy_over_time: Vec<AccuracyPoint>,
    pub effectiveness_over_time: Vec<EffectivenessPoint>,
}

/// Everything [`compute`] needs, gathered by the caller.
#[derive(Debug, Clone)]
pub struct MetricsInput {
    pub user_id: Option<String>,
    pub period: Period,
    /// Filtered feedback; ordered here by timestamp before use.
    pub feedback: Vec<Feedback>,
    pub adjustments_made: usize,
    /// Mean confidence over all current weights (not windowed).
    pub average_confidence: f64,
}

pub fn compute(input: MetricsInput) -> Metrics {
    let MetricsInput {
        user_id,
        period,
        mut feedback,
        adjustments_made,
        average_confidence,
    } = input;
    // stable: equal timestamps keep insertion order
    feedback.sort_by_key(|f| f.timestamp());

    let total = feedback.len();
    let (approval_rate, rejection_rate) = if total == 0 {
        (0.0, 0.0)
    } else {
        let pos = feedback.iter().filter(|f| f.is_positive()).count();
        let neg = feedback.iter().filter(|f| f.is_negative()).count();
        (
            100.0 * pos as f64 / total as f64,
            100.0 * neg as f64 / total as f64,
        )
    };

    let accuracy_over_time = accuracy_over_time(&feedback);
    let effectiveness_over_time = accuracy_over_time
        .iter()
        .map(|p| EffectivenessPoint {
            timestamp: p.timestamp,
            effectiveness: p.accuracy,
        })
        .collect();

    Metrics {
        user_id,
        period,
        summary: MetricsSummary {
            total_feedbacks: total,
            approval_rate,
            rejection_rate,
            adjustments_made,
            average_confidence,
            improvement_trend: improvement_trend(&feedback),
        },
        accuracy_over_time,
        effectiveness_over_time,
    }
}

/// `100 * (recent - old) / max(0.01, old)` where `recent`/`old` are the positive
/// fractions of the last/first [`TREND_SAMPLE`] entries. With fewer than
/// `2 * TREND_SAMPLE` entries the two samples overlap.
pub fn improvement_trend(sorted: &[Feedback]) -> f64 {
    let n = sorted.len();
    let old = &sorted[..n.min(TREND_SAMPLE)];
    let recent = &sorted[n.saturating_sub(TREND_SAMPLE)..];
    let old_frac = positive_fraction(old);
    let recent_frac = positive_fraction(recent);
    100.0 * (recent_frac - old_frac) / old_frac.max(0.01)
}

/// Split into ~[`TIME_BUCKETS`] equal chunks; one point per non-empty chunk,
/// stamped with the chunk's last entry.
pub fn accuracy_over_time(sorted: &[Feedback]) -> Vec<AccuracyPoint> {
    if sorted.is_empty() {
        return Vec::new();
    }
    let chunk = sorted.len().div_ceil(TIME_BUCKETS);
    sorted
        .chunks(chunk)
        .filter_map(|c| {
            let last = c.last()?;
            Some(AccuracyPoint {
                timestamp: last.timestamp(),
                accuracy: 100.0 * positive_fraction(c),
            })
        })
        .collect()
}

fn positive_fraction(items: &[Feedback]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    items.iter().filter(|f| f.is_positive()).count() as f64 / items.len() as f64
}

/// Last computed metrics per user; `None` is the global entry.
#[derive(Debug, Default)]
pub struct MetricsCache {
    by_user: HashMap<Option<String>, Metrics>,
}

impl MetricsCache {
    pub fn put(&mut self, m: Metrics) {
        self.by_user.insert(m.user_id.clone(), m);
    }

    pub fn get(&self, user_id: Option<&str>) -> Option<Metrics> {
        self.by_user.get(&user_id.map(str::to_string)).cloned()
    }
}
