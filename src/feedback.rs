//! # Feedback
//! Data model for operator feedback and the normalisation rules that turn an
//! explicit rating or an observed behaviour into a scalar in `[-1.0, 1.0]`.
//!
//! Everything here is pure; appending to history, persisting, and triggering
//! adjustments is done by [`crate::engine::FeedbackLearner`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which capture path produced a feedback event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackChannel {
    Explicit,
    Implicit,
}

impl fmt::Display for FeedbackChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackChannel::Explicit => f.write_str("explicit"),
            FeedbackChannel::Implicit => f.write_str("implicit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Approval,
    Rejection,
    Modification,
    Implicit,
}

/// The subset of [`FeedbackType`] an operator can submit explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplicitKind {
    Approval,
    Rejection,
    Modification,
}

impl From<ExplicitKind> for FeedbackType {
    fn from(k: ExplicitKind) -> Self {
        match k {
            ExplicitKind::Approval => FeedbackType::Approval,
            ExplicitKind::Rejection => FeedbackType::Rejection,
            ExplicitKind::Modification => FeedbackType::Modification,
        }
    }
}

/// Where and when the feedback was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackContext {
    pub screen: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_id: Option<String>,
}

/// Optional caller-supplied context; the timestamp is always stamped by the engine clock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextInput {
    #[serde(default)]
    pub screen: Option<String>,
    #[serde(default)]
    pub mission_id: Option<String>,
}

/// Observed operator behaviour used to infer implicit sentiment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorData {
    #[serde(default)]
    pub time_to_decision: Option<u64>,
    #[serde(default)]
    pub modifications_count: Option<u32>,
    #[serde(default)]
    pub alternative_chosen: Option<bool>,
    #[serde(default)]
    pub task_completed: Option<bool>,
    #[serde(default)]
    pub error_occurred: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: String,
    pub user_id: String,
    pub decision_id: String,
    #[serde(rename = "type")]
    pub kind: FeedbackType,
    pub explicit: bool,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub context: FeedbackContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Feedback {
    /// Build an explicit rating. Value follows [`explicit_value`].
    pub fn explicit(
        user_id: impl Into<String>,
        decision_id: impl Into<String>,
        kind: ExplicitKind,
        comment: Option<String>,
        context: Option<ContextInput>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_feedback_id(),
            user_id: user_id.into(),
            decision_id: decision_id.into(),
            kind: kind.into(),
            explicit: true,
            value: explicit_value(kind),
            comment,
            context: stamp_context(context, now),
            metadata: None,
        }
    }

    /// Build an implicit signal. The raw behaviour is kept as metadata.
    pub fn implicit(
        user_id: impl Into<String>,
        decision_id: impl Into<String>,
        behavior: &BehaviorData,
        context: Option<ContextInput>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_feedback_id(),
            user_id: user_id.into(),
            decision_id: decision_id.into(),
            kind: FeedbackType::Implicit,
            explicit: false,
            value: implicit_value(behavior),
            comment: None,
            context: stamp_context(context, now),
            metadata: serde_json::to_value(behavior).ok(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.context.timestamp
    }

    pub fn is_positive(&self) -> bool {
        self.value > 0.0
    }

    pub fn is_negative(&self) -> bool {
        self.value < 0.0
    }
}

/// `approval → 1`, `rejection → -1`, `modification → 0`.
pub fn explicit_value(kind: ExplicitKind) -> f64 {
    match kind {
        ExplicitKind::Approval => 1.0,
        ExplicitKind::Rejection => -1.0,
        ExplicitKind::Modification => 0.0,
    }
}

/// First matching rule wins; signals are never summed.
pub fn implicit_value(b: &BehaviorData) -> f64 {
    let completed = b.task_completed.unwrap_or(false);
    let errored = b.error_occurred.unwrap_or(false);

    if completed && !errored {
        0.7
    } else if errored {
        -0.7
    } else if b.alternative_chosen.unwrap_or(false) {
        -0.5
    } else if b.modifications_count.unwrap_or(0) > 2 {
        -0.3
    } else {
        0.0
    }
}

fn stamp_context(input: Option<ContextInput>, now: DateTime<Utc>) -> FeedbackContext {
    let input = input.unwrap_or_default();
    FeedbackContext {
        screen: input.screen.unwrap_or_else(|| "unknown".to_string()),
        timestamp: now,
        mission_id: input.mission_id,
    }
}

fn new_feedback_id() -> String {
    format!("fb_{}", Uuid::new_v4().simple())
}
