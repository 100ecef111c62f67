//! Bounded in-memory feedback history.
//!
//! Oldest entries are evicted first once `cap` is reached. Queries only see
//! what is still in the window; evicted feedback is invisible to adjustment
//! evaluation, which keeps sentiment biased towards recent events.
//!
//! The buffer itself is not synchronised; [`crate::engine::FeedbackLearner`]
//! keeps it behind the same lock as the weight registry.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::feedback::Feedback;

pub const DEFAULT_FEEDBACK_CAPACITY: usize = 1000;

#[derive(Debug)]
pub struct FeedbackStore {
    buf: VecDeque<Feedback>,
    cap: usize,
}

impl Default for FeedbackStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_FEEDBACK_CAPACITY)
    }
}

impl FeedbackStore {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            buf: VecDeque::with_capacity(cap.min(10_000)),
            cap,
        }
    }

    /// Append and evict the oldest entry when full. Returns the evicted one, if any.
    pub fn append(&mut self, fb: Feedback) -> Option<Feedback> {
        let evicted = if self.buf.len() >= self.cap {
            self.buf.pop_front()
        } else {
            None
        };
        self.buf.push_back(fb);
        evicted
    }

    /// All retained feedback for `decision_id`, oldest first.
    pub fn by_decision(&self, decision_id: &str) -> Vec<Feedback> {
        self.buf
            .iter()
            .filter(|f| f.decision_id == decision_id)
            .cloned()
            .collect()
    }

    /// Feedback with `start <= timestamp <= end`, optionally restricted to one user.
    pub fn in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> Vec<Feedback> {
        self.buf
            .iter()
            .filter(|f| {
                let ts = f.timestamp();
                ts >= start && ts <= end && user_id.map_or(true, |u| f.user_id == u)
            })
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

}
