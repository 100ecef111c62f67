//! Error taxonomy for the learning engine.
//!
//! Callers of the capture operations only ever observe
//! [`LearningError::ChannelDisabled`]. The persistence variants are produced
//! internally, logged, and swallowed by the engine.

use std::time::Duration;

use thiserror::Error;

use crate::feedback::FeedbackChannel;

#[derive(Error, Debug)]
pub enum LearningError {
    /// Feedback was submitted on a channel that is switched off in config.
    #[error("{0} feedback channel is disabled")]
    ChannelDisabled(FeedbackChannel),

    /// Any failure reported by the external store.
    #[error("persistence failure during {op}: {message}")]
    Persistence { op: &'static str, message: String },

    /// The external store did not answer within the configured bound.
    #[error("persistence timed out during {op} after {timeout:?}")]
    PersistenceTimeout { op: &'static str, timeout: Duration },

    /// A scheduler tick could not complete; the scheduler keeps running.
    #[error("periodic evaluation failed: {0}")]
    PeriodicEvaluation(String),
}

impl LearningError {
    pub fn is_channel_disabled(&self) -> bool {
        matches!(self, LearningError::ChannelDisabled(_))
    }
}
