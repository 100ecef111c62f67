// src/store/mod.rs
//! External persistence seam.
//!
//! The engine treats the store as best-effort: in-memory state is
//! authoritative for reads, and write failures are logged, never surfaced.

pub mod file;
pub mod memory;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::adjustment::Adjustment;
use crate::feedback::Feedback;
use crate::metrics::Metrics;
use crate::weights::Weight;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

#[async_trait::async_trait]
pub trait PersistentStore: Send + Sync {
    async fn load_weights(&self) -> Result<Vec<Weight>>;
    async fn save_weight(&self, weight: &Weight) -> Result<()>;

    /// Most recent `limit` feedback events, oldest first.
    async fn load_recent_feedback(&self, limit: usize) -> Result<Vec<Feedback>>;
    async fn save_feedback(&self, feedback: &Feedback) -> Result<()>;

    /// Feedback with `start <= timestamp <= end`. `None` means no user filter.
    async fn query_feedback(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> Result<Vec<Feedback>>;

    async fn save_adjustment(&self, adjustment: &Adjustment) -> Result<()>;
    async fn save_metrics(&self, metrics: &Metrics) -> Result<()>;
}

/// Shared filter used by store implementations for windowed queries.
pub(crate) fn matches_window(
    fb: &Feedback,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    user_id: Option<&str>,
) -> bool {
    let ts = fb.timestamp();
    ts >= start && ts <= end && user_id.map_or(true, |u| fb.user_id == u)
}
