// src/lib.rs
// Public library surface for the host application and integration tests.

pub mod adjustment;
pub mod api;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod history;
pub mod metrics;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod weights;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::{ConfigPatch, LearningConfig};
pub use crate::engine::FeedbackLearner;
pub use crate::error::LearningError;
pub use crate::feedback::{BehaviorData, ContextInput, ExplicitKind, Feedback, FeedbackType};
pub use crate::metrics::Metrics;
pub use crate::store::{JsonFileStore, MemoryStore, PersistentStore};
pub use crate::weights::Weight;
