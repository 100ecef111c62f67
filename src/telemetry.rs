//! Process-level observability: tracing subscriber and Prometheus exporter.
//!
//! Counters are emitted through the `metrics` facade everywhere; without an
//! installed recorder (e.g. in tests) they are no-ops.

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const FEEDBACK_CAPTURED: &str = "feedback_captured_total";
pub const FEEDBACK_REJECTED: &str = "feedback_rejected_total";
pub const WEIGHT_ADJUSTMENTS: &str = "weight_adjustments_total";
pub const PERSISTENCE_FAILURES: &str = "persistence_failures_total";
pub const EVALUATION_TICKS: &str = "evaluation_ticks_total";
pub const IMPROVEMENT_TREND: &str = "learning_improvement_trend";

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(FEEDBACK_CAPTURED, "Feedback events accepted, by channel.");
        describe_counter!(
            FEEDBACK_REJECTED,
            "Feedback refused because its channel is disabled."
        );
        describe_counter!(WEIGHT_ADJUSTMENTS, "Adjustments applied, by direction.");
        describe_counter!(
            PERSISTENCE_FAILURES,
            "Store writes that failed or timed out, by operation."
        );
        describe_counter!(EVALUATION_TICKS, "Periodic evaluation ticks run.");
        describe_gauge!(
            IMPROVEMENT_TREND,
            "Improvement trend from the last periodic evaluation."
        );
    });
}

pub struct Telemetry {
    pub handle: PrometheusHandle,
}

impl Telemetry {
    /// Install the Prometheus recorder. Fails if a recorder is already set.
    pub fn install() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// Install the global tracing subscriber.
/// `RUST_LOG` overrides the default filter; `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("feedback_learner=info,learning=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
