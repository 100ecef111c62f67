//! Feedback learner service: binary entrypoint.
//! Boots the Axum HTTP server over a file-backed learning engine.

use std::sync::Arc;

use feedback_learner::{config, telemetry::Telemetry, FeedbackLearner, JsonFileStore};
use shuttle_axum::ShuttleAxum;

const ENV_STORE_DIR: &str = "LEARNING_STORE_DIR";
const DEFAULT_STORE_DIR: &str = "state/learning";

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    feedback_learner::telemetry::init_tracing();

    let cfg = config::load_default()?;
    let dir = std::env::var(ENV_STORE_DIR).unwrap_or_else(|_| DEFAULT_STORE_DIR.to_string());
    let store = Arc::new(JsonFileStore::new(dir));

    let learner = FeedbackLearner::with_system_clock(cfg, store);
    learner.initialize().await;

    // Flush weights when the process is asked to stop.
    let on_exit = learner.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_exit.shutdown().await;
        }
    });

    let mut router = feedback_learner::router(learner);
    match Telemetry::install() {
        Ok(t) => router = router.merge(t.router()),
        Err(e) => tracing::warn!(error = %e, "prometheus recorder not installed"),
    }

    Ok(router.into())
}
