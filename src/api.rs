//! HTTP surface over [`FeedbackLearner`]. Thin glue: every handler maps
//! directly onto one public engine operation.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::adjustment::Adjustment;
use crate::config::{ConfigPatch, LearningConfig};
use crate::engine::{FeedbackLearner, DEFAULT_ADJUSTMENT_HISTORY_LIMIT};
use crate::error::LearningError;
use crate::feedback::{BehaviorData, ContextInput, ExplicitKind, Feedback};
use crate::metrics::Metrics;
use crate::weights::Weight;

pub fn router(learner: FeedbackLearner) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/feedback/explicit", post(capture_explicit))
        .route("/feedback/implicit", post(capture_implicit))
        .route("/learning/metrics", get(learning_metrics))
        .route("/weights", get(all_weights))
        .route("/weights/{factor}", get(one_weight))
        .route("/adjustments", get(adjustments))
        .route("/config", get(get_config).patch(patch_config))
        .layer(CorsLayer::very_permissive())
        .with_state(learner)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct ApiError(StatusCode, String);

impl From<LearningError> for ApiError {
    fn from(e: LearningError) -> Self {
        let status = if e.is_channel_disabled() {
            StatusCode::FORBIDDEN
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        ApiError(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { error: self.1 })).into_response()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplicitReq {
    user_id: String,
    decision_id: String,
    #[serde(rename = "type")]
    kind: ExplicitKind,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    context: Option<ContextInput>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImplicitReq {
    user_id: String,
    decision_id: String,
    #[serde(default)]
    behavior_data: BehaviorData,
    #[serde(default)]
    context: Option<ContextInput>,
}

async fn capture_explicit(
    State(learner): State<FeedbackLearner>,
    Json(body): Json<ExplicitReq>,
) -> Result<Json<Feedback>, ApiError> {
    let fb = learner
        .capture_explicit_feedback(
            &body.user_id,
            &body.decision_id,
            body.kind,
            body.comment,
            body.context,
        )
        .await?;
    Ok(Json(fb))
}

async fn capture_implicit(
    State(learner): State<FeedbackLearner>,
    Json(body): Json<ImplicitReq>,
) -> Result<Json<Feedback>, ApiError> {
    let fb = learner
        .capture_implicit_feedback(
            &body.user_id,
            &body.decision_id,
            body.behavior_data,
            body.context,
        )
        .await?;
    Ok(Json(fb))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetricsQuery {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    start: Option<DateTime<Utc>>,
    #[serde(default)]
    end: Option<DateTime<Utc>>,
}

async fn learning_metrics(
    State(learner): State<FeedbackLearner>,
    Query(q): Query<MetricsQuery>,
) -> Json<Metrics> {
    Json(
        learner
            .calculate_metrics(q.user_id.as_deref(), q.start, q.end)
            .await,
    )
}

async fn all_weights(State(learner): State<FeedbackLearner>) -> Json<Vec<Weight>> {
    Json(learner.get_all_weights())
}

async fn one_weight(
    State(learner): State<FeedbackLearner>,
    Path(factor): Path<String>,
) -> Result<Json<Weight>, ApiError> {
    learner.get_decision_weight(&factor).map(Json).ok_or_else(|| {
        ApiError(
            StatusCode::NOT_FOUND,
            format!("unknown decision factor '{factor}'"),
        )
    })
}

#[derive(Deserialize)]
struct LimitQuery {
    #[serde(default)]
    limit: Option<usize>,
}

async fn adjustments(
    State(learner): State<FeedbackLearner>,
    Query(q): Query<LimitQuery>,
) -> Json<Vec<Adjustment>> {
    let limit = q.limit.unwrap_or(DEFAULT_ADJUSTMENT_HISTORY_LIMIT);
    Json(learner.get_adjustment_history(limit))
}

async fn get_config(State(learner): State<FeedbackLearner>) -> Json<LearningConfig> {
    Json(learner.get_config())
}

async fn patch_config(
    State(learner): State<FeedbackLearner>,
    Json(patch): Json<ConfigPatch>,
) -> Json<LearningConfig> {
    Json(learner.update_config(patch).await)
}
