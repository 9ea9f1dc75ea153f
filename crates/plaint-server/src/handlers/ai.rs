//! Language model status and usage handlers

use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{get_actor, AppError, AppState, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use plaint_core::ai::AIBackend;
use plaint_core::models::{AiMetric, AiOperationStats};

/// Service status
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// `openai_compatible`, `ollama`, `mock` or `none`
    pub ai_backend: &'static str,
    pub model: Option<String>,
    pub profile: String,
}

/// GET /api/health - Liveness and configuration summary (no auth)
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let ai = state.analyzer.ai();
    Json(HealthResponse {
        status: "ok",
        ai_backend: ai.map(|c| c.backend_name()).unwrap_or("none"),
        model: ai.map(|c| c.model().to_string()),
        profile: state.analyzer.profile().name.clone(),
    })
}

/// GET /api/ai/stats - Per-operation model call statistics
pub async fn get_ai_stats(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Vec<AiOperationStats>>, AppError> {
    let actor = get_actor(&request);

    let stats = state.db.ai_metric_summary()?;

    state
        .db
        .log_audit(&actor, "view", Some("ai_stats"), None, None)?;

    Ok(Json(stats))
}

/// Query parameters for recent model calls
#[derive(Debug, Deserialize)]
pub struct AiMetricsQuery {
    #[serde(default = "default_metrics_limit")]
    pub limit: i64,
}

fn default_metrics_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}

/// GET /api/ai/metrics - Most recent model calls
pub async fn list_ai_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AiMetricsQuery>,
    request: Request,
) -> Result<Json<Vec<AiMetric>>, AppError> {
    let actor = get_actor(&request);
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);

    let metrics = state.db.list_ai_metrics(limit)?;

    state.db.log_audit(
        &actor,
        "list",
        Some("ai_metric"),
        None,
        Some(&format!("limit={}", limit)),
    )?;

    Ok(Json(metrics))
}
