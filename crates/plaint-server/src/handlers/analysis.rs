//! Analysis, statistics and demo data handlers

use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    Json,
};
use serde::Deserialize;

use super::read_json;
use crate::{get_actor, AppError, AppState};
use plaint_core::models::{
    current_time, Analysis, Complaint, NewComplaint, Statistics, ANONYMOUS_USER,
};
use plaint_core::simulate::{self, MAX_SIMULATED};

/// Request body for analyzing a complaint text
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub content: String,
    /// Persist the analyzed complaint
    #[serde(default)]
    pub save: bool,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// POST /api/analyze - Classify a text and write a reply
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Analysis>, AppError> {
    let actor = get_actor(&request);
    let req: AnalyzeRequest = read_json(request).await?;

    let mut analysis = state.analyzer.analyze(&req.content).await?;

    if req.save {
        let user_id = req
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(ANONYMOUS_USER);
        let complaint = state.db.create_complaint(&NewComplaint {
            complaint_time: current_time(),
            content: req.content.trim().to_string(),
            user_id: user_id.to_string(),
            complaint_category: Some(analysis.category.clone()),
            reply: Some(analysis.reply.clone()),
        })?;
        analysis.complaint_id = Some(complaint.id);
    }

    state.db.log_audit(
        &actor,
        "analyze",
        Some("complaint"),
        analysis.complaint_id,
        Some(&format!(
            "category={}, source={}, saved={}",
            analysis.category, analysis.source, req.save
        )),
    )?;

    Ok(Json(analysis))
}

/// GET /api/statistics - Complaint counts per category
pub async fn get_statistics(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Statistics>, AppError> {
    let actor = get_actor(&request);

    let stats = Statistics::from_counts(state.db.category_statistics()?);

    state.db.log_audit(
        &actor,
        "view",
        Some("statistics"),
        None,
        Some(&format!("total={}", stats.total)),
    )?;

    Ok(Json(stats))
}

/// Query parameters for generating demo complaints
#[derive(Debug, Deserialize)]
pub struct SimulateQuery {
    #[serde(default = "default_simulate_count")]
    pub count: usize,
}

fn default_simulate_count() -> usize {
    10
}

/// POST /api/simulate - Generate and store demo complaints
pub async fn simulate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SimulateQuery>,
    request: Request,
) -> Result<Json<Vec<Complaint>>, AppError> {
    let actor = get_actor(&request);

    if params.count == 0 || params.count > MAX_SIMULATED {
        return Err(AppError::bad_request(&format!(
            "count must be between 1 and {}",
            MAX_SIMULATED
        )));
    }

    let batch = simulate::generate_seeded(
        state.analyzer.profile(),
        params.count,
        current_time(),
        None,
    );
    let created = state.db.create_complaints(&batch)?;

    state.db.log_audit(
        &actor,
        "simulate",
        Some("complaint"),
        None,
        Some(&format!("count={}", created.len())),
    )?;

    Ok(Json(created))
}
