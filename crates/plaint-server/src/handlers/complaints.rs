//! Complaint CRUD handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use serde::Deserialize;
use tracing::debug;

use super::read_json;
use crate::{
    get_actor, AppError, AppState, MessageResponse, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
use plaint_core::models::{Complaint, ComplaintPatch, NewComplaint};

/// Query parameters for listing complaints
#[derive(Debug, Deserialize)]
pub struct ListComplaintsQuery {
    /// Natural language, expression or shorthand filter
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}

/// POST /api/complaints - Create a complaint, classifying it when no category is given
pub async fn create_complaint(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Complaint>, AppError> {
    let actor = get_actor(&request);
    let new: NewComplaint = read_json(request).await?;

    let auto_classified = !new.has_category();
    let new = state.analyzer.complete(new).await?;
    let complaint = state.db.create_complaint(&new)?;

    state.db.log_audit(
        &actor,
        "create",
        Some("complaint"),
        Some(complaint.id),
        Some(&format!(
            "category={}, auto_classified={}",
            complaint.complaint_category, auto_classified
        )),
    )?;

    Ok(Json(complaint))
}

/// GET /api/complaints - List complaints, optionally filtered by `q`
pub async fn list_complaints(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListComplaintsQuery>,
    request: Request,
) -> Result<Json<Vec<Complaint>>, AppError> {
    let actor = get_actor(&request);
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);
    let skip = params.skip.max(0);

    let q = params.q.as_deref().unwrap_or_default();
    let filter = state.analyzer.parse_query(q).await?;
    debug!(?filter, "Parsed complaint query");

    let complaints = state.db.list_complaints(filter.as_ref(), skip, limit)?;

    state.db.log_audit(
        &actor,
        "list",
        Some("complaint"),
        None,
        Some(&format!(
            "q={:?}, skip={}, limit={}, count={}",
            q,
            skip,
            limit,
            complaints.len()
        )),
    )?;

    Ok(Json(complaints))
}

/// GET /api/complaints/:id - Get a single complaint
pub async fn get_complaint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Complaint>, AppError> {
    let actor = get_actor(&request);

    let complaint = state
        .db
        .get_complaint(id)?
        .ok_or_else(|| AppError::not_found(&format!("Complaint {} not found", id)))?;

    state
        .db
        .log_audit(&actor, "get", Some("complaint"), Some(id), None)?;

    Ok(Json(complaint))
}

/// PUT /api/complaints/:id - Replace every field of a complaint
pub async fn replace_complaint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Complaint>, AppError> {
    let actor = get_actor(&request);
    let new: NewComplaint = read_json(request).await?;

    let complaint = state
        .db
        .replace_complaint(id, &new)?
        .ok_or_else(|| AppError::not_found(&format!("Complaint {} not found", id)))?;

    state
        .db
        .log_audit(&actor, "replace", Some("complaint"), Some(id), None)?;

    Ok(Json(complaint))
}

/// PATCH /api/complaints/:id - Update the given fields of a complaint
pub async fn update_complaint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Complaint>, AppError> {
    let actor = get_actor(&request);
    let patch: ComplaintPatch = read_json(request).await?;

    if !state.db.update_complaint(id, &patch)? {
        return Err(AppError::not_found(&format!("Complaint {} not found", id)));
    }

    let complaint = state
        .db
        .get_complaint(id)?
        .ok_or_else(|| AppError::not_found(&format!("Complaint {} not found", id)))?;

    let fields: Vec<&str> = [
        ("complaint_time", patch.complaint_time.is_some()),
        ("content", patch.content.is_some()),
        ("user_id", patch.user_id.is_some()),
        ("complaint_category", patch.complaint_category.is_some()),
        ("reply", patch.reply.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, present)| present.then_some(name))
    .collect();

    state.db.log_audit(
        &actor,
        "update",
        Some("complaint"),
        Some(id),
        Some(&format!("fields={}", fields.join(","))),
    )?;

    Ok(Json(complaint))
}

/// DELETE /api/complaints/:id - Delete a complaint
pub async fn delete_complaint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<MessageResponse>, AppError> {
    let actor = get_actor(&request);

    if !state.db.delete_complaint(id)? {
        return Err(AppError::not_found(&format!("Complaint {} not found", id)));
    }

    state
        .db
        .log_audit(&actor, "delete", Some("complaint"), Some(id), None)?;

    Ok(Json(MessageResponse {
        message: "Complaint deleted".to_string(),
    }))
}
