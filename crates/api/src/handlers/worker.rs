//! Per-worker handlers: the registry, workflow status, skipping, listings,
//! statistics, export and assignment bookkeeping.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use vqa_core::assignment::WorkerRegistration;
use vqa_core::status::WorkItemStatus;
use vqa_core::types::DbId;

use crate::error::{AppError, AppResult};
use crate::query::{ItemListParams, RefreshParams, StatsParams};
use crate::response::{created_or_ok, DataResponse};
use crate::state::AppState;

/* --------------------------------------------------------------------------
   Request bodies
   -------------------------------------------------------------------------- */

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub image_ids: Vec<DbId>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub image_id: Option<DbId>,
}

/* --------------------------------------------------------------------------
   Registry
   -------------------------------------------------------------------------- */

/// GET /workers
pub async fn list_workers(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.service.workers(),
    }))
}

/// POST /workers
///
/// Registers a worker, or renames an existing one. Returns 201 when the
/// worker is new and 200 otherwise.
pub async fn register_worker(
    State(state): State<AppState>,
    Json(input): Json<WorkerRegistration>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.service.register_worker(input).await?;
    Ok(created_or_ok(outcome.is_new, outcome))
}

/* --------------------------------------------------------------------------
   Status
   -------------------------------------------------------------------------- */

/// GET /workers/{worker_id}/items/{item_id}/status
pub async fn get_status(
    State(state): State<AppState>,
    Path((worker_id, item_id)): Path<(String, DbId)>,
    Query(params): Query<RefreshParams>,
) -> AppResult<impl IntoResponse> {
    let entry = state
        .service
        .get_status(item_id, &worker_id, params.refresh)
        .await?;
    Ok(Json(DataResponse { data: entry }))
}

/// POST /workers/{worker_id}/items/{item_id}/skip
pub async fn skip_item(
    State(state): State<AppState>,
    Path((worker_id, item_id)): Path<(String, DbId)>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.service.skip(item_id, &worker_id).await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// GET /workers/{worker_id}/items
///
/// Every item of the worker with its status, filtered by `?status=` and
/// ordered by `?sort=image_id|oldest|newest`.
pub async fn list_items(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    Query(params): Query<ItemListParams>,
) -> AppResult<impl IntoResponse> {
    let status = params
        .status
        .as_deref()
        .filter(|s| !s.is_empty() && *s != "all")
        .map(WorkItemStatus::from_str)
        .transpose()?;
    let entries = state
        .service
        .list_by_status(&worker_id, status, params.sort, params.refresh)
        .await?;
    Ok(Json(DataResponse { data: entries }))
}

/// GET /workers/{worker_id}/statistics
pub async fn statistics(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    Query(params): Query<RefreshParams>,
) -> AppResult<impl IntoResponse> {
    let counts = state.service.statistics(&worker_id, params.refresh).await?;
    Ok(Json(DataResponse { data: counts }))
}

/// GET /workers/{worker_id}/export/passed
pub async fn export_passed(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    Query(params): Query<RefreshParams>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.service.export_passed(&worker_id, params.refresh).await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// POST /workers/{worker_id}/cache/invalidate
pub async fn invalidate_cache(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.service.invalidate(&worker_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/* --------------------------------------------------------------------------
   Assignments
   -------------------------------------------------------------------------- */

/// POST /workers/{worker_id}/assignments
pub async fn assign_images(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    Json(input): Json<AssignRequest>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.service.assign(&worker_id, input.image_ids).await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// GET /workers/{worker_id}/progress
pub async fn progress(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let progress = state.service.progress(&worker_id)?;
    Ok(Json(DataResponse { data: progress }))
}

/// GET /workers/{worker_id}/assignments
pub async fn list_assignments(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let assignments = state.service.worker_assignments(&worker_id)?;
    Ok(Json(DataResponse { data: assignments }))
}

/// POST /workers/{worker_id}/complete
pub async fn complete_assignment(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    Json(input): Json<CompleteRequest>,
) -> AppResult<impl IntoResponse> {
    let image_id = input
        .image_id
        .ok_or_else(|| AppError::BadRequest("image_id is required".into()))?;
    let progress = state.service.complete(&worker_id, image_id).await?;
    Ok(Json(DataResponse { data: progress }))
}

/// GET /workers/{worker_id}/stats
pub async fn worker_stats(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    Query(params): Query<StatsParams>,
) -> AppResult<impl IntoResponse> {
    let stats = state.service.worker_stats(&worker_id, params.date.as_deref())?;
    Ok(Json(DataResponse { data: stats }))
}
