//! Handlers for saving and reading local annotation records.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use vqa_core::record::AnnotationDraft;
use vqa_core::types::DbId;

use crate::error::AppResult;
use crate::response::{created_or_ok, DataResponse};
use crate::state::AppState;

/// POST /annotations
///
/// Persist an annotation to its view partition, then mirror it to the
/// worker's sheet when `worker_id` is given. Returns 201 for a new record
/// and 200 for a replacement.
pub async fn save_annotation(
    State(state): State<AppState>,
    Json(draft): Json<AnnotationDraft>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.service.save_annotation(draft).await?;

    tracing::info!(
        item_id = outcome.item_id,
        partition = %outcome.partition,
        updated = outcome.updated,
        migrated = outcome.migrated,
        eviction_pending = outcome.eviction_pending,
        mirrored = outcome.mirror.is_some(),
        "Annotation saved"
    );

    let created = !(outcome.updated || outcome.migrated);
    Ok(created_or_ok(created, outcome))
}

/// GET /annotations/{item_id}
pub async fn get_annotation(
    State(state): State<AppState>,
    Path(item_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let record = state.service.find_record(item_id).await?;
    Ok(Json(DataResponse { data: record }))
}
