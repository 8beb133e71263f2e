use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /maintenance/sweep
///
/// Run the dedup sweep now instead of waiting for the background job.
pub async fn run_sweep(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let report = state.service.sweep().await?;
    Ok(Json(DataResponse { data: report }))
}
