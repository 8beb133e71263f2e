use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::service::DistributeRequest;
use crate::state::AppState;

/// POST /assignments/distribute
///
/// Split images evenly across the given workers.
pub async fn distribute(
    State(state): State<AppState>,
    Json(input): Json<DistributeRequest>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.service.distribute(input).await?;
    Ok(Json(DataResponse { data: outcome }))
}
