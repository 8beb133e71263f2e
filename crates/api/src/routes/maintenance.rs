use axum::routing::post;
use axum::Router;

use crate::handlers::maintenance;
use crate::state::AppState;

/// Maintenance routes, mounted at `/maintenance`.
///
/// ```text
/// POST   /sweep            run_sweep
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/sweep", post(maintenance::run_sweep))
}
