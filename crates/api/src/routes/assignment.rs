use axum::routing::post;
use axum::Router;

use crate::handlers::assignment;
use crate::state::AppState;

/// Assignment routes, mounted at `/assignments`.
///
/// ```text
/// POST   /distribute       distribute
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/distribute", post(assignment::distribute))
}
