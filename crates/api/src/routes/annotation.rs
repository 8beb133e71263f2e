use axum::routing::{get, post};
use axum::Router;

use crate::handlers::annotation;
use crate::state::AppState;

/// Annotation routes, merged at the `/api/v1` root.
///
/// ```text
/// POST   /annotations                 save_annotation
/// GET    /annotations/{item_id}       get_annotation
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/annotations", post(annotation::save_annotation))
        .route("/annotations/{item_id}", get(annotation::get_annotation))
}
