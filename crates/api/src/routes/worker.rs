//! Route definitions for the per-worker review workflow.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::worker;
use crate::state::AppState;

/// Worker-scoped routes, mounted at `/workers`.
///
/// ```text
/// GET    /{worker_id}/items                         list_items (?status, ?sort, ?refresh)
/// GET    /{worker_id}/items/{item_id}/status        get_status (?refresh)
/// POST   /{worker_id}/items/{item_id}/skip          skip_item
/// GET    /{worker_id}/statistics                    statistics (?refresh)
/// GET    /{worker_id}/export/passed                 export_passed (?refresh)
/// GET    /{worker_id}/assignments                   list_assignments
/// POST   /{worker_id}/assignments                   assign_images
/// POST   /{worker_id}/complete                      complete_assignment
/// GET    /{worker_id}/progress                      progress
/// GET    /{worker_id}/stats                         worker_stats (?date)
/// POST   /{worker_id}/cache/invalidate              invalidate_cache
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{worker_id}/items", get(worker::list_items))
        .route(
            "/{worker_id}/items/{item_id}/status",
            get(worker::get_status),
        )
        .route("/{worker_id}/items/{item_id}/skip", post(worker::skip_item))
        .route("/{worker_id}/statistics", get(worker::statistics))
        .route("/{worker_id}/export/passed", get(worker::export_passed))
        .route(
            "/{worker_id}/assignments",
            get(worker::list_assignments).post(worker::assign_images),
        )
        .route("/{worker_id}/complete", post(worker::complete_assignment))
        .route("/{worker_id}/progress", get(worker::progress))
        .route("/{worker_id}/stats", get(worker::worker_stats))
        .route(
            "/{worker_id}/cache/invalidate",
            post(worker::invalidate_cache),
        )
}

/// The worker registry at `/workers` itself.
///
/// ```text
/// GET    /workers                                   list_workers
/// POST   /workers                                   register_worker
/// ```
pub fn registry_router() -> Router<AppState> {
    Router::new().route(
        "/workers",
        get(worker::list_workers).post(worker::register_worker),
    )
}
