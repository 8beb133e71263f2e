pub mod annotation;
pub mod assignment;
pub mod health;
pub mod maintenance;
pub mod worker;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /annotations                                      save (POST)
/// /annotations/{item_id}                            local record (GET)
///
/// /workers                                          registry (GET, POST)
/// /workers/{worker_id}/items                        list by status (GET)
/// /workers/{worker_id}/items/{item_id}/status       status (GET)
/// /workers/{worker_id}/items/{item_id}/skip         skip (POST)
/// /workers/{worker_id}/statistics                   counts + completion rate (GET)
/// /workers/{worker_id}/export/passed                passed rows as records (GET)
/// /workers/{worker_id}/assignments                  list (GET), assign images (POST)
/// /workers/{worker_id}/complete                     manual completion (POST)
/// /workers/{worker_id}/progress                     assignment progress (GET)
/// /workers/{worker_id}/stats                        completions per day and hour (GET)
/// /workers/{worker_id}/cache/invalidate             drop mirror cache entry (POST)
///
/// /assignments/distribute                           even split (POST)
///
/// /maintenance/sweep                                dedup sweep (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(annotation::router())
        .merge(worker::registry_router())
        .nest("/workers", worker::router())
        .nest("/assignments", assignment::router())
        .nest("/maintenance", maintenance::router())
}
