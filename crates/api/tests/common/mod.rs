#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use vqa_core::catalog::{ImageInfo, StaticCatalog};
use vqa_mirror::{InMemorySheets, MirrorCache, MirrorConfig};
use vqa_store::{AssignmentBook, PartitionStore, WorkerRegistry};

use vqa_api::config::ServerConfig;
use vqa_api::router::build_app_router;
use vqa_api::service::AnnotationService;
use vqa_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults rooted in `dir`.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and a 30-second request timeout. The background sweep is off.
pub fn test_config(dir: &std::path::Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_body_bytes: 64 * 1024,
        shutdown_timeout_secs: 30,
        output_json_path: dir.join("web_annotations.json"),
        catalog_path: None,
        assignments_path: dir.join("worker_assignments.json"),
        workers_path: dir.join("workers.json"),
        save_lock_timeout_secs: None,
        sweep_interval_secs: 0,
        sheets: None,
        mirror_cache_ttl_secs: 30,
        mirror_request_timeout_secs: 15,
    }
}

/// A fully wired app over a scratch directory and in-memory sheets.
pub struct TestApp {
    pub dir: tempfile::TempDir,
    pub sheets: Arc<InMemorySheets>,
    pub store: Arc<PartitionStore>,
    router: Router,
}

impl TestApp {
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.path().join("web_annotations.json")
    }
}

/// Catalog of images `1..=10`, 640x480.
pub fn test_catalog() -> StaticCatalog {
    StaticCatalog::new((1..=10).map(|id| ImageInfo {
        id,
        file_name: format!("{id:012}.jpg"),
        width: 640,
        height: 480,
    }))
}

/// Build the full application router with all middleware layers.
///
/// Uses the same `build_app_router` as `main.rs` so integration tests
/// exercise the production middleware stack.
pub fn build_test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let sheets = Arc::new(InMemorySheets::new());
    let mirror = MirrorCache::new(
        sheets.clone(),
        MirrorConfig {
            write_retry_delays: vec![Duration::from_millis(1)],
            ..MirrorConfig::default()
        },
    );
    let store = Arc::new(PartitionStore::open(&config.output_json_path));
    let assignments = AssignmentBook::open(&config.assignments_path).unwrap();
    let registry = WorkerRegistry::open(&config.workers_path).unwrap();

    let service = AnnotationService::new(
        Arc::clone(&store),
        Arc::new(mirror),
        Arc::new(test_catalog()),
        Arc::new(assignments),
        Arc::new(registry),
    );
    let state = AppState {
        config: Arc::new(config.clone()),
        service: Arc::new(service),
        mirror_backend: "in_memory",
    };
    let router = build_app_router(state, &config);

    TestApp {
        dir,
        sheets,
        store,
        router,
    }
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_empty(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}
