//! HTTP-level integration tests for worker bookkeeping: the registry,
//! assignment listings, manual completion and completion stats.

mod common;

use axum::http::StatusCode;
use chrono::Local;
use common::{body_json, build_test_app, get, post_json};
use serde_json::json;

const WORKER: &str = "annotator01";

// ---------------------------------------------------------------------------
// Test: registering a worker, then renaming it
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_then_rename_worker() {
    let app = build_test_app();

    let response = post_json(
        app.router(),
        "/api/v1/workers",
        json!({ "worker_id": WORKER, "worker_name": "Kim" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["is_new"], true);
    assert_eq!(json["data"]["worker"]["status"], "active");

    let response = post_json(
        app.router(),
        "/api/v1/workers",
        json!({ "worker_id": WORKER, "worker_name": "Kim Minsu" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["is_new"], false);

    let json = body_json(get(app.router(), "/api/v1/workers").await).await;
    let workers = json["data"].as_array().unwrap();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0]["worker_name"], "Kim Minsu");
    assert!(app.dir.path().join("workers.json").exists());
}

#[tokio::test]
async fn register_without_name_is_rejected() {
    let app = build_test_app();
    let response = post_json(app.router(), "/api/v1/workers", json!({ "worker_id": WORKER })).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["error"].as_str().unwrap().contains("worker_name"));
}

// ---------------------------------------------------------------------------
// Test: assignments are listed and completed by hand
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manual_completion_updates_progress_and_stats() {
    let app = build_test_app();
    let uri = format!("/api/v1/workers/{WORKER}/assignments");
    post_json(app.router(), &uri, json!({ "image_ids": [1, 2, 3] })).await;

    let json = body_json(get(app.router(), &uri).await).await;
    let listed: Vec<i64> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["image_id"].as_i64().unwrap())
        .collect();
    assert_eq!(listed, vec![1, 2, 3]);
    assert_eq!(json["data"][0]["status"], "assigned");

    let complete = format!("/api/v1/workers/{WORKER}/complete");
    let response = post_json(app.router(), &complete, json!({ "image_id": 2 })).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["completed"], 1);
    assert_eq!(json["data"]["assigned"], 3);

    // Already completed.
    let response = post_json(app.router(), &complete, json!({ "image_id": 2 })).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = post_json(app.router(), &complete, json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let today = Local::now().format("%Y-%m-%d").to_string();
    let stats = format!("/api/v1/workers/{WORKER}/stats?date={today}");
    let json = body_json(get(app.router(), &stats).await).await;
    assert_eq!(json["data"]["total_completed"], 1);
    assert_eq!(json["data"]["daily_stats"][&today], 1);
    assert_eq!(json["data"]["hourly_stats"].as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn stats_for_another_day_keep_the_total() {
    let app = build_test_app();
    let uri = format!("/api/v1/workers/{WORKER}/assignments");
    post_json(app.router(), &uri, json!({ "image_ids": [4] })).await;
    let complete = format!("/api/v1/workers/{WORKER}/complete");
    post_json(app.router(), &complete, json!({ "image_id": 4 })).await;

    let stats = format!("/api/v1/workers/{WORKER}/stats?date=2001-01-01");
    let json = body_json(get(app.router(), &stats).await).await;
    assert_eq!(json["data"]["total_completed"], 1);
    assert!(json["data"]["daily_stats"].as_object().unwrap().is_empty());

    let bad = format!("/api/v1/workers/{WORKER}/stats?date=today");
    assert_eq!(get(app.router(), &bad).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_worker_has_no_assignments_or_stats() {
    let app = build_test_app();
    let json = body_json(get(app.router(), "/api/v1/workers/nobody/assignments").await).await;
    assert!(json["data"].as_array().unwrap().is_empty());

    let json = body_json(get(app.router(), "/api/v1/workers/nobody/stats").await).await;
    assert_eq!(json["data"]["total_completed"], 0);
}
