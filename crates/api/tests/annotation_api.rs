//! HTTP-level integration tests for saving and reading annotations.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, get, post_empty, post_json};
use serde_json::{json, Value};
use vqa_core::record::Partition;
use vqa_core::sheet::COL_IMAGE_ID;
use vqa_mirror::Fault;

fn draft(id: i64, view: &str) -> Value {
    json!({
        "image_id": id,
        "question": "How many cups are on the table?",
        "response": "Two",
        "rationale": "Both are visible left of the plate",
        "view": view,
        "selected_bboxes": [[10.0, 20.0, 30.0, 40.0]]
    })
}

fn ids_in(path: &std::path::Path) -> Vec<i64> {
    let text = std::fs::read_to_string(path).unwrap_or_else(|_| "[]".to_string());
    let records: Vec<Value> = serde_json::from_str(&text).unwrap();
    records.iter().map(|r| r["image_id"].as_i64().unwrap()).collect()
}

// ---------------------------------------------------------------------------
// Test: first save creates, second save replaces
// ---------------------------------------------------------------------------

#[tokio::test]
async fn save_creates_then_replaces() {
    let app = build_test_app();

    let response = post_json(app.router(), "/api/v1/annotations", draft(1, "exo")).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["partition"], "exo");
    assert_eq!(json["data"]["updated"], false);

    let response = post_json(app.router(), "/api/v1/annotations", draft(1, "exo")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["updated"], true);

    assert_eq!(ids_in(app.store.path(Partition::Exo)), vec![1]);
}

// ---------------------------------------------------------------------------
// Test: changing the view moves the record between partitions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn view_change_moves_record() {
    let app = build_test_app();
    post_json(app.router(), "/api/v1/annotations", draft(7, "exo")).await;

    let response = post_json(app.router(), "/api/v1/annotations", draft(7, "ego")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["partition"], "ego");
    assert_eq!(json["data"]["migrated"], true);

    assert!(ids_in(app.store.path(Partition::Exo)).is_empty());
    assert_eq!(ids_in(app.store.path(Partition::Ego)), vec![7]);

    let json = body_json(get(app.router(), "/api/v1/annotations/7").await).await;
    assert_eq!(json["data"]["view"], "ego");
    assert_eq!(json["data"]["image_path"], "/000000000007.jpg");
    assert_eq!(json["data"]["image_resolution"], "640x480");
}

// ---------------------------------------------------------------------------
// Test: a failed eviction still answers with the durable save
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_eviction_is_reported_not_raised() {
    let app = build_test_app();
    std::fs::create_dir(app.store.path(Partition::Ego)).unwrap();

    let response = post_json(app.router(), "/api/v1/annotations", draft(8, "exo")).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["eviction_pending"], true);
    assert_eq!(ids_in(app.store.path(Partition::Exo)), vec![8]);
}

// ---------------------------------------------------------------------------
// Test: oversized bodies are refused before parsing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn oversized_body_is_rejected() {
    let app = build_test_app();
    let mut body = draft(1, "exo");
    body["rationale"] = Value::String("x".repeat(128 * 1024));

    let response = post_json(app.router(), "/api/v1/annotations", body).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(!app.store.path(Partition::Exo).exists());
}

// ---------------------------------------------------------------------------
// Test: a single selected box is stored as one box, not a list
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_box_is_stored_flat() {
    let app = build_test_app();
    post_json(app.router(), "/api/v1/annotations", draft(2, "exo")).await;

    let json = body_json(get(app.router(), "/api/v1/annotations/2").await).await;
    assert_eq!(json["data"]["bbox"], json!([10.0, 20.0, 30.0, 40.0]));
}

// ---------------------------------------------------------------------------
// Test: validation failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_fields_are_reported_together() {
    let app = build_test_app();
    let response = post_json(
        app.router(),
        "/api/v1/annotations",
        json!({ "image_id": 1, "question": " ", "view": "exo" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    let message = json["error"].as_str().unwrap();
    assert!(message.contains("question") && message.contains("response"));
}

#[tokio::test]
async fn unknown_view_is_rejected() {
    let app = build_test_app();
    let response = post_json(app.router(), "/api/v1/annotations", draft(1, "top")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!app.store.path(Partition::Exo).exists());
}

#[tokio::test]
async fn unknown_image_returns_404() {
    let app = build_test_app();
    let response = post_json(app.router(), "/api/v1/annotations", draft(999, "exo")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn unsaved_annotation_returns_404() {
    let app = build_test_app();
    let response = get(app.router(), "/api/v1/annotations/3").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: saves with a worker are mirrored to the worker's sheet
// ---------------------------------------------------------------------------

#[tokio::test]
async fn save_with_worker_mirrors_row() {
    let app = build_test_app();
    let mut body = draft(4, "exo");
    body["worker_id"] = json!("annotator01");

    let json = body_json(post_json(app.router(), "/api/v1/annotations", body).await).await;
    assert_eq!(json["data"]["mirror"]["appended"], true);
    assert!(json["data"]["mirror_error"].is_null());

    let values = app.sheets.values("annotator01");
    let id_col = values[0].iter().position(|c| c == COL_IMAGE_ID).unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values[1][id_col], "4");
}

// ---------------------------------------------------------------------------
// Test: a mirror outage never fails a save
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mirror_outage_is_a_soft_warning() {
    let app = build_test_app();
    app.sheets.fail_next(Fault::Unavailable);
    let mut body = draft(5, "ego");
    body["worker_id"] = json!("annotator01");

    let response = post_json(app.router(), "/api/v1/annotations", body).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert!(json["data"]["mirror_error"].is_string());
    assert_eq!(ids_in(app.store.path(Partition::Ego)), vec![5]);
}

// ---------------------------------------------------------------------------
// Test: the sweep endpoint repairs duplicated partition files
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_endpoint_repairs_duplicates() {
    let app = build_test_app();
    let record = json!({
        "image_id": 8, "image_path": "/8.jpg", "image_resolution": "1x1",
        "question": "q", "response": "r", "rationale": "", "view": "exo", "bbox": null
    });
    std::fs::write(
        app.store.path(Partition::Exo),
        serde_json::to_vec(&json!([record, record])).unwrap(),
    )
    .unwrap();

    let response = post_empty(app.router(), "/api/v1/maintenance/sweep").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["exo"]["duplicates_removed"], 1);
    assert_eq!(ids_in(app.store.path(Partition::Exo)), vec![8]);

    let json = body_json(post_empty(app.router(), "/api/v1/maintenance/sweep").await).await;
    assert_eq!(json["data"]["exo"]["duplicates_removed"], 0);
}
