//! Tests for `AppError` → HTTP response mapping.
//!
//! These tests verify that each `AppError` variant produces the correct HTTP
//! status code, error code, and message. They do NOT need an HTTP server --
//! they call `IntoResponse` directly on `AppError` values.

use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use vqa_api::error::AppError;
use vqa_core::error::CoreError;
use vqa_mirror::MirrorError;
use vqa_store::StoreError;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ---------------------------------------------------------------------------
// Test: CoreError variants
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "Image",
        id: 42,
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Image with id 42 not found");
}

#[tokio::test]
async fn missing_fields_return_400_listing_every_field() {
    let err = AppError::Core(CoreError::MissingFields(vec!["question", "view"]));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "Missing required fields: question, view");
}

#[tokio::test]
async fn bad_request_error_returns_400() {
    let err = AppError::BadRequest("invalid field value".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "invalid field value");
}

// ---------------------------------------------------------------------------
// Test: store errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lock_timeout_returns_503() {
    let err = AppError::Store(StoreError::LockTimeout {
        path: PathBuf::from("/data/out_exo.json"),
        waited: Duration::from_secs(5),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "LOCK_TIMEOUT");
    assert!(!json["error"].as_str().unwrap().contains("/data"));
}

#[tokio::test]
async fn atomic_write_failure_returns_sanitized_500() {
    let err = AppError::Store(StoreError::AtomicWrite {
        path: PathBuf::from("/secret/out_exo.json"),
        source: std::io::Error::other("disk full"),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

// ---------------------------------------------------------------------------
// Test: remote sheet errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rate_limited_returns_429() {
    let (status, json) = error_to_response(AppError::Mirror(MirrorError::RateLimited)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn remote_timeout_returns_504() {
    let err = AppError::Mirror(MirrorError::Timeout(Duration::from_secs(15)));
    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json["code"], "REMOTE_TIMEOUT");
}

#[tokio::test]
async fn remote_api_error_hides_the_body() {
    let err = AppError::Mirror(MirrorError::Api {
        status: 500,
        body: "token=abc123".into(),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "REMOTE_UNAVAILABLE");
    assert!(!json["error"].as_str().unwrap().contains("abc123"));
}

// ---------------------------------------------------------------------------
// Test: AppError::InternalError maps to 500 and sanitizes the message
// ---------------------------------------------------------------------------

#[tokio::test]
async fn internal_error_returns_500_and_sanitizes_message() {
    let err = AppError::InternalError("secret path /var/lib/annotations leaked".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}
