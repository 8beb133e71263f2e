use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use vqa_core::error::CoreError;
use vqa_mirror::MirrorError;
use vqa_store::StoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain, store and mirror errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `vqa_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A failure of the local partition store or assignment book.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A remote sheet failure on an operation that needs the remote.
    #[error(transparent)]
    Mirror(#[from] MirrorError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::MissingFields(_) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", core.to_string())
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },

            // --- Store errors ---
            AppError::Store(err) => classify_store_error(err),

            // --- Remote sheet errors ---
            AppError::Mirror(err) => classify_mirror_error(err),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

/// Classify a store error into an HTTP status, error code, and message.
///
/// - `LockTimeout` maps to 503 so the client retries the save.
/// - Everything else maps to 500 with a sanitized message; paths stay in the log.
fn classify_store_error(err: &StoreError) -> (StatusCode, &'static str, String) {
    match err {
        StoreError::LockTimeout { path, waited } => {
            tracing::warn!(path = %path.display(), waited_ms = waited.as_millis() as u64, "Save lock timed out");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "LOCK_TIMEOUT",
                "The annotation store is busy, try again".to_string(),
            )
        }
        other => {
            tracing::error!(error = %other, "Store error");
            internal()
        }
    }
}

/// Classify a remote sheet error into an HTTP status, error code, and message.
fn classify_mirror_error(err: &MirrorError) -> (StatusCode, &'static str, String) {
    match err {
        MirrorError::RateLimited => (
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "The review sheet service is rate limiting requests, try again later".to_string(),
        ),
        MirrorError::Timeout(_) => (
            StatusCode::GATEWAY_TIMEOUT,
            "REMOTE_TIMEOUT",
            "The review sheet service did not respond in time".to_string(),
        ),
        MirrorError::SheetNotFound(title) => (
            StatusCode::NOT_FOUND,
            "SHEET_NOT_FOUND",
            format!("Review sheet '{title}' not found"),
        ),
        MirrorError::Config(msg) => {
            tracing::error!(error = %msg, "Remote sheet misconfigured");
            internal()
        }
        other => {
            tracing::error!(error = %other, "Remote sheet error");
            (
                StatusCode::BAD_GATEWAY,
                "REMOTE_UNAVAILABLE",
                "The review sheet service is unavailable".to_string(),
            )
        }
    }
}
