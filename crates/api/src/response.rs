//! The `{ "data": ... }` envelope of every successful response.
//!
//! Errors use `{ "error", "code" }` instead, see [`crate::error::AppError`].

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// 201 when a save or registration created something, 200 otherwise.
pub fn created_or_ok<T: Serialize>(created: bool, data: T) -> (StatusCode, Json<DataResponse<T>>) {
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(DataResponse { data }))
}
