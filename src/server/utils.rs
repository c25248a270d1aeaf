//! Shared utility functions for the server handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rand::RngCore;

use crate::server::config::INVITE_TOKEN_BYTES;
use crate::storage::StorageError;

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

/// Map a storage failure onto the matching HTTP error response.
pub fn storage_error(err: StorageError) -> Response {
    let status = match &err {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::AlreadyExists(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.to_string())
}

/// Random hex invite token for a new trip.
pub fn new_invite_token() -> String {
    let mut bytes = [0u8; INVITE_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
