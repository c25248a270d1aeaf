//! Liveness endpoint.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::server::state::SharedState;
use crate::server::utils::api_error;

pub async fn health_handler(State(state): State<SharedState>) -> Response {
    let st = state.lock().await;
    let counts = st
        .storage
        .list_trips()
        .and_then(|trips| st.storage.list_users().map(|users| (trips.len(), users.len())));
    match counts {
        Ok((trips, users)) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({
                "status": "ok",
                "trips": trips,
                "users": users,
                "ws_connections": st.ws_connections.load(Ordering::Relaxed),
            })),
        )
            .into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
