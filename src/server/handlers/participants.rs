//! Participant listing with embedded user rows.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::server::state::SharedState;
use crate::server::utils::{api_error, storage_error};

pub async fn list_participants_handler(
    Path(trip_id): Path<String>,
    State(state): State<SharedState>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_trip(&trip_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "trip not found"),
        Err(e) => return storage_error(e),
    }
    match st.storage.list_participants(&trip_id) {
        Ok(participants) => (StatusCode::OK, axum::Json(participants)).into_response(),
        Err(e) => storage_error(e),
    }
}
