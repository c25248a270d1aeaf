//! Chat transcript endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::logging::trip_tag;
use crate::model::{now_rfc3339, NewMessage, ServerEvent};
use crate::server::state::SharedState;
use crate::server::utils::{api_error, storage_error};

pub async fn list_messages_handler(
    Path(trip_id): Path<String>,
    State(state): State<SharedState>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_trip(&trip_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "trip not found"),
        Err(e) => return storage_error(e),
    }
    match st.storage.list_messages(&trip_id) {
        Ok(messages) => (StatusCode::OK, axum::Json(messages)).into_response(),
        Err(e) => storage_error(e),
    }
}

pub async fn create_message_handler(
    Path(trip_id): Path<String>,
    State(state): State<SharedState>,
    Json(new_message): Json<NewMessage>,
) -> Response {
    let mut st = state.lock().await;
    match st.storage.get_trip(&trip_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "trip not found"),
        Err(e) => return storage_error(e),
    }
    let now = now_rfc3339();
    let message = match st.storage.insert_message(&trip_id, &new_message, &now) {
        Ok(message) => message,
        Err(e) => return storage_error(e),
    };
    st.broadcast(
        &trip_id,
        ServerEvent::NewMessage {
            message: Some(message.clone()),
            timestamp: now,
        },
    );
    (StatusCode::CREATED, axum::Json(message)).into_response()
}

pub async fn delete_message_handler(
    Path((trip_id, message_id)): Path<(String, i64)>,
    State(state): State<SharedState>,
) -> Response {
    let mut st = state.lock().await;
    match st.storage.delete_message(&trip_id, message_id) {
        Ok(true) => {}
        Ok(false) => return api_error(StatusCode::NOT_FOUND, "message not found"),
        Err(e) => return storage_error(e),
    }
    crate::tlog!(
        "deleted message {} from trip {}",
        message_id,
        trip_tag(&trip_id)
    );
    st.broadcast(
        &trip_id,
        ServerEvent::MessageDeleted {
            message_id,
            timestamp: now_rfc3339(),
        },
    );
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({ "deleted": true })),
    )
        .into_response()
}
