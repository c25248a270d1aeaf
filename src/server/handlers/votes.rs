//! Emoji vote endpoints. A repeated (user, option, emoji) submission
//! removes the earlier vote.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::model::{now_rfc3339, ServerEvent, VoteSubmit};
use crate::server::state::SharedState;
use crate::server::utils::{api_error, storage_error};

pub async fn list_votes_handler(
    Path(trip_id): Path<String>,
    State(state): State<SharedState>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_trip(&trip_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "trip not found"),
        Err(e) => return storage_error(e),
    }
    match st.storage.list_votes(&trip_id) {
        Ok(votes) => (StatusCode::OK, axum::Json(votes)).into_response(),
        Err(e) => storage_error(e),
    }
}

pub async fn create_vote_handler(
    Path(trip_id): Path<String>,
    State(state): State<SharedState>,
    Json(vote): Json<VoteSubmit>,
) -> Response {
    let mut st = state.lock().await;
    match st.storage.get_trip(&trip_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "trip not found"),
        Err(e) => return storage_error(e),
    }
    let now = now_rfc3339();
    let outcome = match st.storage.toggle_vote(&trip_id, &vote, &now) {
        Ok(outcome) => outcome,
        Err(e) => return storage_error(e),
    };
    st.broadcast(
        &trip_id,
        ServerEvent::VoteUpdate {
            vote: outcome.vote.clone(),
            removed: outcome.removed,
            timestamp: now,
        },
    );
    (StatusCode::OK, axum::Json(outcome)).into_response()
}
