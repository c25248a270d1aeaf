//! Trip lifecycle endpoints: create, fetch, list, join by invite.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::logging::{trip_tag, user_tag};
use crate::model::{now_rfc3339, JoinRequest, NewTrip, ServerEvent};
use crate::server::state::SharedState;
use crate::server::utils::{api_error, new_invite_token, storage_error};

pub async fn list_trips_handler(State(state): State<SharedState>) -> Response {
    let st = state.lock().await;
    match st.storage.list_trips() {
        Ok(trips) => (StatusCode::OK, axum::Json(trips)).into_response(),
        Err(e) => storage_error(e),
    }
}

pub async fn get_trip_handler(
    Path(trip_id): Path<String>,
    State(state): State<SharedState>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_trip(&trip_id) {
        Ok(Some(trip)) => (StatusCode::OK, axum::Json(trip)).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "trip not found"),
        Err(e) => storage_error(e),
    }
}

pub async fn create_trip_handler(
    State(state): State<SharedState>,
    Json(new_trip): Json<NewTrip>,
) -> Response {
    if new_trip.trip_id.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "trip_id must not be empty");
    }
    let st = state.lock().await;
    let now = now_rfc3339();
    let token = new_invite_token();
    let trip = match st.storage.create_trip(&new_trip, &token, &now) {
        Ok(trip) => trip,
        Err(e) => return storage_error(e),
    };
    if let Some(creator_id) = new_trip.creator_id {
        match st.storage.get_user(creator_id) {
            Ok(Some(_)) => {
                if let Err(e) = st.storage.add_participant(&trip.trip_id, creator_id, "organizer", &now)
                {
                    return storage_error(e);
                }
            }
            Ok(None) => return api_error(StatusCode::NOT_FOUND, "creator not found"),
            Err(e) => return storage_error(e),
        }
    }
    crate::tlog!("created trip {} ({})", trip_tag(&trip.trip_id), trip.title);
    (StatusCode::CREATED, axum::Json(trip)).into_response()
}

/// Join a trip through its invite token. Joining twice is a no-op that
/// returns the existing membership.
pub async fn join_trip_handler(
    State(state): State<SharedState>,
    Json(join): Json<JoinRequest>,
) -> Response {
    let mut st = state.lock().await;
    let trip = match st.storage.get_trip_by_invite(&join.invite_token) {
        Ok(Some(trip)) => trip,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "invalid invite token"),
        Err(e) => return storage_error(e),
    };
    match st.storage.get_user(join.user_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => return storage_error(e),
    }
    let now = now_rfc3339();
    let participant = match st
        .storage
        .add_participant(&trip.trip_id, join.user_id, "traveler", &now)
    {
        Ok(p) => p,
        Err(e) => return storage_error(e),
    };
    crate::tlog!(
        "user {} joined trip {}",
        user_tag(join.user_id),
        trip_tag(&trip.trip_id)
    );
    st.broadcast(
        &trip.trip_id,
        ServerEvent::UserJoined {
            user_id: join.user_id,
            timestamp: now,
        },
    );
    (StatusCode::OK, axum::Json(participant)).into_response()
}
