//! Trip preference endpoints. Submissions merge into the existing record
//! rather than replacing it, so partial updates accumulate.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::model::{now_rfc3339, PreferencesSubmit, PreferencesSummary, ServerEvent};
use crate::server::state::SharedState;
use crate::server::utils::{api_error, storage_error};

pub async fn list_preferences_handler(
    Path(trip_id): Path<String>,
    State(state): State<SharedState>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_trip(&trip_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "trip not found"),
        Err(e) => return storage_error(e),
    }
    match st.storage.list_preferences(&trip_id) {
        Ok(records) => (StatusCode::OK, axum::Json(records)).into_response(),
        Err(e) => storage_error(e),
    }
}

pub async fn create_preferences_handler(
    Path(trip_id): Path<String>,
    State(state): State<SharedState>,
    Json(submit): Json<PreferencesSubmit>,
) -> Response {
    let mut st = state.lock().await;
    match st.storage.get_trip(&trip_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "trip not found"),
        Err(e) => return storage_error(e),
    }
    let now = now_rfc3339();
    let record = match st.storage.upsert_preferences(&trip_id, &submit, &now) {
        Ok(record) => record,
        Err(e) => return storage_error(e),
    };
    if let Err(e) = st.storage.mark_preferences_submitted(&trip_id, submit.user_id) {
        return storage_error(e);
    }
    st.broadcast(
        &trip_id,
        ServerEvent::PreferencesUpdate {
            user_id: submit.user_id,
            timestamp: now,
        },
    );
    (StatusCode::OK, axum::Json(record)).into_response()
}

/// Which participants have and haven't submitted preferences yet.
pub async fn missing_preferences_handler(
    Path(trip_id): Path<String>,
    State(state): State<SharedState>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_trip(&trip_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "trip not found"),
        Err(e) => return storage_error(e),
    }
    let participants = match st.storage.list_participants(&trip_id) {
        Ok(participants) => participants,
        Err(e) => return storage_error(e),
    };
    let preferences = match st.storage.list_preferences(&trip_id) {
        Ok(records) => records,
        Err(e) => return storage_error(e),
    };
    let submitted: Vec<i64> = preferences.iter().map(|p| p.user_id).collect();
    let missing: Vec<i64> = participants
        .iter()
        .map(|p| p.user_id)
        .filter(|id| !submitted.contains(id))
        .collect();
    (
        StatusCode::OK,
        axum::Json(PreferencesSummary { submitted, missing }),
    )
        .into_response()
}
