//! Itinerary option listing and ingestion.
//!
//! Ingestion is how the external planning collaborator publishes generated
//! options: it upserts the records, appends one agent message carrying the
//! bundle, and advances the trip state when that is forward progress.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::logging::trip_tag;
use crate::model::{now_rfc3339, NewMessage, OptionsIngest, ServerEvent, TripState};
use crate::server::state::SharedState;
use crate::server::utils::{api_error, storage_error};

const DEFAULT_OPTIONS_MESSAGE: &str =
    "I've put together some itinerary options for your trip. Take a look and vote for your favorites!";

pub async fn list_options_handler(
    Path(trip_id): Path<String>,
    State(state): State<SharedState>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_trip(&trip_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "trip not found"),
        Err(e) => return storage_error(e),
    }
    match st.storage.list_options(&trip_id) {
        Ok(options) => (StatusCode::OK, axum::Json(options)).into_response(),
        Err(e) => storage_error(e),
    }
}

pub async fn ingest_options_handler(
    Path(trip_id): Path<String>,
    State(state): State<SharedState>,
    Json(ingest): Json<OptionsIngest>,
) -> Response {
    let mut st = state.lock().await;
    let trip = match st.storage.get_trip(&trip_id) {
        Ok(Some(trip)) => trip,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "trip not found"),
        Err(e) => return storage_error(e),
    };
    let now = now_rfc3339();
    let mut records = Vec::with_capacity(ingest.options.len());
    for option in &ingest.options {
        match st.storage.upsert_option(&trip_id, option, &now) {
            Ok(record) => records.push(record),
            Err(e) => return storage_error(e),
        }
    }

    // One agent message carries the option bundle for transcript rendering.
    let metadata = match serde_json::to_value(&records) {
        Ok(bundle) => serde_json::json!({ "type": "trip_options", "options": bundle }),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let announcement = NewMessage {
        user_id: None,
        kind: "agent".to_string(),
        content: ingest
            .content
            .clone()
            .unwrap_or_else(|| DEFAULT_OPTIONS_MESSAGE.to_string()),
        metadata: Some(metadata),
    };
    if let Err(e) = st.storage.insert_message(&trip_id, &announcement, &now) {
        return storage_error(e);
    }

    // State only ever moves forward; a stale or unknown target is ignored.
    let current = TripState::parse(&trip.state);
    let target = ingest
        .state
        .as_deref()
        .map(TripState::parse)
        .unwrap_or(TripState::VotingHighLevel);
    if current.allows_advance_to(&target) && target != current {
        if let Err(e) = st.storage.set_trip_state(&trip_id, target.as_str(), &now) {
            return storage_error(e);
        }
        crate::tlog!("trip {} advanced to {}", trip_tag(&trip_id), target);
    }

    st.broadcast(
        &trip_id,
        ServerEvent::OptionsGenerated {
            count: records.len(),
            timestamp: now,
        },
    );
    (StatusCode::OK, axum::Json(records)).into_response()
}
