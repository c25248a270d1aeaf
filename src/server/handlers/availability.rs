//! Availability calendar endpoints and the date-consensus check.

use std::collections::HashSet;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::logging::trip_tag;
use crate::model::{
    day_key, format_day, now_rfc3339, AvailabilityBatch, AvailabilitySubmit, NewMessage,
    ServerEvent, TripState,
};
use crate::server::config::{CONSENSUS_MIN_DAYS, CONSENSUS_PER_PARTICIPANT};
use crate::server::state::{AppState, SharedState};
use crate::server::utils::{api_error, storage_error};
use crate::storage::StorageError;

/// Agent reply posted once enough availability has been collected.
const CONSENSUS_MESSAGE: &str = "Great! I can see everyone has shared their availability. Based on your preferences, I have 3 fantastic itinerary options for Barcelona. Let me know which one excites you most!";

pub async fn list_availability_handler(
    Path(trip_id): Path<String>,
    State(state): State<SharedState>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_trip(&trip_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "trip not found"),
        Err(e) => return storage_error(e),
    }
    match st.storage.list_availability(&trip_id) {
        Ok(records) => (StatusCode::OK, axum::Json(records)).into_response(),
        Err(e) => storage_error(e),
    }
}

pub async fn create_availability_handler(
    Path(trip_id): Path<String>,
    State(state): State<SharedState>,
    Json(submit): Json<AvailabilitySubmit>,
) -> Response {
    let day = match day_key(&submit.date) {
        Ok(day) => format_day(day),
        Err(e) => return api_error(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let mut st = state.lock().await;
    match st.storage.get_trip(&trip_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "trip not found"),
        Err(e) => return storage_error(e),
    }
    let record = match st
        .storage
        .upsert_availability(&trip_id, submit.user_id, &day, submit.available)
    {
        Ok(record) => record,
        Err(e) => return storage_error(e),
    };
    if let Err(e) = st.storage.mark_availability_submitted(&trip_id, submit.user_id) {
        return storage_error(e);
    }
    st.broadcast(
        &trip_id,
        ServerEvent::AvailabilityUpdate {
            availability: record.clone(),
            timestamp: now_rfc3339(),
        },
    );
    if let Err(e) = consensus_check(&mut st, &trip_id) {
        return storage_error(e);
    }
    (StatusCode::OK, axum::Json(record)).into_response()
}

pub async fn batch_availability_handler(
    Path(trip_id): Path<String>,
    State(state): State<SharedState>,
    Json(batch): Json<AvailabilityBatch>,
) -> Response {
    // Normalize every date before touching the database; one bad entry
    // rejects the whole batch.
    let mut days = Vec::with_capacity(batch.dates.len());
    for entry in &batch.dates {
        match day_key(&entry.date) {
            Ok(day) => days.push((format_day(day), entry.available)),
            Err(e) => return api_error(StatusCode::BAD_REQUEST, e.to_string()),
        }
    }
    let mut st = state.lock().await;
    match st.storage.get_trip(&trip_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "trip not found"),
        Err(e) => return storage_error(e),
    }
    let mut records = Vec::with_capacity(days.len());
    for (day, available) in &days {
        match st
            .storage
            .upsert_availability(&trip_id, batch.user_id, day, *available)
        {
            Ok(record) => records.push(record),
            Err(e) => return storage_error(e),
        }
    }
    if !records.is_empty() {
        if let Err(e) = st.storage.mark_availability_submitted(&trip_id, batch.user_id) {
            return storage_error(e);
        }
    }
    st.broadcast(
        &trip_id,
        ServerEvent::AvailabilityBatchUpdate {
            availability: records.clone(),
            timestamp: now_rfc3339(),
        },
    );
    if let Err(e) = consensus_check(&mut st, &trip_id) {
        return storage_error(e);
    }
    (StatusCode::OK, axum::Json(records)).into_response()
}

/// While a trip is still collecting dates, advance it to voting once enough
/// distinct days and per-participant records exist. The `COLLECTING_DATES`
/// guard makes the transition fire at most once.
fn consensus_check(st: &mut AppState, trip_id: &str) -> Result<(), StorageError> {
    let trip = match st.storage.get_trip(trip_id)? {
        Some(trip) => trip,
        None => return Ok(()),
    };
    if TripState::parse(&trip.state) != TripState::CollectingDates {
        return Ok(());
    }
    let availability = st.storage.list_availability(trip_id)?;
    let distinct_days: HashSet<&str> = availability.iter().map(|r| r.date.as_str()).collect();
    let participants = st.storage.count_participants(trip_id)?;
    if distinct_days.len() < CONSENSUS_MIN_DAYS
        || (availability.len() as i64) < participants * CONSENSUS_PER_PARTICIPANT
    {
        return Ok(());
    }
    let now = now_rfc3339();
    let message = st.storage.insert_message(
        trip_id,
        &NewMessage {
            user_id: None,
            kind: "agent".to_string(),
            content: CONSENSUS_MESSAGE.to_string(),
            metadata: None,
        },
        &now,
    )?;
    st.storage
        .set_trip_state(trip_id, TripState::VotingHighLevel.as_str(), &now)?;
    crate::tlog!(
        "trip {} reached date consensus, advancing to {}",
        trip_tag(trip_id),
        TripState::VotingHighLevel
    );
    st.broadcast(
        trip_id,
        ServerEvent::NewMessage {
            message: Some(message),
            timestamp: now,
        },
    );
    Ok(())
}
