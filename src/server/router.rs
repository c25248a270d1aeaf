//! Axum router construction.

use axum::routing::{get, post};
use axum::Router;

use crate::server::handlers;
use crate::server::state::SharedState;

/// Build the complete Axum router: REST API plus the WebSocket push channel.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health::health_handler))
        // Users
        .route(
            "/api/users",
            get(handlers::users::list_users_handler).post(handlers::users::create_user_handler),
        )
        // Trips
        .route(
            "/api/trips",
            get(handlers::trips::list_trips_handler).post(handlers::trips::create_trip_handler),
        )
        .route("/api/trips/join", post(handlers::trips::join_trip_handler))
        .route("/api/trips/:trip_id", get(handlers::trips::get_trip_handler))
        .route(
            "/api/trips/:trip_id/participants",
            get(handlers::participants::list_participants_handler),
        )
        // Transcript
        .route(
            "/api/trips/:trip_id/messages",
            get(handlers::messages::list_messages_handler)
                .post(handlers::messages::create_message_handler),
        )
        .route(
            "/api/trips/:trip_id/messages/:message_id",
            axum::routing::delete(handlers::messages::delete_message_handler),
        )
        // Votes and options
        .route(
            "/api/trips/:trip_id/votes",
            get(handlers::votes::list_votes_handler).post(handlers::votes::create_vote_handler),
        )
        .route(
            "/api/trips/:trip_id/options",
            get(handlers::options::list_options_handler)
                .post(handlers::options::ingest_options_handler),
        )
        // Availability calendar
        .route(
            "/api/trips/:trip_id/availability",
            get(handlers::availability::list_availability_handler)
                .post(handlers::availability::create_availability_handler),
        )
        .route(
            "/api/trips/:trip_id/availability/batch",
            post(handlers::availability::batch_availability_handler),
        )
        // Preferences
        .route(
            "/api/trips/:trip_id/preferences",
            get(handlers::preferences::list_preferences_handler)
                .post(handlers::preferences::create_preferences_handler),
        )
        .route(
            "/api/trips/:trip_id/preferences/missing",
            get(handlers::preferences::missing_preferences_handler),
        )
        // Push channel
        .route("/ws", get(handlers::websocket::ws_handler))
        .with_state(state)
}
