//! WebSocket push channel.
//!
//! A connection is inert until its `join_trip` control message arrives; it
//! then subscribes to the trip's fan-out channel and relays events until
//! the socket closes or a `leave_trip` hands it back to the inert phase.

use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::Response;
use tokio::sync::broadcast;

use crate::logging::{trip_tag, user_tag};
use crate::model::{now_rfc3339, ClientControl, ServerEvent};
use crate::server::config::MAX_WS_CONNECTIONS;
use crate::server::state::SharedState;
use crate::server::utils::api_error;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    let connections = { state.lock().await.ws_connections.clone() };
    if connections.load(Ordering::Relaxed) >= MAX_WS_CONNECTIONS {
        return api_error(StatusCode::SERVICE_UNAVAILABLE, "too many connections");
    }
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: SharedState) {
    let connections = { state.lock().await.ws_connections.clone() };
    connections.fetch_add(1, Ordering::Relaxed);
    crate::tlog!("websocket connected");

    'outer: loop {
        // Inert phase: wait for a join_trip.
        let (trip_id, user_id, mut rx) = loop {
            match socket.recv().await {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientControl>(&text) {
                        Ok(ClientControl::JoinTrip { trip_id, user_id }) => {
                            match join_trip(&state, &trip_id, user_id).await {
                                Some(rx) => break (trip_id, user_id, rx),
                                None => continue,
                            }
                        }
                        // typing/leave before any join is meaningless.
                        Ok(_) => {}
                        Err(e) => crate::tlog!("dropping malformed control message: {}", e),
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if socket.send(Message::Pong(data)).await.is_err() {
                        break 'outer;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break 'outer,
                _ => {}
            }
        };

        crate::tlog!(
            "user {} joined trip {} on the push channel",
            user_tag(user_id),
            trip_tag(&trip_id)
        );
        let left_voluntarily = joined_loop(&mut socket, &state, &trip_id, user_id, &mut rx).await;
        depart(&state, &trip_id, user_id).await;
        if !left_voluntarily {
            break;
        }
        // leave_trip with the socket still open: back to the inert phase.
    }

    connections.fetch_sub(1, Ordering::Relaxed);
    crate::tlog!("websocket disconnected");
}

/// Relay trip events to the socket and control messages back. Returns true
/// when the client sent `leave_trip` (socket still usable), false when the
/// socket is gone.
async fn joined_loop(
    socket: &mut WebSocket,
    state: &SharedState,
    trip_id: &str,
    user_id: i64,
    rx: &mut broadcast::Receiver<ServerEvent>,
) -> bool {
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        let text = match serde_json::to_string(&event) {
                            Ok(t) => t,
                            Err(_) => continue,
                        };
                        if socket.send(Message::Text(text)).await.is_err() {
                            return false;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        crate::tlog!(
                            "websocket for {} lagged by {} events",
                            user_tag(user_id),
                            n
                        );
                        let missed = ServerEvent::EventsMissed { missed: n };
                        let text = match serde_json::to_string(&missed) {
                            Ok(t) => t,
                            Err(_) => continue,
                        };
                        if socket.send(Message::Text(text)).await.is_err() {
                            return false;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return false,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientControl>(&text) {
                            Ok(ClientControl::Typing { user_id: typist, .. }) => {
                                let mut st = state.lock().await;
                                st.broadcast(trip_id, ServerEvent::Typing {
                                    user_id: typist,
                                    timestamp: now_rfc3339(),
                                });
                            }
                            Ok(ClientControl::LeaveTrip { .. }) => return true,
                            // Joining twice over one socket is ignored.
                            Ok(ClientControl::JoinTrip { .. }) => {}
                            Err(e) => crate::tlog!("dropping malformed control message: {}", e),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            return false;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return false,
                    _ => {}
                }
            }
        }
    }
}

/// Subscribe the socket to a trip's channel and mark its user online. The
/// subscription happens before the `user_joined` broadcast, so the joiner
/// sees its own arrival.
async fn join_trip(
    state: &SharedState,
    trip_id: &str,
    user_id: i64,
) -> Option<broadcast::Receiver<ServerEvent>> {
    let mut st = state.lock().await;
    match st.storage.get_trip(trip_id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            crate::tlog!("websocket join for unknown trip {}", trip_tag(trip_id));
            return None;
        }
        Err(e) => {
            crate::tlog!("websocket join failed: {}", e);
            return None;
        }
    }
    if let Err(e) = st.storage.set_participant_online(trip_id, user_id, true) {
        crate::tlog!("failed to mark {} online: {}", user_tag(user_id), e);
    }
    let rx = st.channel(trip_id).subscribe();
    st.broadcast(
        trip_id,
        ServerEvent::UserJoined {
            user_id,
            timestamp: now_rfc3339(),
        },
    );
    Some(rx)
}

async fn depart(state: &SharedState, trip_id: &str, user_id: i64) {
    let mut st = state.lock().await;
    if let Err(e) = st.storage.set_participant_online(trip_id, user_id, false) {
        crate::tlog!("failed to mark {} offline: {}", user_tag(user_id), e);
    }
    st.broadcast(
        trip_id,
        ServerEvent::UserLeft {
            user_id,
            timestamp: now_rfc3339(),
        },
    );
}
