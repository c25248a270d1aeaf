//! WebSocket connection manager for one (trip, user) pair.
//!
//! The socket task is the only concurrent part of a session. It parses
//! inbound frames into [`ServerEvent`]s and pushes them down an unbounded
//! channel; the session ingests them on its own schedule. Connection
//! trouble is never an error to the caller: the task retries with linear
//! backoff and, once retries are exhausted, leaves the shared connected
//! flag false for the view model to report.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::logging::{trip_tag, user_tag};
use crate::model::{ClientControl, ServerEvent, OBSERVER_USER_ID};

/// Base interval for linear reconnect backoff.
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);
/// Reconnect attempts per disconnect before giving up.
pub const MAX_RETRIES: u32 = 5;

/// Linear backoff: attempt 1 waits one base interval, attempt 2 two, and
/// so on. Attempt numbers start at 1.
pub fn next_backoff_delay(attempt: u32, base: Duration) -> Duration {
    base * attempt
}

pub struct ConnectionManager {
    trip_id: String,
    user_id: i64,
    connected: Arc<AtomicBool>,
    control_tx: Option<mpsc::UnboundedSender<ClientControl>>,
}

impl ConnectionManager {
    pub fn new(trip_id: impl Into<String>, user_id: i64) -> Self {
        Self {
            trip_id: trip_id.into(),
            user_id,
            connected: Arc::new(AtomicBool::new(false)),
            control_tx: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Start the socket task and return its event stream.
    ///
    /// For the observer sentinel no socket is opened and the returned
    /// stream ends immediately; everything else about the session still
    /// works read-only over HTTP.
    pub fn spawn(&mut self, ws_url: String) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        if self.user_id == OBSERVER_USER_ID {
            return events_rx;
        }

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        self.control_tx = Some(control_tx);
        tokio::spawn(run_socket(
            ws_url,
            self.trip_id.clone(),
            self.user_id,
            self.connected.clone(),
            events_tx,
            control_rx,
        ));
        events_rx
    }

    /// Best-effort presence ping; never queued, never retried.
    pub fn send_typing(&self) {
        if let Some(tx) = &self.control_tx {
            let _ = tx.send(ClientControl::Typing {
                trip_id: self.trip_id.clone(),
                user_id: self.user_id,
            });
        }
    }

    /// Graceful teardown: ask the task to announce `leave_trip` and stop.
    /// Dropping the manager without calling this also stops the task, just
    /// without the announcement.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.control_tx.take() {
            let _ = tx.send(ClientControl::LeaveTrip {
                trip_id: self.trip_id.clone(),
                user_id: self.user_id,
            });
        }
    }
}

async fn run_socket(
    ws_url: String,
    trip_id: String,
    user_id: i64,
    connected: Arc<AtomicBool>,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    mut control_rx: mpsc::UnboundedReceiver<ClientControl>,
) {
    let mut attempt = 0u32;

    'outer: loop {
        match tokio_tungstenite::connect_async(&ws_url).await {
            Ok((stream, _response)) => {
                attempt = 0;
                connected.store(true, Ordering::SeqCst);
                crate::tlog!(
                    "{} {} push channel connected",
                    trip_tag(&trip_id),
                    user_tag(user_id)
                );

                let (mut write, mut read) = stream.split();

                let join = ClientControl::JoinTrip {
                    trip_id: trip_id.clone(),
                    user_id,
                };
                if let Ok(text) = serde_json::to_string(&join) {
                    let _ = write.send(WsMessage::Text(text)).await;
                }

                loop {
                    tokio::select! {
                        frame = read.next() => match frame {
                            Some(Ok(WsMessage::Text(text))) => {
                                match ServerEvent::parse(&text) {
                                    Ok(event) => {
                                        if events_tx.send(event).is_err() {
                                            // Session is gone.
                                            break 'outer;
                                        }
                                    }
                                    Err(e) => {
                                        crate::tlog!(
                                            "{} dropping event: {}",
                                            trip_tag(&trip_id),
                                            e
                                        );
                                    }
                                }
                            }
                            Some(Ok(WsMessage::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                crate::tlog!("{} push channel error: {}", trip_tag(&trip_id), e);
                                break;
                            }
                        },
                        ctrl = control_rx.recv() => match ctrl {
                            Some(ctrl) => {
                                let leaving = matches!(ctrl, ClientControl::LeaveTrip { .. });
                                if let Ok(text) = serde_json::to_string(&ctrl) {
                                    let _ = write.send(WsMessage::Text(text)).await;
                                }
                                if leaving {
                                    break 'outer;
                                }
                            }
                            None => break 'outer,
                        },
                    }
                }

                connected.store(false, Ordering::SeqCst);
            }
            Err(e) => {
                crate::tlog!("{} push channel connect failed: {}", trip_tag(&trip_id), e);
            }
        }

        attempt += 1;
        if attempt > MAX_RETRIES {
            crate::tlog!(
                "{} push channel gave up after {} attempts",
                trip_tag(&trip_id),
                MAX_RETRIES
            );
            break;
        }
        tokio::time::sleep(next_backoff_delay(attempt, BACKOFF_BASE)).await;
    }

    connected.store(false, Ordering::SeqCst);
}
