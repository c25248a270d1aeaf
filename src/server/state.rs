//! Shared state for the packtrip server.

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use crate::model::ServerEvent;
use crate::server::config::EVENT_CHANNEL_CAPACITY;
use crate::storage::Storage;

pub struct AppState {
    pub storage: Storage,
    /// One fan-out channel per trip id, created on first use. Senders are
    /// kept for the life of the process so subscriber counts can hit zero
    /// without tearing the channel down.
    channels: HashMap<String, broadcast::Sender<ServerEvent>>,
    /// Live WebSocket connection count, shared with upgrade handlers.
    pub ws_connections: Arc<AtomicUsize>,
}

pub type SharedState = Arc<Mutex<AppState>>;

impl AppState {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            channels: HashMap::new(),
            ws_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn shared(storage: Storage) -> SharedState {
        Arc::new(Mutex::new(AppState::new(storage)))
    }

    /// Broadcast sender for a trip.
    pub fn channel(&mut self, trip_id: &str) -> broadcast::Sender<ServerEvent> {
        self.channels
            .entry(trip_id.to_string())
            .or_insert_with(|| broadcast::channel(EVENT_CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Push an event to every subscriber of a trip. A send error only means
    /// nobody is subscribed right now.
    pub fn broadcast(&mut self, trip_id: &str, event: ServerEvent) {
        let _ = self.channel(trip_id).send(event);
    }
}
