//! One user's live session on one trip.
//!
//! The session owns the store, the event log, the dispatcher, and the
//! connection manager, and is the single writer for all of them. The usual
//! cycle is: mutate (or receive events), then [`TripSession::settle`] to
//! reconcile, then [`TripSession::view`] to render.
//!
//! HTTP calls are blocking; the session expects to run inside a tokio
//! runtime (the push channel task is spawned on it) but off the hot path
//! of other tasks, e.g. on a blocking thread or a dedicated loop.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::model::{
    DayEntry, NewMessage, PreferencesSubmit, ServerEvent, VoteSubmit, OBSERVER_USER_ID,
};
use crate::sync::api::{ApiClient, ApiError};
use crate::sync::connection::ConnectionManager;
use crate::sync::dispatch::EventDispatcher;
use crate::sync::mutation::{self, MutationReceipt};
use crate::sync::store::{Collection, TripStore};
use crate::sync::view::{build_view, TripView};

#[derive(Debug)]
pub enum SessionError {
    Api(ApiError),
    TripNotFound(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Api(error) => write!(f, "{error}"),
            SessionError::TripNotFound(trip_id) => write!(f, "no such trip: {trip_id}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ApiError> for SessionError {
    fn from(error: ApiError) -> Self {
        SessionError::Api(error)
    }
}

pub struct TripSession {
    api: ApiClient,
    trip_id: String,
    user_id: i64,
    store: TripStore,
    event_log: Vec<ServerEvent>,
    dispatcher: EventDispatcher,
    connection: ConnectionManager,
    events: mpsc::UnboundedReceiver<ServerEvent>,
}

impl TripSession {
    /// Open a session: verify the trip exists, start the push channel
    /// (unless `user_id` is the observer sentinel), and load the initial
    /// state.
    pub fn open(server_url: &str, trip_id: &str, user_id: i64) -> Result<Self, SessionError> {
        let api = ApiClient::new(server_url);
        if let Err(error) = api.get_trip(trip_id) {
            if error.is_not_found() {
                return Err(SessionError::TripNotFound(trip_id.to_string()));
            }
            return Err(error.into());
        }

        let mut connection = ConnectionManager::new(trip_id, user_id);
        let events = connection.spawn(api.ws_url());

        let mut session = Self {
            api,
            trip_id: trip_id.to_string(),
            user_id,
            store: TripStore::new(),
            event_log: Vec::new(),
            dispatcher: EventDispatcher::new(),
            connection,
            events,
        };
        session.settle()?;
        Ok(session)
    }

    pub fn trip_id(&self) -> &str {
        &self.trip_id
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn is_observer(&self) -> bool {
        self.user_id == OBSERVER_USER_ID
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn store(&self) -> &TripStore {
        &self.store
    }

    pub fn event_log(&self) -> &[ServerEvent] {
        &self.event_log
    }

    /// Move every event the socket has delivered so far into the log and
    /// dispatch the new ones. Returns how many events arrived.
    pub fn pump_events(&mut self) -> usize {
        let mut arrived = 0;
        while let Ok(event) = self.events.try_recv() {
            self.event_log.push(event);
            arrived += 1;
        }
        self.dispatcher.drain(&self.event_log, &mut self.store);
        arrived
    }

    /// Await one event, ingest it, and dispatch. Returns it for display;
    /// `None` means the stream has ended.
    pub async fn recv_event(&mut self) -> Option<ServerEvent> {
        let event = self.events.recv().await?;
        self.event_log.push(event.clone());
        self.dispatcher.drain(&self.event_log, &mut self.store);
        Some(event)
    }

    /// Blocking variant of [`TripSession::pump_events`] that polls until at
    /// least one event arrives or the timeout passes.
    pub fn wait_for_events(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let arrived = self.pump_events();
            if arrived > 0 {
                return arrived;
            }
            if Instant::now() >= deadline {
                return 0;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    /// Ingest pending events, then refetch every stale collection. A fetch
    /// error leaves that collection stale for the next settle.
    pub fn settle(&mut self) -> Result<(), ApiError> {
        self.pump_events();
        for collection in self.store.stale_collections() {
            match collection {
                Collection::Trip => {
                    let trip = self.api.get_trip(&self.trip_id)?;
                    self.store.replace_trip(trip);
                }
                Collection::Participants => {
                    let records = self.api.list_participants(&self.trip_id)?;
                    self.store.replace_participants(records);
                }
                Collection::Messages => {
                    let records = self.api.list_messages(&self.trip_id)?;
                    self.store.replace_messages(records);
                }
                Collection::Votes => {
                    let records = self.api.list_votes(&self.trip_id)?;
                    self.store.replace_votes(records);
                }
                Collection::Options => {
                    let records = self.api.list_options(&self.trip_id)?;
                    self.store.replace_options(records);
                }
                Collection::Availability => {
                    let records = self.api.list_availability(&self.trip_id)?;
                    self.store.replace_availability(records);
                }
                Collection::Preferences => {
                    let records = self.api.list_preferences(&self.trip_id)?;
                    let summary = self.api.missing_preferences(&self.trip_id)?;
                    self.store.replace_preferences(records);
                    self.store.replace_missing_preferences(summary);
                }
            }
        }
        Ok(())
    }

    /// Force a full refetch of every collection, for callers without a live
    /// push channel.
    pub fn refresh(&mut self) -> Result<(), ApiError> {
        self.store.mark_all_stale();
        self.settle()
    }

    // -- mutations ----------------------------------------------------------

    pub fn send_message(&mut self, content: &str) -> MutationReceipt {
        let message = NewMessage {
            user_id: Some(self.user_id),
            kind: "user".to_string(),
            content: content.to_string(),
            metadata: None,
        };
        mutation::send_message(&self.api, &mut self.store, &self.trip_id, &message)
    }

    pub fn toggle_vote(&mut self, option_id: &str, emoji: &str) -> MutationReceipt {
        let vote = VoteSubmit {
            user_id: self.user_id,
            option_id: option_id.to_string(),
            emoji: emoji.to_string(),
        };
        mutation::toggle_vote(&self.api, &mut self.store, &self.trip_id, &vote)
    }

    pub fn set_availability(&mut self, date: &str, available: bool) -> MutationReceipt {
        mutation::set_availability(
            &self.api,
            &mut self.store,
            &self.trip_id,
            self.user_id,
            date,
            available,
        )
    }

    pub fn set_availability_batch(&mut self, entries: &[DayEntry]) -> MutationReceipt {
        mutation::set_availability_batch(
            &self.api,
            &mut self.store,
            &self.trip_id,
            self.user_id,
            entries,
        )
    }

    pub fn submit_preferences(&mut self, mut submit: PreferencesSubmit) -> MutationReceipt {
        submit.user_id = self.user_id;
        mutation::submit_preferences(&self.api, &mut self.store, &self.trip_id, &submit)
    }

    /// Plain (non-optimistic) delete, used for clearing transient cards.
    pub fn delete_message(&mut self, message_id: i64) -> Result<(), ApiError> {
        self.api.delete_message(&self.trip_id, message_id)?;
        self.store.mark_stale(Collection::Messages);
        Ok(())
    }

    pub fn send_typing(&self) {
        self.connection.send_typing();
    }

    pub fn view(&self) -> TripView {
        build_view(&self.store, self.is_connected(), self.user_id)
    }

    /// Announce `leave_trip` and stop the push channel task.
    pub fn close(&mut self) {
        self.connection.shutdown();
    }
}
