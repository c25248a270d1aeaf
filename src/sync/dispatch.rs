//! Maps inbound push events to targeted cache invalidations.
//!
//! The dispatcher never refetches anything itself; it only marks collections
//! stale. Refetching is the settle step's job, which makes duplicate event
//! delivery harmless: a second invalidation of an already-stale collection
//! changes nothing.

use crate::model::ServerEvent;
use crate::sync::store::{Collection, TripStore, ALL_COLLECTIONS};

/// Which collections one event invalidates.
///
/// Typing and unknown kinds invalidate nothing. `events_missed` means the
/// broadcast channel dropped events we never saw, so everything may have
/// changed.
pub fn invalidations(event: &ServerEvent) -> &'static [Collection] {
    match event {
        ServerEvent::NewMessage { .. } => &[Collection::Messages, Collection::Trip],
        ServerEvent::MessageDeleted { .. } => &[Collection::Messages],
        ServerEvent::VoteUpdate { .. } => &[Collection::Votes],
        ServerEvent::AvailabilityUpdate { .. } | ServerEvent::AvailabilityBatchUpdate { .. } => {
            &[Collection::Availability]
        }
        ServerEvent::UserJoined { .. } | ServerEvent::UserLeft { .. } => {
            &[Collection::Participants]
        }
        ServerEvent::Typing { .. } => &[],
        ServerEvent::PreferencesUpdate { .. } => {
            &[Collection::Preferences, Collection::Participants]
        }
        ServerEvent::OptionsGenerated { .. } => {
            &[Collection::Options, Collection::Messages, Collection::Trip]
        }
        ServerEvent::EventsMissed { .. } => &ALL_COLLECTIONS,
        ServerEvent::Unknown { .. } => &[],
    }
}

/// Tracks how far into the session's append-only event log dispatching has
/// progressed. The cursor is what makes draining idempotent: re-running
/// drain over the same log is a no-op, and growing the log dispatches only
/// the new suffix.
pub struct EventDispatcher {
    processed: usize,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { processed: 0 }
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Dispatch every event appended since the last drain, in arrival
    /// order. Returns how many events were newly dispatched.
    pub fn drain(&mut self, log: &[ServerEvent], store: &mut TripStore) -> usize {
        if self.processed >= log.len() {
            return 0;
        }
        let fresh = &log[self.processed..];
        for event in fresh {
            for collection in invalidations(event) {
                store.mark_stale(*collection);
            }
        }
        let count = fresh.len();
        self.processed = log.len();
        count
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drained_store(log: &[ServerEvent]) -> TripStore {
        let mut store = fresh_store();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.drain(log, &mut store);
        store
    }

    // A store with nothing stale, so marks are visible.
    fn fresh_store() -> TripStore {
        let mut store = TripStore::new();
        for collection in ALL_COLLECTIONS {
            match collection {
                Collection::Trip => {}
                Collection::Participants => store.replace_participants(Vec::new()),
                Collection::Messages => store.replace_messages(Vec::new()),
                Collection::Votes => store.replace_votes(Vec::new()),
                Collection::Options => store.replace_options(Vec::new()),
                Collection::Availability => store.replace_availability(Vec::new()),
                Collection::Preferences => store.replace_preferences(Vec::new()),
            }
        }
        store.replace_trip(crate::model::TripRecord {
            id: 1,
            trip_id: "T".to_string(),
            title: "t".to_string(),
            destination: None,
            start_date: None,
            end_date: None,
            budget: None,
            state: "INIT".to_string(),
            invite_token: "tok".to_string(),
            created_at: "2024-10-01T00:00:00Z".to_string(),
            updated_at: "2024-10-01T00:00:00Z".to_string(),
        });
        store
    }

    #[test]
    fn test_vote_event_invalidates_only_votes() {
        let store = drained_store(&[ServerEvent::VoteUpdate {
            vote: crate::model::VoteRecord {
                id: 1,
                trip_id: "T".to_string(),
                user_id: 1,
                option_id: "o".to_string(),
                emoji: "👍".to_string(),
                timestamp: "2024-10-01T00:00:00Z".to_string(),
            },
            removed: false,
            timestamp: "2024-10-01T00:00:00Z".to_string(),
        }]);
        assert_eq!(store.stale_collections(), vec![Collection::Votes]);
    }

    #[test]
    fn test_new_message_invalidates_messages_and_trip() {
        let store = drained_store(&[ServerEvent::NewMessage {
            message: None,
            timestamp: "2024-10-01T00:00:00Z".to_string(),
        }]);
        assert_eq!(
            store.stale_collections(),
            vec![Collection::Trip, Collection::Messages]
        );
    }

    #[test]
    fn test_typing_and_unknown_invalidate_nothing() {
        let store = drained_store(&[
            ServerEvent::Typing {
                user_id: 2,
                timestamp: "2024-10-01T00:00:00Z".to_string(),
            },
            ServerEvent::Unknown {
                kind: "seat_map_ready".to_string(),
            },
        ]);
        assert!(!store.has_stale());
    }

    #[test]
    fn test_events_missed_invalidates_everything() {
        let store = drained_store(&[ServerEvent::EventsMissed { missed: 12 }]);
        assert_eq!(store.stale_collections(), ALL_COLLECTIONS.to_vec());
    }

    #[test]
    fn test_offset_advances_and_never_redispatches() {
        let mut store = fresh_store();
        let mut dispatcher = EventDispatcher::new();

        let e1 = ServerEvent::Typing {
            user_id: 1,
            timestamp: "2024-10-01T00:00:00Z".to_string(),
        };
        let e2 = ServerEvent::VoteUpdate {
            vote: crate::model::VoteRecord {
                id: 1,
                trip_id: "T".to_string(),
                user_id: 1,
                option_id: "o".to_string(),
                emoji: "👍".to_string(),
                timestamp: "2024-10-01T00:00:00Z".to_string(),
            },
            removed: false,
            timestamp: "2024-10-01T00:00:00Z".to_string(),
        };
        let e3 = ServerEvent::UserJoined {
            user_id: 3,
            timestamp: "2024-10-01T00:00:01Z".to_string(),
        };

        let mut log = vec![e1, e2];
        assert_eq!(dispatcher.drain(&log, &mut store), 2);
        assert_eq!(dispatcher.processed(), 2);

        // Votes settled between drains
        store.replace_votes(Vec::new());

        log.push(e3);
        assert_eq!(dispatcher.drain(&log, &mut store), 1);
        assert_eq!(dispatcher.processed(), 3);

        // Only the third event's invalidation landed; votes stayed fresh
        assert_eq!(store.stale_collections(), vec![Collection::Participants]);

        // Draining again with no new events is a no-op
        assert_eq!(dispatcher.drain(&log, &mut store), 0);
    }
}
