//! Optimistic-mutation protocol tests against a server that is never there.
//!
//! Every write here targets `http://127.0.0.1:1`, so the remote call fails
//! and the rollback path runs. The contract under test: a failed mutation
//! restores the affected collection to its exact pre-mutation contents, the
//! receipt reports `RolledBack` with the error, and only the collections the
//! protocol says to refetch are marked stale.

use packtrip::model::{
    AvailabilityRecord, DayEntry, MessageRecord, NewMessage, PreferencesSubmit, TripRecord,
    VoteRecord, VoteSubmit,
};
use packtrip::sync::mutation::{self, MutationError, MutationKind, MutationPhase};
use packtrip::sync::{ApiClient, Collection, TripStore};

const TRIP: &str = "BCN-2024-001";

fn dead_api() -> ApiClient {
    // Port 1 is never listening; connects fail immediately.
    ApiClient::new("http://127.0.0.1:1")
}

fn vote(id: i64, user_id: i64, option_id: &str, emoji: &str) -> VoteRecord {
    VoteRecord {
        id,
        trip_id: TRIP.to_string(),
        user_id,
        option_id: option_id.to_string(),
        emoji: emoji.to_string(),
        timestamp: "2024-10-01T12:00:00Z".to_string(),
    }
}

fn availability(id: i64, user_id: i64, date: &str, available: bool) -> AvailabilityRecord {
    AvailabilityRecord {
        id,
        trip_id: TRIP.to_string(),
        user_id,
        date: date.to_string(),
        available,
    }
}

fn message(id: i64, content: &str) -> MessageRecord {
    MessageRecord {
        id,
        trip_id: TRIP.to_string(),
        user_id: Some(1),
        kind: "user".to_string(),
        content: content.to_string(),
        metadata: None,
        timestamp: "2024-10-01T12:00:00Z".to_string(),
    }
}

/// A store that has already settled once: populated collections, no stale
/// flags.
fn settled_store() -> TripStore {
    let mut store = TripStore::new();
    store.replace_trip(TripRecord {
        id: 1,
        trip_id: TRIP.to_string(),
        title: "Barcelona Trip Planning".to_string(),
        destination: Some("Barcelona".to_string()),
        start_date: None,
        end_date: None,
        budget: Some(3600),
        state: "COLLECTING_DATES".to_string(),
        invite_token: "deadbeefdeadbeef".to_string(),
        created_at: "2024-10-01T12:00:00Z".to_string(),
        updated_at: "2024-10-01T12:00:00Z".to_string(),
    });
    store.replace_participants(Vec::new());
    store.replace_messages(vec![message(1, "hello"), message(2, "shall we vote?")]);
    store.replace_votes(vec![
        vote(7, 1, "beach-nightlife", "👍"),
        vote(8, 2, "culture-history", "❤️"),
    ]);
    store.replace_options(Vec::new());
    store.replace_availability(vec![availability(3, 1, "2024-10-21", true)]);
    store.replace_preferences(Vec::new());
    assert!(!store.has_stale());
    store
}

#[test]
fn failed_vote_add_rolls_back_to_the_exact_snapshot() {
    let api = dead_api();
    let mut store = settled_store();
    let before = store.votes.clone();

    let submit = VoteSubmit {
        user_id: 1,
        option_id: "culture-history".to_string(),
        emoji: "🔥".to_string(),
    };
    let receipt = mutation::toggle_vote(&api, &mut store, TRIP, &submit);

    assert_eq!(receipt.kind, MutationKind::ToggleVote);
    assert_eq!(receipt.phase, MutationPhase::RolledBack);
    assert!(!receipt.committed());
    assert!(matches!(receipt.error, Some(MutationError::Api(_))));

    // Not just "no new record": the collection is byte-for-byte what it was.
    assert_eq!(store.votes, before);
    // The refetch still happens, so a half-landed server write cannot hide.
    assert!(store.is_stale(Collection::Votes));
    assert!(!store.is_stale(Collection::Messages));
}

#[test]
fn failed_vote_removal_restores_the_removed_record() {
    let api = dead_api();
    let mut store = settled_store();
    let before = store.votes.clone();

    // This exact (user, option, emoji) triple exists, so the speculative
    // patch removes it; the rollback must put it back.
    let submit = VoteSubmit {
        user_id: 1,
        option_id: "beach-nightlife".to_string(),
        emoji: "👍".to_string(),
    };
    let receipt = mutation::toggle_vote(&api, &mut store, TRIP, &submit);

    assert_eq!(receipt.phase, MutationPhase::RolledBack);
    assert_eq!(store.votes, before);
    assert!(store.votes.iter().any(|v| v.id == 7));
}

#[test]
fn failed_availability_write_restores_the_overwritten_flag() {
    let api = dead_api();
    let mut store = settled_store();
    let before = store.availability.clone();

    // Flips the existing record for that day in place, then fails remotely.
    let receipt = mutation::set_availability(&api, &mut store, TRIP, 1, "2024-10-21", false);

    assert_eq!(receipt.kind, MutationKind::SetAvailability);
    assert_eq!(receipt.phase, MutationPhase::RolledBack);
    assert_eq!(store.availability, before);
    assert!(store.availability[0].available);
    assert!(store.is_stale(Collection::Availability));
}

#[test]
fn rejected_dates_never_touch_the_store() {
    let api = dead_api();
    let mut store = settled_store();
    let before = store.availability.clone();

    let receipt = mutation::set_availability(&api, &mut store, TRIP, 1, "next tuesday", true);

    assert_eq!(receipt.phase, MutationPhase::RolledBack);
    assert!(matches!(receipt.error, Some(MutationError::Date(_))));
    assert_eq!(store.availability, before);
    // Rejected input means no remote attempt, so nothing needs refetching.
    assert!(!store.is_stale(Collection::Availability));
}

#[test]
fn one_bad_date_rejects_a_whole_batch_before_any_patch() {
    let api = dead_api();
    let mut store = settled_store();
    let before = store.availability.clone();

    let entries = vec![
        DayEntry {
            date: "2024-10-22".to_string(),
            available: true,
        },
        DayEntry {
            date: "not-a-date".to_string(),
            available: false,
        },
        DayEntry {
            date: "2024-10-23".to_string(),
            available: true,
        },
    ];
    let receipt = mutation::set_availability_batch(&api, &mut store, TRIP, 1, &entries);

    assert_eq!(receipt.kind, MutationKind::SetAvailabilityBatch);
    assert_eq!(receipt.phase, MutationPhase::RolledBack);
    assert!(matches!(receipt.error, Some(MutationError::Date(_))));
    // The first entry was valid, but nothing was applied for it either.
    assert_eq!(store.availability, before);
    assert!(!store.is_stale(Collection::Availability));
}

#[test]
fn failed_batch_rolls_back_every_entry() {
    let api = dead_api();
    let mut store = settled_store();
    let before = store.availability.clone();

    let entries = vec![
        DayEntry {
            date: "2024-10-21".to_string(),
            available: false,
        },
        DayEntry {
            date: "2024-10-22".to_string(),
            available: true,
        },
    ];
    let receipt = mutation::set_availability_batch(&api, &mut store, TRIP, 1, &entries);

    assert_eq!(receipt.phase, MutationPhase::RolledBack);
    assert!(matches!(receipt.error, Some(MutationError::Api(_))));
    assert_eq!(store.availability, before);
    assert!(store.is_stale(Collection::Availability));
}

#[test]
fn failed_send_message_leaves_the_log_alone() {
    let api = dead_api();
    let mut store = settled_store();
    let before = store.messages.clone();

    let new_message = NewMessage {
        user_id: Some(1),
        kind: "user".to_string(),
        content: "anyone free in October?".to_string(),
        metadata: None,
    };
    let receipt = mutation::send_message(&api, &mut store, TRIP, &new_message);

    assert_eq!(receipt.kind, MutationKind::SendMessage);
    assert_eq!(receipt.phase, MutationPhase::RolledBack);
    assert_eq!(store.messages, before);
    // No speculative insert was made, so there is nothing to reconcile.
    assert!(!store.is_stale(Collection::Messages));
}

#[test]
fn failed_preferences_submit_marks_nothing_stale() {
    let api = dead_api();
    let mut store = settled_store();
    let before = store.preferences.clone();

    let submit = PreferencesSubmit {
        user_id: 1,
        raw_text: Some("beach over museums, budget around 1200".to_string()),
        ..PreferencesSubmit::default()
    };
    let receipt = mutation::submit_preferences(&api, &mut store, TRIP, &submit);

    assert_eq!(receipt.kind, MutationKind::SubmitPreferences);
    assert_eq!(receipt.phase, MutationPhase::RolledBack);
    assert_eq!(store.preferences, before);
    assert!(!store.is_stale(Collection::Preferences));
    assert!(!store.is_stale(Collection::Participants));
}

#[test]
fn back_to_back_failures_leave_the_store_untouched() {
    let api = dead_api();
    let mut store = settled_store();
    let votes_before = store.votes.clone();
    let availability_before = store.availability.clone();

    let submit = VoteSubmit {
        user_id: 2,
        option_id: "beach-nightlife".to_string(),
        emoji: "🎉".to_string(),
    };
    mutation::toggle_vote(&api, &mut store, TRIP, &submit);
    mutation::toggle_vote(&api, &mut store, TRIP, &submit);
    mutation::set_availability(&api, &mut store, TRIP, 2, "2024-10-24", true);

    assert_eq!(store.votes, votes_before);
    assert_eq!(store.availability, availability_before);
}
