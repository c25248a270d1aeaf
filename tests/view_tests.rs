//! View-model projection tests: roadmap flags, day grouping and consensus,
//! per-emoji vote tallies, and author resolution.

use packtrip::model::{
    AvailabilityRecord, MessageRecord, OptionRecord, ParticipantRecord, TripRecord, TripState,
    UserRecord, VoteRecord,
};
use packtrip::sync::view::build_view;
use packtrip::sync::TripStore;

const TRIP: &str = "BCN-2024-001";

fn trip(state: &str) -> TripRecord {
    TripRecord {
        id: 1,
        trip_id: TRIP.to_string(),
        title: "Barcelona Trip Planning".to_string(),
        destination: Some("Barcelona".to_string()),
        start_date: None,
        end_date: None,
        budget: Some(3600),
        state: state.to_string(),
        invite_token: "deadbeefdeadbeef".to_string(),
        created_at: "2024-10-01T12:00:00Z".to_string(),
        updated_at: "2024-10-01T12:00:00Z".to_string(),
    }
}

fn participant(user_id: i64, name: &str) -> ParticipantRecord {
    ParticipantRecord {
        id: user_id,
        trip_id: TRIP.to_string(),
        user_id,
        role: "traveler".to_string(),
        is_online: false,
        joined_at: "2024-10-01T12:00:00Z".to_string(),
        has_submitted_preferences: false,
        has_submitted_availability: false,
        user: Some(UserRecord {
            id: user_id,
            username: name.to_lowercase(),
            display_name: name.to_string(),
            avatar: None,
            color: None,
            home_city: None,
        }),
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

fn store_with(state: &str, participants: Vec<ParticipantRecord>) -> TripStore {
    let mut store = TripStore::new();
    store.replace_trip(trip(state));
    store.replace_participants(participants);
    store.replace_messages(Vec::new());
    store.replace_votes(Vec::new());
    store.replace_options(Vec::new());
    store.replace_availability(Vec::new());
    store.replace_preferences(Vec::new());
    store
}

#[test]
fn voting_state_marks_the_roadmap() {
    let store = store_with("VOTING_HIGH_LEVEL", Vec::new());
    let view = build_view(&store, true, 1);

    assert_eq!(view.state, TripState::VotingHighLevel);
    assert_eq!(view.state_label, "Voting on itineraries");

    let flags: Vec<(bool, bool)> = view
        .milestones
        .iter()
        .map(|m| (m.completed, m.current))
        .collect();
    // Dates collected; voting in progress; later milestones untouched.
    assert_eq!(
        flags,
        vec![(true, false), (false, true), (false, false), (false, false)]
    );
}

#[test]
fn unknown_state_renders_raw_and_marks_nothing() {
    let store = store_with("SEAT_SELECTION", Vec::new());
    let view = build_view(&store, true, 1);

    assert_eq!(view.state, TripState::Unknown("SEAT_SELECTION".to_string()));
    assert_eq!(view.state_label, "SEAT_SELECTION");
    assert!(view.milestones.iter().all(|m| !m.completed && !m.current));
}

#[test]
fn shared_days_reach_consensus() {
    let mut store = store_with(
        "COLLECTING_DATES",
        vec![participant(1, "Alice"), participant(2, "Bob")],
    );
    store.replace_availability(vec![
        // Both free on the 21st.
        availability(1, 1, "2024-10-21", true),
        availability(2, 2, "2024-10-21", true),
        // Only Alice free on the 22nd; Bob said no outright.
        availability(3, 1, "2024-10-22", true),
        availability(4, 2, "2024-10-22", false),
        // Only Bob answered for the 23rd.
        availability(5, 2, "2024-10-23", true),
    ]);

    let view = build_view(&store, true, 1);

    let dates: Vec<&str> = view.days.iter().map(|d| d.date.as_str()).collect();
    assert_eq!(dates, vec!["2024-10-21", "2024-10-22", "2024-10-23"]);

    assert_eq!(view.days[0].available_user_ids, vec![1, 2]);
    assert!(view.days[0].consensus);
    assert_eq!(view.days[1].available_user_ids, vec![1]);
    assert!(!view.days[1].consensus);
    assert_eq!(view.days[2].available_user_ids, vec![2]);
    assert!(!view.days[2].consensus);

    assert_eq!(view.consensus_days, 1);
}

#[test]
fn consensus_needs_at_least_one_participant() {
    // Availability rows without a participant roster can never be consensus.
    let mut store = store_with("COLLECTING_DATES", Vec::new());
    store.replace_availability(vec![availability(1, 1, "2024-10-21", true)]);

    let view = build_view(&store, true, 1);
    assert_eq!(view.days.len(), 1);
    assert!(!view.days[0].consensus);
    assert_eq!(view.consensus_days, 0);
}

#[test]
fn emoji_tallies_distinguish_exact_triples() {
    let mut store = store_with(
        "VOTING_HIGH_LEVEL",
        vec![participant(1, "Alice"), participant(2, "Bob")],
    );
    store.replace_options(vec![OptionRecord {
        id: 1,
        trip_id: TRIP.to_string(),
        option_id: "beach-nightlife".to_string(),
        kind: "itinerary".to_string(),
        title: "Beach & Nightlife".to_string(),
        description: None,
        price: Some(1280),
        image: None,
        metadata: None,
        created_at: "2024-10-01T12:00:00Z".to_string(),
    }]);
    store.replace_votes(vec![
        vote(1, 1, "beach-nightlife", "👍"),
        vote(2, 2, "beach-nightlife", "👍"),
        // Alice's second emoji on the same option is its own tally.
        vote(3, 1, "beach-nightlife", "❤️"),
    ]);

    let view = build_view(&store, true, 1);
    let option = &view.options[0];
    assert_eq!(option.tallies.len(), 2);

    let thumbs = option.tallies.iter().find(|t| t.emoji == "👍").unwrap();
    assert_eq!(thumbs.count, 2);
    assert!(thumbs.mine);

    let heart = option.tallies.iter().find(|t| t.emoji == "❤️").unwrap();
    assert_eq!(heart.count, 1);
    assert!(heart.mine);

    // Seen from Bob's side, the heart belongs to someone else.
    let view = build_view(&store, true, 2);
    let heart = view.options[0].tallies.iter().find(|t| t.emoji == "❤️").unwrap();
    assert!(!heart.mine);
}

#[test]
fn message_authors_resolve_through_the_roster() {
    let mut store = store_with(
        "COLLECTING_DATES",
        vec![participant(1, "Alice"), participant(2, "Bob")],
    );
    store.replace_messages(vec![
        MessageRecord {
            id: 1,
            trip_id: TRIP.to_string(),
            user_id: Some(2),
            kind: "user".to_string(),
            content: "works for me 👍".to_string(),
            metadata: None,
            timestamp: "2024-10-01T12:00:00Z".to_string(),
        },
        MessageRecord {
            id: 2,
            trip_id: TRIP.to_string(),
            user_id: None,
            kind: "agent".to_string(),
            content: "Mark the days that work for you.".to_string(),
            metadata: None,
            timestamp: "not a timestamp".to_string(),
        },
    ]);

    let view = build_view(&store, true, 1);

    assert_eq!(view.messages[0].author.as_deref(), Some("Bob"));
    assert!(!view.messages[0].mine);
    assert!(view.messages[0].timestamp.is_some());

    assert_eq!(view.messages[1].author, None);
    assert_eq!(view.messages[1].kind, "agent");
    // Unparseable wire timestamps degrade to None instead of failing.
    assert!(view.messages[1].timestamp.is_none());

    let view = build_view(&store, true, 2);
    assert!(view.messages[0].mine);
}

#[test]
fn syncing_tracks_stale_collections() {
    let store = TripStore::new();
    let view = build_view(&store, false, 1);
    assert!(view.syncing);
    assert!(!view.connected);

    let store = store_with("COLLECTING_DATES", Vec::new());
    let view = build_view(&store, true, 1);
    assert!(!view.syncing);
    assert!(view.connected);
}
