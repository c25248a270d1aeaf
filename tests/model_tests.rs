//! Wire-model tests: lifecycle ordering, day-key normalization, and the
//! push-event vocabulary (parsing, camelCase ids, unknown-kind tolerance).

use packtrip::model::{
    day_key, format_day, ClientControl, DateError, EventParseError, ServerEvent, TripState,
    KNOWN_EVENT_KINDS, STATE_SEQUENCE,
};

// ---------------------------------------------------------------------------
// Trip lifecycle
// ---------------------------------------------------------------------------

#[test]
fn lifecycle_states_round_trip_and_stay_ordered() {
    for state in STATE_SEQUENCE {
        assert_eq!(TripState::parse(state.as_str()), state);
    }
    let indexes: Vec<usize> = STATE_SEQUENCE.iter().filter_map(|s| s.index()).collect();
    assert_eq!(indexes, (0..STATE_SEQUENCE.len()).collect::<Vec<_>>());
}

#[test]
fn unrecognized_states_are_preserved_verbatim() {
    let state = TripState::parse("PACKING_IN_PROGRESS");
    assert_eq!(state, TripState::Unknown("PACKING_IN_PROGRESS".to_string()));
    assert_eq!(state.as_str(), "PACKING_IN_PROGRESS");
    assert_eq!(state.label(), "PACKING_IN_PROGRESS");
    assert_eq!(state.index(), None);
}

#[test]
fn advancement_is_forward_only() {
    let collecting = TripState::CollectingDates;
    let voting = TripState::VotingHighLevel;
    let booked = TripState::Booked;

    assert!(collecting.allows_advance_to(&voting));
    assert!(collecting.allows_advance_to(&booked));
    // Re-asserting the current state is a no-op, not a regression.
    assert!(voting.allows_advance_to(&voting));
    assert!(!voting.allows_advance_to(&collecting));

    let unknown = TripState::parse("SOMETHING_NEW");
    assert!(!unknown.allows_advance_to(&voting));
    assert!(!voting.allows_advance_to(&unknown));
}

// ---------------------------------------------------------------------------
// Day keys
// ---------------------------------------------------------------------------

#[test]
fn day_keys_collapse_to_the_utc_calendar_day() {
    // Same instant seen from Chicago and Paris: both are Oct 21 in UTC.
    let from_chicago = day_key("2024-10-20T23:00:00-05:00").expect("chicago");
    let from_paris = day_key("2024-10-21T01:00:00+01:00").expect("paris");
    assert_eq!(from_chicago, from_paris);
    assert_eq!(format_day(from_chicago), "2024-10-21");

    // Bare day keys are taken literally, not shifted.
    let literal = day_key("2024-10-21").expect("literal");
    assert_eq!(literal, from_chicago);
}

#[test]
fn bad_date_inputs_are_rejected() {
    for input in ["next tuesday", "2024-13-40", "2024-10-21T10:00:00", ""] {
        match day_key(input) {
            Err(DateError::Unparseable(raw)) => assert_eq!(raw, input),
            other => panic!("{input:?} parsed as {other:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Push events
// ---------------------------------------------------------------------------

#[test]
fn known_events_parse_with_embedded_records() {
    let text = concat!(
        r#"{"type":"vote_update","#,
        r#""vote":{"id":7,"trip_id":"BCN-2024-001","user_id":2,"option_id":"beach-nightlife","#,
        r#""emoji":"🔥","timestamp":"2024-10-01T12:00:00Z"},"#,
        r#""removed":false,"timestamp":"2024-10-01T12:00:00Z"}"#
    );
    match ServerEvent::parse(text).expect("parse vote_update") {
        ServerEvent::VoteUpdate { vote, removed, .. } => {
            assert_eq!(vote.option_id, "beach-nightlife");
            assert_eq!(vote.emoji, "🔥");
            assert!(!removed);
        }
        other => panic!("wrong event: {other:?}"),
    }
}

#[test]
fn presence_events_use_camel_case_ids() {
    let event = ServerEvent::parse(r#"{"type":"user_joined","userId":3,"timestamp":"t"}"#)
        .expect("parse user_joined");
    assert_eq!(
        event,
        ServerEvent::UserJoined {
            user_id: 3,
            timestamp: "t".to_string(),
        }
    );

    // Serialization emits the same camelCase form it parses.
    let typing = ServerEvent::Typing {
        user_id: 2,
        timestamp: "t".to_string(),
    };
    let wire = serde_json::to_string(&typing).expect("serialize typing");
    assert!(wire.contains(r#""type":"typing""#), "wire: {wire}");
    assert!(wire.contains(r#""userId":2"#), "wire: {wire}");
    assert_eq!(ServerEvent::parse(&wire).expect("reparse"), typing);
}

#[test]
fn new_message_events_tolerate_a_missing_record() {
    let event = ServerEvent::parse(r#"{"type":"new_message","timestamp":"t"}"#)
        .expect("parse new_message");
    match event {
        ServerEvent::NewMessage { message, .. } => assert!(message.is_none()),
        other => panic!("wrong event: {other:?}"),
    }
}

#[test]
fn events_missed_carries_the_dropped_count() {
    let event =
        ServerEvent::parse(r#"{"type":"events_missed","missed":12}"#).expect("parse events_missed");
    assert_eq!(event, ServerEvent::EventsMissed { missed: 12 });
}

#[test]
fn unknown_event_kinds_parse_instead_of_failing() {
    let event = ServerEvent::parse(r#"{"type":"weather_alert","city":"Barcelona"}"#)
        .expect("unknown kind should still parse");
    assert_eq!(
        event,
        ServerEvent::Unknown {
            kind: "weather_alert".to_string(),
        }
    );
    assert_eq!(event.kind(), "weather_alert");
    assert!(!KNOWN_EVENT_KINDS.contains(&"weather_alert"));
}

#[test]
fn misshapen_known_events_are_rejected() {
    // A known kind with its record missing is an error, not an Unknown.
    match ServerEvent::parse(r#"{"type":"vote_update","removed":true}"#) {
        Err(EventParseError::Malformed { kind, .. }) => assert_eq!(kind, "vote_update"),
        other => panic!("expected malformed error, got {other:?}"),
    }
    assert!(matches!(
        ServerEvent::parse("not json at all"),
        Err(EventParseError::Json(_))
    ));
    assert!(matches!(
        ServerEvent::parse(r#"{"city":"Barcelona"}"#),
        Err(EventParseError::MissingKind)
    ));
}

// ---------------------------------------------------------------------------
// Control messages
// ---------------------------------------------------------------------------

#[test]
fn control_messages_round_trip_with_camel_case_ids() {
    let join = ClientControl::JoinTrip {
        trip_id: "BCN-2024-001".to_string(),
        user_id: 1,
    };
    let wire = serde_json::to_string(&join).expect("serialize join");
    assert!(wire.contains(r#""type":"join_trip""#), "wire: {wire}");
    assert!(wire.contains(r#""tripId":"BCN-2024-001""#), "wire: {wire}");
    assert!(wire.contains(r#""userId":1"#), "wire: {wire}");

    let back: ClientControl = serde_json::from_str(&wire).expect("reparse join");
    assert_eq!(back, join);

    let leave: ClientControl =
        serde_json::from_str(r#"{"type":"leave_trip","tripId":"BCN-2024-001","userId":1}"#)
            .expect("parse leave");
    assert_eq!(
        leave,
        ClientControl::LeaveTrip {
            trip_id: "BCN-2024-001".to_string(),
            user_id: 1,
        }
    );
}
