//! Push-channel tests: presence and typing over raw WebSockets, event
//! fan-out for every REST write, and two full sessions converging on the
//! same availability calendar.

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use packtrip::model::{
    AvailabilityBatch, AvailabilitySubmit, ClientControl, DayEntry, JoinRequest, NewMessage,
    NewTrip, NewUser, OptionUpsert, OptionsIngest, PreferencesSubmit, ServerEvent, TripRecord,
    UserRecord, VoteSubmit,
};
use packtrip::server::router::build_router;
use packtrip::server::state::AppState;
use packtrip::storage::Storage;
use packtrip::sync::{ApiClient, TripSession};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn start_server() -> (String, oneshot::Sender<()>) {
    let storage = Storage::open_in_memory().expect("open storage");
    let state = AppState::shared(storage);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind server");
    let addr = listener.local_addr().expect("server addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });
    tokio::spawn(async move {
        let _ = server.await;
    });

    (format!("http://{}", addr), shutdown_tx)
}

fn make_user(api: &ApiClient, username: &str, display_name: &str) -> UserRecord {
    api.create_user(&NewUser {
        username: username.to_string(),
        display_name: display_name.to_string(),
        avatar: None,
        color: None,
        home_city: None,
    })
    .expect("create user")
}

fn make_trip(api: &ApiClient, trip_id: &str, state: Option<&str>, creator_id: Option<i64>) -> TripRecord {
    api.create_trip(&NewTrip {
        trip_id: trip_id.to_string(),
        title: format!("{trip_id} planning"),
        destination: Some("Barcelona".to_string()),
        start_date: None,
        end_date: None,
        budget: None,
        state: state.map(|s| s.to_string()),
        creator_id,
    })
    .expect("create trip")
}

async fn connect_ws(base_url: &str) -> WsStream {
    let ws_url = ApiClient::new(base_url).ws_url();
    let (stream, _response) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("connect ws");
    stream
}

async fn send_control(ws: &mut WsStream, control: ClientControl) {
    let text = serde_json::to_string(&control).expect("serialize control");
    ws.send(WsMessage::Text(text)).await.expect("send control");
}

async fn join(ws: &mut WsStream, trip_id: &str, user_id: i64) {
    send_control(
        ws,
        ClientControl::JoinTrip {
            trip_id: trip_id.to_string(),
            user_id,
        },
    )
    .await;
}

/// Next text frame as a parsed event, skipping pings and the like.
async fn next_event(ws: &mut WsStream) -> ServerEvent {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for an event")
            .expect("stream ended")
            .expect("ws error");
        if let WsMessage::Text(text) = frame {
            return ServerEvent::parse(&text).expect("parse event");
        }
    }
}

async fn expect_silence(ws: &mut WsStream, wait: Duration) {
    if let Ok(frame) = tokio::time::timeout(wait, ws.next()).await {
        panic!("expected silence, got {frame:?}");
    }
}

async fn blocking<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.expect("blocking task")
}

#[tokio::test]
async fn presence_flows_join_typing_leave() {
    let (base_url, shutdown_tx) = start_server().await;

    let (alice_id, bob_id) = blocking({
        let base_url = base_url.clone();
        move || {
            let api = ApiClient::new(&base_url);
            let alice = make_user(&api, "alice", "Alice Johnson");
            let bob = make_user(&api, "bob", "Bob Smith");
            let trip = make_trip(&api, "TRIP-1", None, Some(alice.id));
            api.join_trip(&JoinRequest {
                invite_token: trip.invite_token.clone(),
                user_id: bob.id,
            })
            .expect("bob joins");
            (alice.id, bob.id)
        }
    })
    .await;

    let mut alice_ws = connect_ws(&base_url).await;
    join(&mut alice_ws, "TRIP-1", alice_id).await;

    // The subscription starts before the announcement, so the joiner sees
    // its own arrival.
    match next_event(&mut alice_ws).await {
        ServerEvent::UserJoined { user_id, .. } => assert_eq!(user_id, alice_id),
        other => panic!("expected alice's join, got {other:?}"),
    }

    let online = blocking({
        let base_url = base_url.clone();
        move || {
            let roster = ApiClient::new(&base_url)
                .list_participants("TRIP-1")
                .expect("roster");
            roster
                .iter()
                .find(|p| p.user_id == alice_id)
                .expect("alice row")
                .is_online
        }
    })
    .await;
    assert!(online);

    let mut bob_ws = connect_ws(&base_url).await;
    join(&mut bob_ws, "TRIP-1", bob_id).await;

    match next_event(&mut bob_ws).await {
        ServerEvent::UserJoined { user_id, .. } => assert_eq!(user_id, bob_id),
        other => panic!("expected bob's join, got {other:?}"),
    }
    match next_event(&mut alice_ws).await {
        ServerEvent::UserJoined { user_id, .. } => assert_eq!(user_id, bob_id),
        other => panic!("expected bob's join on alice's socket, got {other:?}"),
    }

    // Typing goes back out to every subscriber, the typist included.
    send_control(
        &mut bob_ws,
        ClientControl::Typing {
            trip_id: "TRIP-1".to_string(),
            user_id: bob_id,
        },
    )
    .await;
    match next_event(&mut alice_ws).await {
        ServerEvent::Typing { user_id, .. } => assert_eq!(user_id, bob_id),
        other => panic!("expected typing, got {other:?}"),
    }
    match next_event(&mut bob_ws).await {
        ServerEvent::Typing { user_id, .. } => assert_eq!(user_id, bob_id),
        other => panic!("expected typing echo, got {other:?}"),
    }

    // leave_trip departs the trip without closing the socket.
    send_control(
        &mut bob_ws,
        ClientControl::LeaveTrip {
            trip_id: "TRIP-1".to_string(),
            user_id: bob_id,
        },
    )
    .await;
    match next_event(&mut alice_ws).await {
        ServerEvent::UserLeft { user_id, .. } => assert_eq!(user_id, bob_id),
        other => panic!("expected bob's departure, got {other:?}"),
    }

    let online = blocking({
        let base_url = base_url.clone();
        move || {
            let roster = ApiClient::new(&base_url)
                .list_participants("TRIP-1")
                .expect("roster");
            roster
                .iter()
                .find(|p| p.user_id == bob_id)
                .expect("bob row")
                .is_online
        }
    })
    .await;
    assert!(!online);

    // The departed socket is inert again and can rejoin.
    join(&mut bob_ws, "TRIP-1", bob_id).await;
    match next_event(&mut bob_ws).await {
        ServerEvent::UserJoined { user_id, .. } => assert_eq!(user_id, bob_id),
        other => panic!("expected bob's rejoin, got {other:?}"),
    }

    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn joining_an_unknown_trip_leaves_the_socket_inert() {
    let (base_url, shutdown_tx) = start_server().await;

    let alice_id = blocking({
        let base_url = base_url.clone();
        move || {
            let api = ApiClient::new(&base_url);
            let alice = make_user(&api, "alice", "Alice Johnson");
            make_trip(&api, "TRIP-1", None, Some(alice.id));
            alice.id
        }
    })
    .await;

    let mut ws = connect_ws(&base_url).await;

    join(&mut ws, "NOPE", alice_id).await;
    expect_silence(&mut ws, Duration::from_millis(300)).await;

    // Malformed control frames are dropped, not fatal.
    ws.send(WsMessage::Text("{\"type\":\"join_trip\"".to_string()))
        .await
        .expect("send garbage");
    expect_silence(&mut ws, Duration::from_millis(300)).await;

    // The same socket still joins a real trip afterwards.
    join(&mut ws, "TRIP-1", alice_id).await;
    match next_event(&mut ws).await {
        ServerEvent::UserJoined { user_id, .. } => assert_eq!(user_id, alice_id),
        other => panic!("expected join after recovery, got {other:?}"),
    }

    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn rest_writes_fan_out_to_subscribers() {
    let (base_url, shutdown_tx) = start_server().await;

    let alice_id = blocking({
        let base_url = base_url.clone();
        move || {
            let api = ApiClient::new(&base_url);
            let alice = make_user(&api, "alice", "Alice Johnson");
            make_trip(&api, "TRIP-1", None, Some(alice.id));
            alice.id
        }
    })
    .await;

    let mut ws = connect_ws(&base_url).await;
    join(&mut ws, "TRIP-1", alice_id).await;
    match next_event(&mut ws).await {
        ServerEvent::UserJoined { .. } => {}
        other => panic!("expected own join, got {other:?}"),
    }

    // new_message carries the full record, so clients can render without a
    // refetch.
    let posted = blocking({
        let base_url = base_url.clone();
        move || {
            ApiClient::new(&base_url)
                .post_message(
                    "TRIP-1",
                    &NewMessage {
                        user_id: Some(alice_id),
                        kind: "user".to_string(),
                        content: "hola".to_string(),
                        metadata: None,
                    },
                )
                .expect("post message")
        }
    })
    .await;
    match next_event(&mut ws).await {
        ServerEvent::NewMessage { message, .. } => {
            let record = message.expect("embedded record");
            assert_eq!(record.id, posted.id);
            assert_eq!(record.content, "hola");
        }
        other => panic!("expected new_message, got {other:?}"),
    }

    blocking({
        let base_url = base_url.clone();
        move || {
            ApiClient::new(&base_url)
                .post_vote(
                    "TRIP-1",
                    &VoteSubmit {
                        user_id: alice_id,
                        option_id: "beach-nightlife".to_string(),
                        emoji: "🔥".to_string(),
                    },
                )
                .expect("post vote")
        }
    })
    .await;
    match next_event(&mut ws).await {
        ServerEvent::VoteUpdate { vote, removed, .. } => {
            assert_eq!(vote.emoji, "🔥");
            assert!(!removed);
        }
        other => panic!("expected vote_update, got {other:?}"),
    }

    blocking({
        let base_url = base_url.clone();
        move || {
            ApiClient::new(&base_url)
                .post_availability(
                    "TRIP-1",
                    &AvailabilitySubmit {
                        user_id: alice_id,
                        date: "2024-10-20T23:00:00-05:00".to_string(),
                        available: true,
                    },
                )
                .expect("post availability")
        }
    })
    .await;
    match next_event(&mut ws).await {
        ServerEvent::AvailabilityUpdate { availability, .. } => {
            assert_eq!(availability.date, "2024-10-21");
        }
        other => panic!("expected availability_update, got {other:?}"),
    }

    blocking({
        let base_url = base_url.clone();
        move || {
            ApiClient::new(&base_url)
                .post_availability_batch(
                    "TRIP-1",
                    &AvailabilityBatch {
                        user_id: alice_id,
                        dates: vec![
                            DayEntry {
                                date: "2024-10-22".to_string(),
                                available: true,
                            },
                            DayEntry {
                                date: "2024-10-23".to_string(),
                                available: false,
                            },
                        ],
                    },
                )
                .expect("post batch")
        }
    })
    .await;
    match next_event(&mut ws).await {
        ServerEvent::AvailabilityBatchUpdate { availability, .. } => {
            assert_eq!(availability.len(), 2);
        }
        other => panic!("expected availability_batch_update, got {other:?}"),
    }

    blocking({
        let base_url = base_url.clone();
        move || {
            ApiClient::new(&base_url)
                .post_preferences(
                    "TRIP-1",
                    &PreferencesSubmit {
                        user_id: alice_id,
                        raw_text: Some("beaches".to_string()),
                        ..PreferencesSubmit::default()
                    },
                )
                .expect("post preferences")
        }
    })
    .await;
    match next_event(&mut ws).await {
        ServerEvent::PreferencesUpdate { user_id, .. } => assert_eq!(user_id, alice_id),
        other => panic!("expected preferences_update, got {other:?}"),
    }

    blocking({
        let base_url = base_url.clone();
        move || {
            ApiClient::new(&base_url)
                .ingest_options(
                    "TRIP-1",
                    &OptionsIngest {
                        options: vec![
                            OptionUpsert {
                                option_id: "culture-history".to_string(),
                                kind: "itinerary".to_string(),
                                title: "Culture & History".to_string(),
                                description: None,
                                price: Some(1150),
                                image: None,
                                metadata: None,
                            },
                            OptionUpsert {
                                option_id: "beach-nightlife".to_string(),
                                kind: "itinerary".to_string(),
                                title: "Beach & Nightlife".to_string(),
                                description: None,
                                price: Some(1280),
                                image: None,
                                metadata: None,
                            },
                        ],
                        content: None,
                        state: None,
                    },
                )
                .expect("ingest options")
        }
    })
    .await;
    match next_event(&mut ws).await {
        ServerEvent::OptionsGenerated { count, .. } => assert_eq!(count, 2),
        other => panic!("expected options_generated, got {other:?}"),
    }

    let posted_id = posted.id;
    blocking({
        let base_url = base_url.clone();
        move || {
            ApiClient::new(&base_url)
                .delete_message("TRIP-1", posted_id)
                .expect("delete message")
        }
    })
    .await;
    match next_event(&mut ws).await {
        ServerEvent::MessageDeleted { message_id, .. } => assert_eq!(message_id, posted_id),
        other => panic!("expected message_deleted, got {other:?}"),
    }

    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn two_sessions_converge_on_shared_availability() {
    let (base_url, shutdown_tx) = start_server().await;

    let (alice_id, bob_id) = blocking({
        let base_url = base_url.clone();
        move || {
            let api = ApiClient::new(&base_url);
            let alice = make_user(&api, "alice", "Alice Johnson");
            let bob = make_user(&api, "bob", "Bob Smith");
            let trip = make_trip(&api, "DEMO", Some("COLLECTING_DATES"), Some(alice.id));
            api.join_trip(&JoinRequest {
                invite_token: trip.invite_token.clone(),
                user_id: bob.id,
            })
            .expect("bob joins");
            (alice.id, bob.id)
        }
    })
    .await;

    blocking({
        let base_url = base_url.clone();
        move || {
            let mut alice = TripSession::open(&base_url, "DEMO", alice_id).expect("alice session");
            let mut bob = TripSession::open(&base_url, "DEMO", bob_id).expect("bob session");

            // Own join announcements prove both push channels are live.
            assert!(alice.wait_for_events(Duration::from_secs(5)) > 0);
            assert!(bob.wait_for_events(Duration::from_secs(5)) > 0);

            // The same day submitted from two different clocks.
            let receipt = alice.set_availability("2024-10-21", true);
            assert!(receipt.committed());
            let receipt = bob.set_availability("2024-10-20T23:00:00-05:00", true);
            assert!(receipt.committed());

            alice.settle().expect("alice settle");
            bob.settle().expect("bob settle");

            for session in [&alice, &bob] {
                let view = session.view();
                assert!(view.connected);
                assert!(!view.syncing);
                assert_eq!(view.days.len(), 1);
                assert_eq!(view.days[0].date, "2024-10-21");
                assert_eq!(view.days[0].available_user_ids, vec![alice_id, bob_id]);
                assert!(view.days[0].consensus);
                assert_eq!(view.consensus_days, 1);
            }
            assert_eq!(alice.store().availability.len(), 2);
            assert_eq!(bob.store().availability.len(), 2);

            // Let the in-flight updates drain so the typing check below sees
            // a quiet channel.
            while alice.wait_for_events(Duration::from_millis(300)) > 0 {}
            alice.settle().expect("settle before typing");

            // Typing reaches the other session but invalidates nothing.
            bob.send_typing();
            assert!(alice.wait_for_events(Duration::from_secs(5)) > 0);
            assert!(alice
                .event_log()
                .iter()
                .any(|e| matches!(e, ServerEvent::Typing { user_id, .. } if *user_id == bob_id)));
            assert!(!alice.store().has_stale());

            // A clean close announces the departure.
            bob.close();
            let deadline = Instant::now() + Duration::from_secs(5);
            while !alice
                .event_log()
                .iter()
                .any(|e| matches!(e, ServerEvent::UserLeft { user_id, .. } if *user_id == bob_id))
            {
                assert!(Instant::now() < deadline, "bob's departure never arrived");
                alice.wait_for_events(Duration::from_millis(200));
            }
            alice.settle().expect("final settle");
            let roster = alice.view().participants;
            let bob_row = roster
                .iter()
                .find(|p| p.user_id == bob_id)
                .expect("bob in roster");
            assert!(!bob_row.online);

            alice.close();
        }
    })
    .await;

    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn batched_and_single_writes_settle_to_the_same_view() {
    let (base_url, shutdown_tx) = start_server().await;

    let alice_id = blocking({
        let base_url = base_url.clone();
        move || {
            let api = ApiClient::new(&base_url);
            let alice = make_user(&api, "alice", "Alice Johnson");
            make_trip(&api, "SINGLES", None, Some(alice.id));
            make_trip(&api, "BATCHED", None, Some(alice.id));
            alice.id
        }
    })
    .await;

    blocking({
        let base_url = base_url.clone();
        move || {
            let mut singles =
                TripSession::open(&base_url, "SINGLES", alice_id).expect("singles session");
            let mut batched =
                TripSession::open(&base_url, "BATCHED", alice_id).expect("batched session");

            let days = [
                ("2024-10-21", true),
                ("2024-10-22", false),
                ("2024-10-23", true),
            ];
            for (date, available) in days {
                assert!(singles.set_availability(date, available).committed());
            }
            let entries: Vec<DayEntry> = days
                .iter()
                .map(|(date, available)| DayEntry {
                    date: date.to_string(),
                    available: *available,
                })
                .collect();
            assert!(batched.set_availability_batch(&entries).committed());

            singles.settle().expect("singles settle");
            batched.settle().expect("batched settle");
            assert_eq!(singles.view().days, batched.view().days);

            // An empty batch is a committed no-op.
            let before = batched.view().days;
            assert!(batched.set_availability_batch(&[]).committed());
            batched.settle().expect("settle after empty batch");
            assert_eq!(batched.view().days, before);

            singles.close();
            batched.close();
        }
    })
    .await;

    shutdown_tx.send(()).ok();
}
