//! packtrip-watch: follow one trip live from the terminal.
//!
//! With a user id it joins the push channel and re-renders on every event;
//! as the observer (user 0) it has no socket and polls instead.

use std::time::Duration;

use clap::Parser;

use packtrip::logging;
use packtrip::model::{ServerEvent, OBSERVER_USER_ID};
use packtrip::sync::{TripSession, TripView};
use packtrip::tlog;

#[derive(Parser, Debug)]
#[command(name = "packtrip-watch", version, about)]
struct Cli {
    /// Server base URL [env: PACKTRIP_SERVER_URL] [default: http://127.0.0.1:3000]
    #[arg(long, short = 's')]
    server: Option<String>,

    /// Trip to follow
    trip_id: String,

    /// Join as this user; the default observes without joining
    #[arg(long, short = 'u', default_value_t = OBSERVER_USER_ID)]
    user: i64,

    /// Poll interval in seconds for observer mode
    #[arg(long, default_value_t = 5)]
    interval: u64,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init();
    let server = cli
        .server
        .clone()
        .or_else(|| std::env::var("PACKTRIP_SERVER_URL").ok())
        .unwrap_or_else(|| "http://127.0.0.1:3000".to_string());

    let mut session = match TripSession::open(&server, &cli.trip_id, cli.user) {
        Ok(session) => session,
        Err(error) => {
            eprintln!("error: {error}");
            std::process::exit(1);
        }
    };

    print_digest(&session.view());

    if session.is_observer() {
        // No push channel: re-pull everything on a timer.
        loop {
            tokio::time::sleep(Duration::from_secs(cli.interval)).await;
            if let Err(error) = session.refresh() {
                tlog!("refresh failed: {}", error);
                continue;
            }
            print_digest(&session.view());
        }
    }

    loop {
        let Some(event) = session.recv_event().await else {
            break;
        };
        if matches!(event, ServerEvent::Typing { .. }) {
            continue;
        }
        tlog!("event: {}", event.kind());
        if let Err(error) = session.settle() {
            tlog!("settle failed: {}", error);
        }
        print_digest(&session.view());
    }
    tlog!("event stream ended");
    session.close();
}

fn print_digest(view: &TripView) {
    let online = view.participants.iter().filter(|p| p.online).count();
    println!(
        "{} [{}] {} participants ({} online), {} messages, {} options, {} days marked, {} consensus",
        view.trip_id,
        view.state_label,
        view.participants.len(),
        online,
        view.messages.len(),
        view.options.len(),
        view.days.len(),
        view.consensus_days,
    );
}
