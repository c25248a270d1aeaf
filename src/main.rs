//! packtrip: command-line client for the trip planning server.
//!
//! One-shot commands over the REST API, plus a rendered planning view of a
//! trip. Live following lives in `packtrip-watch`.

use std::error::Error;

use clap::{Parser, Subcommand};

use packtrip::logging;
use packtrip::model::{
    AvailabilitySubmit, NewMessage, PreferencesSubmit, VoteSubmit, OBSERVER_USER_ID,
};
use packtrip::sync::{build_view, ApiClient, TripStore, TripView};

#[derive(Parser, Debug)]
#[command(name = "packtrip", version, about)]
struct Cli {
    /// Server base URL [env: PACKTRIP_SERVER_URL] [default: http://127.0.0.1:3000]
    #[arg(long, short = 's')]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check server liveness
    Health,
    /// List all users
    Users,
    /// List all trips
    Trips,
    /// Render one trip's planning view
    Show {
        trip_id: String,
        /// Acting user id for vote and message annotations
        #[arg(long, short = 'u', default_value_t = OBSERVER_USER_ID)]
        user: i64,
    },
    /// Send a chat message
    Send {
        trip_id: String,
        #[arg(long, short = 'u')]
        user: i64,
        content: String,
    },
    /// Toggle an emoji vote on an itinerary option
    Vote {
        trip_id: String,
        option_id: String,
        emoji: String,
        #[arg(long, short = 'u')]
        user: i64,
    },
    /// Mark one day of the availability calendar
    Availability {
        trip_id: String,
        /// Day key (YYYY-MM-DD) or RFC 3339 timestamp
        date: String,
        #[arg(long, short = 'u')]
        user: i64,
        /// Mark the day unavailable instead of available
        #[arg(long)]
        unavailable: bool,
    },
    /// Submit free-text trip preferences
    Prefs {
        trip_id: String,
        text: String,
        #[arg(long, short = 'u')]
        user: i64,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init();
    let server = cli
        .server
        .clone()
        .or_else(|| std::env::var("PACKTRIP_SERVER_URL").ok())
        .unwrap_or_else(|| "http://127.0.0.1:3000".to_string());
    let api = ApiClient::new(server);
    if let Err(error) = run(&api, cli.command) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(api: &ApiClient, command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Health => {
            let health = api.health()?;
            println!("{health}");
        }
        Command::Users => {
            for user in api.list_users()? {
                println!("{:>4}  {}  ({})", user.id, user.display_name, user.username);
            }
        }
        Command::Trips => {
            for trip in api.list_trips()? {
                println!("{}  {}  [{}]", trip.trip_id, trip.title, trip.state);
            }
        }
        Command::Show { trip_id, user } => {
            let view = fetch_view(api, &trip_id, user)?;
            print_view(&view);
        }
        Command::Send {
            trip_id,
            user,
            content,
        } => {
            let message = api.post_message(
                &trip_id,
                &NewMessage {
                    user_id: Some(user),
                    kind: "user".to_string(),
                    content,
                    metadata: None,
                },
            )?;
            println!("sent message {}", message.id);
        }
        Command::Vote {
            trip_id,
            option_id,
            emoji,
            user,
        } => {
            let outcome = api.post_vote(
                &trip_id,
                &VoteSubmit {
                    user_id: user,
                    option_id,
                    emoji,
                },
            )?;
            if outcome.removed {
                println!("removed {} from {}", outcome.vote.emoji, outcome.vote.option_id);
            } else {
                println!("added {} to {}", outcome.vote.emoji, outcome.vote.option_id);
            }
        }
        Command::Availability {
            trip_id,
            date,
            user,
            unavailable,
        } => {
            let record = api.post_availability(
                &trip_id,
                &AvailabilitySubmit {
                    user_id: user,
                    date,
                    available: !unavailable,
                },
            )?;
            let marker = if record.available { "available" } else { "unavailable" };
            println!("{} marked {} on {}", record.user_id, marker, record.date);
        }
        Command::Prefs {
            trip_id,
            text,
            user,
        } => {
            let record = api.post_preferences(
                &trip_id,
                &PreferencesSubmit {
                    user_id: user,
                    raw_text: Some(text),
                    ..PreferencesSubmit::default()
                },
            )?;
            println!("preferences recorded for user {}", record.user_id);
        }
    }
    Ok(())
}

/// Pull every collection once and derive the planning view from it.
fn fetch_view(api: &ApiClient, trip_id: &str, user: i64) -> Result<TripView, Box<dyn Error>> {
    let mut store = TripStore::new();
    store.replace_trip(api.get_trip(trip_id)?);
    store.replace_participants(api.list_participants(trip_id)?);
    store.replace_messages(api.list_messages(trip_id)?);
    store.replace_votes(api.list_votes(trip_id)?);
    store.replace_options(api.list_options(trip_id)?);
    store.replace_availability(api.list_availability(trip_id)?);
    store.replace_preferences(api.list_preferences(trip_id)?);
    store.replace_missing_preferences(api.missing_preferences(trip_id)?);
    Ok(build_view(&store, false, user))
}

fn print_view(view: &TripView) {
    let destination = view.destination.as_deref().unwrap_or("(no destination)");
    println!("{}  {}  {}", view.trip_id, view.title, destination);
    if let Some(budget) = view.budget {
        println!("budget: EUR {budget}");
    }
    println!("state: {} ({})", view.state, view.state_label);

    println!("\nmilestones:");
    for milestone in &view.milestones {
        let mark = if milestone.completed {
            "x"
        } else if milestone.current {
            ">"
        } else {
            " "
        };
        println!("  [{mark}] {}", milestone.label);
    }

    println!("\nparticipants:");
    for p in &view.participants {
        let presence = if p.online { "online" } else { "offline" };
        println!("  {:>4}  {}  {}  {}", p.user_id, p.name, p.role, presence);
    }

    if !view.days.is_empty() {
        println!("\navailability ({} consensus days):", view.consensus_days);
        for day in &view.days {
            let star = if day.consensus { "*" } else { " " };
            let ids: Vec<String> = day.available_user_ids.iter().map(|id| id.to_string()).collect();
            println!("  {star} {}  {}", day.date, ids.join(","));
        }
    }

    if !view.options.is_empty() {
        println!("\noptions:");
        for option in &view.options {
            let price = option
                .price
                .map(|p| format!("EUR {p}"))
                .unwrap_or_else(|| "-".to_string());
            let tallies: Vec<String> = option
                .tallies
                .iter()
                .map(|t| format!("{}x{}", t.emoji, t.count))
                .collect();
            println!("  {}  {}  {}  {}", option.option_id, option.title, price, tallies.join(" "));
        }
    }

    println!("\nmessages:");
    for message in &view.messages {
        let author = message.author.as_deref().unwrap_or(message.kind.as_str());
        println!("  [{author}] {}", message.content);
    }
}
