//! The packtrip coordination server: REST API, WebSocket push channel,
//! and the demo seed.

pub mod config;
pub mod handlers;
pub mod router;
pub mod seed;
pub mod state;
pub mod utils;

use clap::Parser;

use crate::logging;
use crate::server::config::{Cli, Config};
use crate::server::router::build_router;
use crate::server::seed::seed_demo_data;
use crate::server::state::AppState;
use crate::storage::Storage;

pub async fn run() {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli);
    logging::init();

    crate::tlog!("packtrip-server starting");
    crate::tlog!("database: {}", config.db_path);

    let storage = if config.db_path == ":memory:" {
        Storage::open_in_memory().expect("failed to open in-memory database")
    } else {
        Storage::open(std::path::Path::new(&config.db_path)).expect("failed to open database")
    };

    if config.seed {
        match seed_demo_data(&storage) {
            Ok(true) => crate::tlog!("seeded demo trip {}", seed::DEMO_TRIP_ID),
            Ok(false) => {}
            Err(e) => crate::tlog!("demo seed failed: {}", e),
        }
    }

    let state = AppState::shared(storage);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind server address");
    crate::tlog!("listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await.expect("server error");
}
