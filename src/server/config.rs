//! Configuration types and constants for the packtrip server.

use clap::Parser;

/// Buffered events per trip channel before slow subscribers start lagging.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;
pub(crate) const MAX_WS_CONNECTIONS: usize = 64;

/// Distinct day keys required before the date-consensus check can pass.
pub(crate) const CONSENSUS_MIN_DAYS: usize = 5;
/// Availability records required per participant before consensus.
pub(crate) const CONSENSUS_PER_PARTICIPANT: i64 = 3;

/// Length in bytes of the random invite token (hex-encoded on the wire).
pub(crate) const INVITE_TOKEN_BYTES: usize = 8;

/// Coordination server for packtrip group trip planning.
///
/// Serves the REST API and WebSocket push channel, seeds demo data on
/// first run, and persists state in SQLite.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "packtrip-server", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: PACKTRIP_BIND] [default: 127.0.0.1:3000]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// SQLite database path, or `:memory:` [env: PACKTRIP_DB] [default: packtrip.db]
    #[arg(long, short = 'd')]
    pub db: Option<String>,

    /// Skip seeding the demo trip on an empty database
    #[arg(long)]
    pub no_seed: bool,
}

pub struct Config {
    pub bind_addr: String,
    pub db_path: String,
    pub seed: bool,
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let bind_addr = cli
            .bind
            .or_else(|| std::env::var("PACKTRIP_BIND").ok())
            .unwrap_or_else(|| "127.0.0.1:3000".to_string());

        let db_path = cli
            .db
            .or_else(|| std::env::var("PACKTRIP_DB").ok())
            .unwrap_or_else(|| "packtrip.db".to_string());

        Self {
            bind_addr,
            db_path,
            seed: !cli.no_seed,
        }
    }
}
