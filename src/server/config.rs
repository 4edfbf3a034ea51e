//! Configuration types and constants for the Connect server.

use std::path::PathBuf;

use clap::Parser;

pub(crate) const WS_CHANNEL_CAPACITY: usize = 256;
pub(crate) const MAX_WS_CONNECTIONS: usize = 64;

/// A poll needs a question and at least this many options.
pub(crate) const MIN_POLL_OPTIONS: usize = 2;

/// Web server for the PCCOE Connect college social network.
///
/// Serves the embedded SPA, provides the REST API + WebSocket change feed,
/// and persists state in SQLite.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "pccoe-connect", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: CONNECT_BIND] [default: 127.0.0.1:3000]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Data directory for the database [env: CONNECT_HOME] [default: ~/.pccoe-connect]
    #[arg(long, short = 'd')]
    pub data_dir: Option<PathBuf>,
}

pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let data_dir = cli
            .data_dir
            .or_else(|| std::env::var("CONNECT_HOME").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".pccoe-connect"))
                    .unwrap_or_else(|_| PathBuf::from(".pccoe-connect"))
            });

        let bind_addr = cli
            .bind
            .or_else(|| std::env::var("CONNECT_BIND").ok())
            .unwrap_or_else(|| "127.0.0.1:3000".to_string());

        Self {
            bind_addr,
            data_dir,
        }
    }
}
