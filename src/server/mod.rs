//! PCCOE Connect server module.
//!
//! Serves the embedded SPA, provides the REST API + WebSocket change feed,
//! and persists state in SQLite.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod static_files;
pub mod utils;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;

use crate::storage::{db_path, Storage};

use config::{Cli, Config, WS_CHANNEL_CAPACITY};
use state::{AppState, SharedState};

/// Entry point: parse CLI, open storage, start server.
pub async fn run() {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli);

    crate::logging::init();

    crate::tlog!("pccoe-connect starting");
    crate::tlog!("  data directory: {}", config.data_dir.display());

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        crate::tlog!("failed to create data directory: {e}");
        std::process::exit(1);
    }

    let database = db_path(&config.data_dir);
    let storage = match Storage::open(&database) {
        Ok(s) => s,
        Err(e) => {
            crate::tlog!("failed to open database {}: {e}", database.display());
            std::process::exit(1);
        }
    };
    crate::tlog!("  database: {}", database.display());

    // Create the realtime broadcast channel
    let (ws_tx, _) = broadcast::channel(WS_CHANNEL_CAPACITY);
    let ws_connection_count = Arc::new(AtomicUsize::new(0));

    let state: SharedState = Arc::new(tokio::sync::Mutex::new(AppState {
        storage,
        ws_tx,
        ws_connection_count: Arc::clone(&ws_connection_count),
    }));

    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    crate::tlog!("pccoe-connect listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await.expect("server error");
}
