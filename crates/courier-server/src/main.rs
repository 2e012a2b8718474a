//! # courier-server
//!
//! Real-time chat delivery server.
//!
//! This binary provides:
//! - **Hub**: the registry of live WebSocket connections per user, with
//!   best-effort, non-blocking push
//! - **Message router**: checks friendship or group membership, persists the
//!   message, then fans it out through the hub
//! - **REST API** (axum) for profiles, friends, groups, message history and
//!   read receipts
//! - **SQLite storage** via `courier-store`

mod api;
mod auth;
mod config;
mod error;
mod hub;
mod messaging;
mod state;
mod ws;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use courier_store::Database;

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,courier_server=debug")),
        )
        .init();

    info!("Starting courier server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the database (runs pending migrations)
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)
            .with_context(|| format!("opening database at {}", path.display()))?,
        None => Database::new().context("opening database in the data directory")?,
    };
    info!(path = ?db.path(), "Database ready");

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let http_addr = config.http_addr;
    let app_state = AppState::new(db, config);

    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
