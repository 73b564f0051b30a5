//! `BoardSync` relay server.
//!
//! An axum server that stands in for the board service during development
//! and testing: it serves the CRUD routes under `/api`, relays board topics
//! over WebSocket at `/ws`, and applies move commands with optimistic
//! version checks.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:8080 with the demo board
//! cargo run --bin boardsync-relay
//!
//! # Custom address, seeded boards, last-writer-wins on conflicts
//! cargo run --bin boardsync-relay -- --bind 127.0.0.1:9000 \
//!     --seed-file boards.json --conflict-policy rebase
//! ```

use std::sync::Arc;

use boardsync_relay::config::{RelayCliArgs, RelayConfig};
use boardsync_relay::relay::{self, RelayState};
use boardsync_relay::store::BoardStore;
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let store = match &config.seed_file {
        Some(path) => match BoardStore::load_seed_file(path) {
            Ok(store) => store,
            Err(e) => {
                tracing::error!(error = %e, "failed to load seed file");
                std::process::exit(1);
            }
        },
        None => BoardStore::demo(),
    };

    tracing::info!(
        addr = %config.bind_addr,
        conflict_policy = %config.conflict_policy,
        "starting boardsync relay"
    );

    let state = Arc::new(RelayState::with_config(
        store,
        config.max_payload_size,
        config.conflict_policy,
    ));

    match relay::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}
