//! Direct-messaging relay - Entry Point
//!
//! Loads configuration, builds the collaborators and the router actor, and
//! accepts connections.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dm_relay::{
    serve, BroadcastRouter, Config, IdentityDirectory, MemoryDirectory, MemoryStore,
    MessageStore, RelayState, SqliteStore,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=dm_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dm_relay=info")),
        )
        .init();

    let config = Config::parse();

    let directory: Arc<dyn IdentityDirectory> = match &config.users {
        Some(path) => Arc::new(MemoryDirectory::load(path)?),
        None => {
            warn!("No users file configured; every connection will be rejected");
            Arc::new(MemoryDirectory::new())
        }
    };

    let store: Arc<dyn MessageStore> = match &config.database {
        Some(url) => Arc::new(SqliteStore::connect(url).await?),
        None => {
            info!("No database configured; messages are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    // Start the BroadcastRouter actor
    let router = BroadcastRouter::spawn(config.router_buffer.max(1));
    info!("BroadcastRouter actor started (room keys: {:?})", config.room_keys);

    let state = RelayState::new(directory, store, router, config.room_keys)
        .with_outbox_size(config.outbox_size);

    let listener = TcpListener::bind(&config.addr).await?;
    serve(listener, state).await?;

    Ok(())
}
