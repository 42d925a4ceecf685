//! Command-line and environment configuration

use std::path::PathBuf;

use clap::Parser;

use crate::room::RoomKeyMode;
use crate::server::DEFAULT_OUTBOX_SIZE;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Channel buffer size for router commands
pub const DEFAULT_ROUTER_BUFFER: usize = 256;

/// dm_relay - 1:1 direct-messaging WebSocket relay
#[derive(Parser, Debug, Clone)]
#[command(name = "dm_relay")]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Address to listen on
    #[arg(env = "DM_RELAY_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,

    /// SQLite database URL; messages are kept in memory when absent
    #[arg(long, env = "DATABASE_URL")]
    pub database: Option<String>,

    /// JSON users file: `[{"username": "...", "token": "..."}]`
    #[arg(long, env = "DM_RELAY_USERS")]
    pub users: Option<PathBuf>,

    /// How the two participants are combined into a room key
    #[arg(long, value_enum, default_value_t = RoomKeyMode::Directional)]
    pub room_keys: RoomKeyMode,

    /// Router command channel capacity
    #[arg(long, default_value_t = DEFAULT_ROUTER_BUFFER)]
    pub router_buffer: usize,

    /// Per-session outbox capacity
    #[arg(long, default_value_t = DEFAULT_OUTBOX_SIZE)]
    pub outbox_size: usize,
}
