//! 1:1 Direct-Messaging WebSocket Relay Library
//!
//! Two authenticated users exchange text messages over WebSocket; every
//! message is written to a message store before it is broadcast.
//!
//! # Features
//! - Handshake-time authentication (bearer header or `token` query parameter)
//! - Deterministic room keys derived from the two participants
//! - Store-then-broadcast delivery to every connection in a room
//! - In-memory or SQLite message storage
//! - Conversation history and correspondent listing queries
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `BroadcastRouter` is the actor owning the room registry
//! - Each connection runs one task driving its `ConnectionSession`
//! - No locks around the registry - all access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use dm_relay::{serve, BroadcastRouter, MemoryDirectory, MemoryStore, RelayState, RoomKeyMode};
//!
//! #[tokio::main]
//! async fn main() {
//!     let directory = MemoryDirectory::new();
//!     directory.add_user("alice", "alice-token").unwrap();
//!     directory.add_user("bob", "bob-token").unwrap();
//!
//!     let state = RelayState::new(
//!         Arc::new(directory),
//!         Arc::new(MemoryStore::new()),
//!         BroadcastRouter::spawn(256),
//!         RoomKeyMode::Directional,
//!     );
//!
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     serve(listener, state).await.unwrap();
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod history;
pub mod identity;
pub mod message;
pub mod room;
pub mod router;
pub mod server;
pub mod session;
pub mod sqlite_store;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use config::Config;
pub use error::{AppError, HandshakeError, SendError, StoreError};
pub use handler::handle_connection;
pub use history::{conversation, correspondents, Correspondent};
pub use identity::{IdentityDirectory, MemoryDirectory, UserRecord};
pub use message::{ChatEvent, ClientMessage, SessionEvent};
pub use room::{sanitize_identity, RoomKey, RoomKeyMode};
pub use router::{BroadcastRouter, RouterCommand, RouterHandle, RouterStats};
pub use server::{serve, RelayState};
pub use session::{ConnectionSession, HandshakeRequest, ReceiveOutcome, SessionState};
pub use sqlite_store::SqliteStore;
pub use store::{MemoryStore, Message, MessageStore};
pub use types::{Identity, SessionId};
