//! Error types for the relay
//!
//! Defines application-level errors, handshake rejections, store failures
//! and outbox send errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Fatal for the connection or the process; message-time problems are
/// never surfaced to the remote party.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Router actor is gone (fatal - internal channel broken)
    #[error("Router channel closed")]
    RouterClosed,

    /// Connection was refused during the handshake
    #[error("Handshake rejected: {0}")]
    Handshake(#[from] HandshakeError),

    /// Message store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Users file could not be turned into a directory
    #[error("Invalid users file: {0}")]
    InvalidUsers(String),
}

/// Reasons a connection never reaches `Open`
///
/// These are normal rejections, not faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// No credential, or one the directory does not recognise
    #[error("unauthenticated")]
    Unauthenticated,

    /// Missing or empty target in the connection route
    #[error("invalid route: {0}")]
    InvalidRoute(String),
}

/// Message store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be decoded
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Outbox send errors
///
/// Occurs when the router hands an event to a session that cannot take it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The session is not draining its outbox fast enough
    #[error("Channel full")]
    ChannelFull,
}
