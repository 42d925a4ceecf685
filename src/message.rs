//! Message protocol definitions
//!
//! JSON text frames in both directions, plus the internal event type the
//! router delivers to each session.

use serde::{Deserialize, Serialize};

use crate::room::RoomKey;
use crate::types::Identity;

/// Client → Server frame
///
/// `{"message": "..."}`. Unknown fields are ignored; a missing `message`
/// is a malformed payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    pub message: String,
}

/// Server → Client frame
///
/// Delivered to every session in the room, the sender's own included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub sender: Identity,
    pub receiver: Identity,
    pub message: String,
}

/// Events the router pushes into a session's outbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Registration confirmed; the session is now part of `room`
    Accepted { room: RoomKey },
    /// A message broadcast to the room
    Chat(ChatEvent),
}
