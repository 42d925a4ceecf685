//! Client struct definition
//!
//! The router's view of one registered connection: who owns it and the
//! channel its writer task drains.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::message::SessionEvent;
use crate::types::{Identity, SessionId};

/// Registered client
///
/// Holds no connection state of its own; the session task owns the socket.
#[derive(Debug, Clone)]
pub struct Client {
    /// Session this outbox belongs to
    pub id: SessionId,
    /// Authenticated owner of the session
    pub owner: Identity,
    /// Router → session event channel
    pub outbox: mpsc::Sender<SessionEvent>,
}

impl Client {
    /// Create a new client with the given ID, owner and outbox
    pub fn new(id: SessionId, owner: Identity, outbox: mpsc::Sender<SessionEvent>) -> Self {
        Self { id, owner, outbox }
    }

    /// Hand an event to this client without waiting
    ///
    /// A slow or closed session must never hold up the rest of its room.
    pub fn try_deliver(&self, event: SessionEvent) -> Result<(), SendError> {
        self.outbox.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => SendError::ChannelFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Check if the session has dropped its end of the outbox
    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }
}
