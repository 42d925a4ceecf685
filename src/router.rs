//! BroadcastRouter Actor implementation
//!
//! The single owner of the room registry: room key → registered clients.
//! Connection tasks talk to it only through [`RouterHandle`], so every
//! registry mutation and every fan-out is serialized through one task and a
//! broadcast never observes a half-applied register or deregister.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::{AppError, SendError};
use crate::message::{ChatEvent, SessionEvent};
use crate::room::RoomKey;
use crate::types::SessionId;

/// Commands sent from connection tasks to the router actor
#[derive(Debug)]
pub enum RouterCommand {
    /// Add a client to a room and acknowledge with `SessionEvent::Accepted`
    Register { room: RoomKey, client: Client },
    /// Remove a session from a room
    Deregister { room: RoomKey, session: SessionId },
    /// Deliver an event to every client in a room
    Broadcast { room: RoomKey, event: ChatEvent },
    /// Number of clients registered under a room
    RoomSize {
        room: RoomKey,
        reply: oneshot::Sender<usize>,
    },
    /// Registry totals
    Stats { reply: oneshot::Sender<RouterStats> },
}

/// Snapshot of registry size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub rooms: usize,
    pub sessions: usize,
}

/// The router actor
///
/// Invariants: a session is a member of at most one room, and a room key is
/// present only while it has at least one member.
pub struct BroadcastRouter {
    /// Active rooms: RoomKey -> members
    rooms: HashMap<RoomKey, HashMap<SessionId, Client>>,
    /// Session to room mapping for fast lookup
    session_rooms: HashMap<SessionId, RoomKey>,
    /// Command receiver channel
    receiver: mpsc::Receiver<RouterCommand>,
}

impl BroadcastRouter {
    /// Create a new router with the given command receiver
    pub fn new(receiver: mpsc::Receiver<RouterCommand>) -> Self {
        Self {
            rooms: HashMap::new(),
            session_rooms: HashMap::new(),
            receiver,
        }
    }

    /// Start a router task and return a handle to it
    pub fn spawn(buffer: usize) -> RouterHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(buffer);
        tokio::spawn(Self::new(cmd_rx).run());
        RouterHandle::new(cmd_tx)
    }

    /// Run the router event loop
    ///
    /// Continuously receives and processes commands until all handles are dropped.
    pub async fn run(mut self) {
        info!("BroadcastRouter started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("BroadcastRouter shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: RouterCommand) {
        match cmd {
            RouterCommand::Register { room, client } => self.handle_register(room, client),
            RouterCommand::Deregister { room, session } => self.handle_deregister(&room, session),
            RouterCommand::Broadcast { room, event } => self.handle_broadcast(&room, event),
            RouterCommand::RoomSize { room, reply } => {
                let size = self.rooms.get(&room).map_or(0, HashMap::len);
                let _ = reply.send(size);
            }
            RouterCommand::Stats { reply } => {
                let _ = reply.send(RouterStats {
                    rooms: self.rooms.len(),
                    sessions: self.session_rooms.len(),
                });
            }
        }
    }

    fn handle_register(&mut self, room: RoomKey, client: Client) {
        let session = client.id;

        // a session moving rooms leaves its old one first
        if let Some(previous) = self.session_rooms.get(&session).cloned() {
            if previous != room {
                self.remove_member(&previous, session);
            }
        }

        let ack = client.clone();
        self.rooms
            .entry(room.clone())
            .or_default()
            .insert(session, client);
        self.session_rooms.insert(session, room.clone());

        info!("Session {} ({}) joined {}", session, ack.owner, room);
        debug!(
            "Total rooms: {}, Total sessions: {}",
            self.rooms.len(),
            self.session_rooms.len()
        );

        if let Err(e) = ack.try_deliver(SessionEvent::Accepted { room: room.clone() }) {
            warn!("Could not acknowledge session {}: {}", session, e);
            if e == SendError::ChannelClosed {
                self.remove_member(&room, session);
            }
        }
    }

    fn handle_deregister(&mut self, room: &RoomKey, session: SessionId) {
        if self.remove_member(room, session) {
            info!("Session {} left {}", session, room);
        }
    }

    fn handle_broadcast(&mut self, room: &RoomKey, event: ChatEvent) {
        let Some(members) = self.rooms.get(room) else {
            debug!("Broadcast to empty room {}", room);
            return;
        };

        let mut closed = Vec::new();
        for client in members.values() {
            match client.try_deliver(SessionEvent::Chat(event.clone())) {
                Ok(()) => {}
                Err(SendError::ChannelClosed) => closed.push(client.id),
                Err(SendError::ChannelFull) => {
                    warn!("Outbox full, dropping event for session {}", client.id);
                }
            }
        }
        debug!("Broadcast to {} sessions in {}", members.len() - closed.len(), room);

        for session in closed {
            debug!("Pruning closed session {} from {}", session, room);
            self.remove_member(room, session);
        }
    }

    /// Remove a session from a room, dropping the room once empty
    ///
    /// Returns true if the session was a member.
    fn remove_member(&mut self, room: &RoomKey, session: SessionId) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };

        let removed = members.remove(&session).is_some();
        if members.is_empty() {
            self.rooms.remove(room);
            debug!("Room {} deleted (empty)", room);
        }
        if removed && self.session_rooms.get(&session) == Some(room) {
            self.session_rooms.remove(&session);
        }
        removed
    }
}

/// Cloneable handle to the router actor
///
/// Constructed once at startup and passed to every connection task.
#[derive(Debug, Clone)]
pub struct RouterHandle {
    sender: mpsc::Sender<RouterCommand>,
}

impl RouterHandle {
    pub fn new(sender: mpsc::Sender<RouterCommand>) -> Self {
        Self { sender }
    }

    async fn send(&self, cmd: RouterCommand) -> Result<(), AppError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| AppError::RouterClosed)
    }

    /// Register `client` under `room`; acknowledged on the client's outbox
    pub async fn register(&self, room: RoomKey, client: Client) -> Result<(), AppError> {
        self.send(RouterCommand::Register { room, client }).await
    }

    pub async fn deregister(&self, room: RoomKey, session: SessionId) -> Result<(), AppError> {
        self.send(RouterCommand::Deregister { room, session }).await
    }

    pub async fn broadcast(&self, room: RoomKey, event: ChatEvent) -> Result<(), AppError> {
        self.send(RouterCommand::Broadcast { room, event }).await
    }

    pub async fn room_size(&self, room: RoomKey) -> Result<usize, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(RouterCommand::RoomSize { room, reply }).await?;
        rx.await.map_err(|_| AppError::RouterClosed)
    }

    pub async fn stats(&self) -> Result<RouterStats, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(RouterCommand::Stats { reply }).await?;
        rx.await.map_err(|_| AppError::RouterClosed)
    }
}
