//! Connection session
//!
//! One live connection for one authenticated user against one room. The
//! session is transport-agnostic: the handler feeds it the handshake, the
//! inbound text frames and the router's events, and writes whatever it hands
//! back to the socket.
//!
//! Lifecycle: `Pending` (handshake validated, not yet registered) → `Open`
//! (router acknowledged the registration) → `Closed`. A handshake that fails
//! validation never produces a session at all.

use percent_encoding::percent_decode_str;
use tracing::{debug, error, warn};

use crate::error::{AppError, HandshakeError};
use crate::identity::IdentityDirectory;
use crate::message::{ChatEvent, ClientMessage, SessionEvent};
use crate::room::{sanitize_identity, RoomKey, RoomKeyMode};
use crate::server::RelayState;
use crate::store::Message;
use crate::types::{Identity, SessionId};

/// Path prefix of the chat route: `/ws/chat/{target}/`
pub const ROUTE_PREFIX: &str = "/ws/chat/";

/// Query parameter carrying the credential when no header can be set
pub const TOKEN_PARAM: &str = "token";

/// What the transport handshake carried
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Target identity named by the route, percent-decoded
    pub target: Option<String>,
    /// Credential for the identity directory
    pub credential: Option<String>,
}

impl HandshakeRequest {
    /// Extract target and credential from the pieces of an HTTP upgrade request
    ///
    /// The `Authorization: Bearer` header wins over the `token` query parameter.
    pub fn from_parts(path: &str, query: Option<&str>, authorization: Option<&str>) -> Self {
        let target = path
            .strip_prefix(ROUTE_PREFIX)
            .map(|rest| rest.strip_suffix('/').unwrap_or(rest))
            .filter(|segment| !segment.is_empty() && !segment.contains('/'))
            .and_then(decode_component);

        let credential = authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .or_else(|| query.and_then(query_token))
            .filter(|token| !token.is_empty());

        Self { target, credential }
    }
}

fn decode_component(raw: &str) -> Option<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

fn query_token(query: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == TOKEN_PARAM)
        .and_then(|(_, value)| decode_component(value))
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Open,
    Closed,
}

/// Result of handling one inbound frame
///
/// Every variant other than `Delivered` is a deliberate no-op: nothing is
/// stored, nothing is broadcast and nothing is sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Stored and handed to the router
    Delivered(Message),
    /// The session is not open
    NotOpen,
    /// Not JSON, or no string `message` field
    Malformed,
    /// The route's target names no other known identity
    UnknownReceiver,
    /// The store refused the write; nothing was broadcast
    PersistenceFailed,
}

/// One connection's subscription state
#[derive(Debug)]
pub struct ConnectionSession {
    id: SessionId,
    owner: Identity,
    target: String,
    room: RoomKey,
    state: SessionState,
}

impl ConnectionSession {
    /// Validate a handshake and build a `Pending` session
    ///
    /// Requires a credential the directory accepts and a non-empty target,
    /// both sanitizing to non-empty tokens.
    pub fn handshake(
        directory: &dyn IdentityDirectory,
        request: &HandshakeRequest,
        mode: RoomKeyMode,
    ) -> Result<Self, HandshakeError> {
        let owner = request
            .credential
            .as_deref()
            .and_then(|credential| directory.authenticate(credential))
            .ok_or(HandshakeError::Unauthenticated)?;

        let target = request
            .target
            .clone()
            .filter(|target| !target.is_empty())
            .ok_or_else(|| HandshakeError::InvalidRoute("missing target".to_string()))?;

        if sanitize_identity(owner.as_str()).is_empty() || sanitize_identity(&target).is_empty() {
            return Err(HandshakeError::InvalidRoute(format!(
                "'{owner}' -> '{target}' sanitizes to an empty token"
            )));
        }

        let room = RoomKey::derive(owner.as_str(), &target, mode);
        Ok(Self {
            id: SessionId::new(),
            owner,
            target,
            room,
            state: SessionState::Pending,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn owner(&self) -> &Identity {
        &self.owner
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn room(&self) -> &RoomKey {
        &self.room
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Handle one router event
    ///
    /// `Accepted` opens a pending session; `Chat` comes back as the frame to
    /// send. Chat events for a session that is not open are skipped.
    pub fn dispatch(&mut self, event: SessionEvent) -> Option<ChatEvent> {
        match event {
            SessionEvent::Accepted { room } => {
                if self.state == SessionState::Pending && room == self.room {
                    self.state = SessionState::Open;
                    debug!("Session {} open in {}", self.id, self.room);
                }
                None
            }
            SessionEvent::Chat(chat) if self.is_open() => Some(chat),
            SessionEvent::Chat(_) => {
                debug!("Skipping event for session {} in state {:?}", self.id, self.state);
                None
            }
        }
    }

    /// Move to `Closed`
    ///
    /// Returns the room to deregister from if the session was registered.
    pub fn close(&mut self) -> Option<RoomKey> {
        let was_open = self.state == SessionState::Open;
        self.state = SessionState::Closed;
        was_open.then(|| self.room.clone())
    }

    /// Handle one inbound text frame
    ///
    /// The store write always completes before the broadcast is submitted.
    /// Only a dead router is an error; everything else is an outcome.
    pub async fn receive(
        &self,
        text: &str,
        state: &RelayState,
    ) -> Result<ReceiveOutcome, AppError> {
        if !self.is_open() {
            return Ok(ReceiveOutcome::NotOpen);
        }

        let content = match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage { message }) => message,
            Err(e) => {
                warn!("Malformed payload from session {}: {}", self.id, e);
                return Ok(ReceiveOutcome::Malformed);
            }
        };

        let Some(receiver) = state.directory.resolve(&self.target, &self.owner) else {
            debug!(
                "No receiver '{}' for session {}, dropping message",
                self.target, self.id
            );
            return Ok(ReceiveOutcome::UnknownReceiver);
        };

        let stored = match state.store.create(&self.owner, &receiver, &content).await {
            Ok(stored) => stored,
            Err(e) => {
                error!(
                    "Failed to store message {} -> {}: {}",
                    self.owner, receiver, e
                );
                return Ok(ReceiveOutcome::PersistenceFailed);
            }
        };

        state
            .router
            .broadcast(
                self.room.clone(),
                ChatEvent {
                    sender: self.owner.clone(),
                    receiver,
                    message: content,
                },
            )
            .await?;

        Ok(ReceiveOutcome::Delivered(stored))
    }
}
