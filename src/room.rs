//! Room key derivation
//!
//! A room is the routing key that groups every connection which should see
//! the same messages. It is derived from the connecting user and the target
//! named in the connection route; nothing about it is ever persisted.

use clap::ValueEnum;

/// Prefix shared by every room key
pub const ROOM_PREFIX: &str = "chat";

/// Replace every character outside `[a-zA-Z0-9_.-]` with `_`.
///
/// Total and idempotent; the empty string maps to itself.
pub fn sanitize_identity(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// How the two participants are combined into a key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum RoomKeyMode {
    /// `chat_{own}_{target}` in connection-perspective order.
    ///
    /// Alice toward Bob and Bob toward Alice land in different rooms.
    #[default]
    Directional,
    /// The two tokens are sorted first, so both sides share one room.
    Sorted,
}

/// Routing key grouping connections (`chat_alice_bob`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomKey(String);

impl RoomKey {
    /// Derive the key for a connection owned by `own` whose route names `target`.
    ///
    /// Both inputs are sanitized here, so callers may pass raw identities.
    pub fn derive(own: &str, target: &str, mode: RoomKeyMode) -> Self {
        let own = sanitize_identity(own);
        let target = sanitize_identity(target);

        let (first, second) = match mode {
            RoomKeyMode::Directional => (own, target),
            RoomKeyMode::Sorted if target < own => (target, own),
            RoomKeyMode::Sorted => (own, target),
        };

        Self(format!("{ROOM_PREFIX}_{first}_{second}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
