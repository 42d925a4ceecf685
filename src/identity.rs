//! Identity directory
//!
//! Authentication and user lookup live outside the relay core. The core only
//! talks to the [`IdentityDirectory`] trait; [`MemoryDirectory`] is the
//! bundled implementation, loaded from a JSON users file at startup.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::types::Identity;

/// Lookup interface consumed by the relay
pub trait IdentityDirectory: Send + Sync {
    /// Resolve a handshake credential to the identity it belongs to
    fn authenticate(&self, credential: &str) -> Option<Identity>;

    /// Find the identity named `token`, unless it is `excluding`
    fn resolve(&self, token: &str, excluding: &Identity) -> Option<Identity>;

    /// Every known identity, sorted by username
    fn identities(&self) -> Vec<Identity>;
}

/// One entry of the users file
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub token: String,
}

#[derive(Debug, Default)]
struct Index {
    by_username: HashMap<String, Identity>,
    by_token: HashMap<String, Identity>,
}

/// In-memory directory indexed by username and by credential
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    index: RwLock<Index>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from user records
    ///
    /// Fails on empty usernames or tokens and on duplicates of either.
    pub fn from_records(records: Vec<UserRecord>) -> Result<Self, AppError> {
        let directory = Self::new();
        for record in records {
            directory.add_user(&record.username, &record.token)?;
        }
        Ok(directory)
    }

    /// Load a JSON array of `{"username", "token"}` records
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        let records: Vec<UserRecord> = serde_json::from_str(&raw)?;
        let directory = Self::from_records(records)?;
        info!(
            "Loaded {} users from {}",
            directory.index.read().by_username.len(),
            path.display()
        );
        Ok(directory)
    }

    /// Register a user and the credential that authenticates them
    pub fn add_user(&self, username: &str, token: &str) -> Result<Identity, AppError> {
        if username.is_empty() || token.is_empty() {
            return Err(AppError::InvalidUsers(
                "username and token must be non-empty".to_string(),
            ));
        }

        let mut index = self.index.write();
        if index.by_username.contains_key(username) {
            return Err(AppError::InvalidUsers(format!(
                "duplicate username '{username}'"
            )));
        }
        if index.by_token.contains_key(token) {
            return Err(AppError::InvalidUsers(format!(
                "duplicate token for '{username}'"
            )));
        }

        let identity = Identity::new(username);
        index
            .by_username
            .insert(username.to_string(), identity.clone());
        index.by_token.insert(token.to_string(), identity.clone());
        Ok(identity)
    }
}

impl IdentityDirectory for MemoryDirectory {
    fn authenticate(&self, credential: &str) -> Option<Identity> {
        self.index.read().by_token.get(credential).cloned()
    }

    fn resolve(&self, token: &str, excluding: &Identity) -> Option<Identity> {
        self.index
            .read()
            .by_username
            .get(token)
            .filter(|identity| *identity != excluding)
            .cloned()
    }

    fn identities(&self) -> Vec<Identity> {
        let mut all: Vec<Identity> = self.index.read().by_username.values().cloned().collect();
        all.sort();
        all
    }
}
