//! Message store
//!
//! Durable append-only record of delivered messages. The relay writes through
//! [`MessageStore::create`] before every broadcast; the history service reads
//! back through the query methods.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::types::Identity;

/// Persisted message
///
/// The store assigns `id` and `timestamp`; records are never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: u64,
    pub sender: Identity,
    pub receiver: Identity,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// True if this message was exchanged between `a` and `b`, either direction
    pub fn is_between(&self, a: &Identity, b: &Identity) -> bool {
        (self.sender == *a && self.receiver == *b) || (self.sender == *b && self.receiver == *a)
    }
}

/// Storage interface consumed by the relay and the history service
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message, stamping it with the server time
    async fn create(
        &self,
        sender: &Identity,
        receiver: &Identity,
        content: &str,
    ) -> Result<Message, StoreError>;

    /// All messages between `a` and `b`, oldest first
    async fn conversation(&self, a: &Identity, b: &Identity) -> Result<Vec<Message>, StoreError>;

    /// The most recent message between `a` and `b`
    async fn latest_between(
        &self,
        a: &Identity,
        b: &Identity,
    ) -> Result<Option<Message>, StoreError>;
}

/// Process-lifetime store, used when no database is configured
#[derive(Debug, Default)]
pub struct MemoryStore {
    messages: RwLock<Vec<Message>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create(
        &self,
        sender: &Identity,
        receiver: &Identity,
        content: &str,
    ) -> Result<Message, StoreError> {
        let mut messages = self.messages.write().await;

        // wall clock may step backwards; keep timestamps non-decreasing
        let now = Utc::now();
        let timestamp = match messages.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };

        let message = Message {
            id: messages.len() as u64 + 1,
            sender: sender.clone(),
            receiver: receiver.clone(),
            content: content.to_string(),
            timestamp,
        };
        messages.push(message.clone());
        Ok(message)
    }

    async fn conversation(&self, a: &Identity, b: &Identity) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect())
    }

    async fn latest_between(
        &self,
        a: &Identity,
        b: &Identity,
    ) -> Result<Option<Message>, StoreError> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .rev()
            .find(|m| m.is_between(a, b))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity::new("alice")
    }

    fn bob() -> Identity {
        Identity::new("bob")
    }

    fn carol() -> Identity {
        Identity::new("carol")
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_timestamp() {
        let store = MemoryStore::new();
        let first = store.create(&alice(), &bob(), "hi").await.unwrap();
        let second = store.create(&bob(), &alice(), "hey").await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert!(second.timestamp >= first.timestamp);
        assert_eq!(first.content, "hi");
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_conversation_filters_pair() {
        let store = MemoryStore::new();
        store.create(&alice(), &bob(), "one").await.unwrap();
        store.create(&alice(), &carol(), "other").await.unwrap();
        store.create(&bob(), &alice(), "two").await.unwrap();

        let contents: Vec<String> = store
            .conversation(&alice(), &bob())
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_latest_between() {
        let store = MemoryStore::new();
        assert!(store.latest_between(&alice(), &bob()).await.unwrap().is_none());

        store.create(&alice(), &bob(), "one").await.unwrap();
        store.create(&bob(), &alice(), "two").await.unwrap();
        store.create(&alice(), &carol(), "three").await.unwrap();

        let latest = store.latest_between(&bob(), &alice()).await.unwrap().unwrap();
        assert_eq!(latest.content, "two");
    }
}
