//! Conversation history and correspondent listing
//!
//! Read-only queries over the message store for whatever renders the
//! conversation page. Nothing here touches the router.

use crate::error::StoreError;
use crate::identity::IdentityDirectory;
use crate::store::{Message, MessageStore};
use crate::types::Identity;

/// Another user and the latest message exchanged with them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correspondent {
    pub identity: Identity,
    pub last_message: Option<Message>,
}

/// Messages between `me` and `other`, oldest first
///
/// A non-empty `search` keeps only messages whose content contains it,
/// ignoring case.
pub async fn conversation(
    store: &dyn MessageStore,
    me: &Identity,
    other: &Identity,
    search: Option<&str>,
) -> Result<Vec<Message>, StoreError> {
    let mut messages = store.conversation(me, other).await?;

    if let Some(needle) = search.map(str::to_lowercase).filter(|s| !s.is_empty()) {
        messages.retain(|m| m.content.to_lowercase().contains(&needle));
    }

    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    Ok(messages)
}

/// Every identity other than `me`, most recently active first
///
/// Identities with no message exchanged with `me` come last, by username.
pub async fn correspondents(
    store: &dyn MessageStore,
    directory: &dyn IdentityDirectory,
    me: &Identity,
) -> Result<Vec<Correspondent>, StoreError> {
    let mut listing = Vec::new();
    for identity in directory.identities() {
        if identity == *me {
            continue;
        }
        let last_message = store.latest_between(me, &identity).await?;
        listing.push(Correspondent {
            identity,
            last_message,
        });
    }

    // None sorts below Some; stable sort keeps username order among the silent
    listing.sort_by(|a, b| {
        let a = a.last_message.as_ref().map(|m| (m.timestamp, m.id));
        let b = b.last_message.as_ref().map(|m| (m.timestamp, m.id));
        b.cmp(&a)
    });
    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MemoryDirectory;
    use crate::store::MemoryStore;

    fn id(name: &str) -> Identity {
        Identity::new(name)
    }

    #[tokio::test]
    async fn test_conversation_both_directions_in_order() {
        let store = MemoryStore::new();
        store.create(&id("alice"), &id("bob"), "first").await.unwrap();
        store.create(&id("carol"), &id("alice"), "unrelated").await.unwrap();
        store.create(&id("bob"), &id("alice"), "second").await.unwrap();

        let contents: Vec<String> = conversation(&store, &id("alice"), &id("bob"), None)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_conversation_search_is_case_insensitive() {
        let store = MemoryStore::new();
        store.create(&id("alice"), &id("bob"), "Lunch today?").await.unwrap();
        store.create(&id("bob"), &id("alice"), "sure").await.unwrap();
        store.create(&id("alice"), &id("bob"), "LUNCH at noon").await.unwrap();

        let found = conversation(&store, &id("bob"), &id("alice"), Some("lunch"))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        let all = conversation(&store, &id("bob"), &id("alice"), Some(""))
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_correspondents_sorted_by_latest_message() {
        let directory = MemoryDirectory::new();
        for name in ["alice", "bob", "carol", "dave"] {
            directory.add_user(name, &format!("{name}-token")).unwrap();
        }
        let store = MemoryStore::new();
        store.create(&id("alice"), &id("bob"), "old").await.unwrap();
        store.create(&id("dave"), &id("alice"), "newer").await.unwrap();
        store.create(&id("bob"), &id("carol"), "not mine").await.unwrap();

        let listing = correspondents(&store, &directory, &id("alice")).await.unwrap();
        let names: Vec<&str> = listing.iter().map(|c| c.identity.as_str()).collect();
        assert_eq!(names, vec!["dave", "bob", "carol"]);

        assert_eq!(
            listing[0].last_message.as_ref().map(|m| m.content.as_str()),
            Some("newer")
        );
        assert!(listing[2].last_message.is_none());
    }
}
