//! SQLite-backed message store

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::StoreError;
use crate::store::{Message, MessageStore};
use crate::types::Identity;

/// Pool size for file-backed databases
const MAX_CONNECTIONS: u32 = 16;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    sender    TEXT    NOT NULL,
    receiver  TEXT    NOT NULL,
    content   TEXT    NOT NULL,
    timestamp INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS messages_pair ON messages (sender, receiver, timestamp);
";

type MessageRow = (i64, String, String, String, i64);

/// Message store persisted in a SQLite database
///
/// Timestamps are stored as microseconds since the Unix epoch.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `url` (e.g. `sqlite://chat.db`), creating the file and schema if needed
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // every connection to an in-memory database sees its own database
        let max_connections = if url.contains(":memory:") {
            1
        } else {
            MAX_CONNECTIONS
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("Connected to message database {}", url);
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

fn decode(row: MessageRow) -> Result<Message, StoreError> {
    let (id, sender, receiver, content, micros) = row;
    let id = u64::try_from(id).map_err(|_| StoreError::Corrupt(format!("negative id {id}")))?;
    let timestamp = DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {micros} out of range")))?;

    Ok(Message {
        id,
        sender: Identity::new(sender),
        receiver: Identity::new(receiver),
        content,
        timestamp,
    })
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create(
        &self,
        sender: &Identity,
        receiver: &Identity,
        content: &str,
    ) -> Result<Message, StoreError> {
        // clamp to the newest stored timestamp so ordering survives clock steps
        let (id, micros): (i64, i64) = sqlx::query_as(
            "INSERT INTO messages (sender, receiver, content, timestamp)
             SELECT ?, ?, ?, MAX(?, COALESCE(MAX(timestamp), 0)) FROM messages
             RETURNING id, timestamp",
        )
        .bind(sender.as_str())
        .bind(receiver.as_str())
        .bind(content)
        .bind(Utc::now().timestamp_micros())
        .fetch_one(&self.pool)
        .await?;

        decode((
            id,
            sender.to_string(),
            receiver.to_string(),
            content.to_string(),
            micros,
        ))
    }

    async fn conversation(&self, a: &Identity, b: &Identity) -> Result<Vec<Message>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, sender, receiver, content, timestamp FROM messages
             WHERE (sender = ? AND receiver = ?) OR (sender = ? AND receiver = ?)
             ORDER BY timestamp, id",
        )
        .bind(a.as_str())
        .bind(b.as_str())
        .bind(b.as_str())
        .bind(a.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode).collect()
    }

    async fn latest_between(
        &self,
        a: &Identity,
        b: &Identity,
    ) -> Result<Option<Message>, StoreError> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT id, sender, receiver, content, timestamp FROM messages
             WHERE (sender = ? AND receiver = ?) OR (sender = ? AND receiver = ?)
             ORDER BY timestamp DESC, id DESC
             LIMIT 1",
        )
        .bind(a.as_str())
        .bind(b.as_str())
        .bind(b.as_str())
        .bind(a.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode).transpose()
    }
}
