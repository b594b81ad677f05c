//! The two services this module publishes: a per-session message history and
//! a flat key/value fact store, both backed by the same SQLite pool.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone)]
pub struct HistoryMessage {
    pub seq: i64,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends a message to `session_id`'s history, returning its sequence
    /// number. Sequence numbers are monotonic and gapless per session.
    async fn append(&self, session_id: &str, role: &str, content: &str) -> anyhow::Result<i64>;

    /// The most recent `limit` messages for `session_id`, oldest first.
    async fn recent(&self, session_id: &str, limit: u32) -> anyhow::Result<Vec<HistoryMessage>>;
}

#[async_trait]
pub trait FactStore: Send + Sync {
    async fn put(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()>;
    async fn get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>>;
}

pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append(&self, session_id: &str, role: &str, content: &str) -> anyhow::Result<i64> {
        let mut tx = self.pool.begin().await?;
        let next_seq: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO messages (session_id, seq, role, content, created_at) VALUES (?, ?, ?, ?, datetime('now'))",
        )
        .bind(session_id)
        .bind(next_seq)
        .bind(role)
        .bind(content)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(next_seq)
    }

    async fn recent(&self, session_id: &str, limit: u32) -> anyhow::Result<Vec<HistoryMessage>> {
        let rows = sqlx::query(
            "SELECT seq, role, content, created_at FROM messages WHERE session_id = ? ORDER BY seq DESC LIMIT ?",
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<HistoryMessage> = rows
            .into_iter()
            .map(|row| HistoryMessage {
                seq: row.get("seq"),
                role: row.get("role"),
                content: row.get("content"),
                created_at: row.get("created_at"),
            })
            .collect();
        messages.reverse();
        Ok(messages)
    }
}

pub struct SqliteFactStore {
    pool: SqlitePool,
}

impl SqliteFactStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FactStore for SqliteFactStore {
    async fn put(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()> {
        let raw = serde_json::to_string(&value)?;
        sqlx::query("INSERT INTO facts (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value")
            .bind(key)
            .bind(raw)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM facts WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some((raw,)) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

pub(crate) const MIGRATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    session_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (session_id, seq)
);
CREATE TABLE IF NOT EXISTS facts (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
