//! Append-only log of answered questions.

use std::path::Path;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::types::ChatExchange;

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS chat_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    question TEXT NOT NULL,
    answer TEXT NOT NULL,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
    model TEXT
)";

#[derive(Clone)]
pub struct ChatHistory {
    pool: SqlitePool,
}

impl ChatHistory {
    /// Open (creating if absent) the database file and ensure the table exists.
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn record(&self, question: &str, answer: &str, model: &str) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO chat_history (question, answer, timestamp, model) VALUES (?, ?, ?, ?)",
        )
        .bind(question)
        .bind(answer)
        .bind(Utc::now())
        .bind(model)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Most recent exchanges, newest first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<ChatExchange>, sqlx::Error> {
        sqlx::query_as::<_, ChatExchange>(
            "SELECT id, question, answer, timestamp, model FROM chat_history ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
pub(crate) async fn in_memory() -> ChatHistory {
    // One connection: every new in-memory connection is a fresh database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    ChatHistory::with_pool(pool).await.unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_read_back() {
        let history = in_memory().await;

        let first = history.record("hello", "hi", "llama3").await.unwrap();
        let second = history.record("2+2?", "4", "llama3").await.unwrap();
        assert!(second > first);

        let rows = history.recent(10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].question, "2+2?");
        assert_eq!(rows[1].answer, "hi");
        assert_eq!(rows[1].model.as_deref(), Some("llama3"));
    }

    #[tokio::test]
    async fn test_recent_respects_limit() {
        let history = in_memory().await;
        for i in 0..5 {
            history.record(&format!("q{i}"), "a", "m").await.unwrap();
        }
        let rows = history.recent(2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].question, "q4");
    }

    #[tokio::test]
    async fn test_open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");

        let history = ChatHistory::open(&path).await.unwrap();
        history.record("q", "a", "m").await.unwrap();

        assert!(path.exists());
        let reopened = ChatHistory::open(&path).await.unwrap();
        assert_eq!(reopened.recent(10).await.unwrap().len(), 1);
    }
}
