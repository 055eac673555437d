use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error as SqlxError;
use std::time::Duration;
use tracing::info;

use super::{ChatStore, DocumentStore, StoreError, StoredDocument};
use crate::models::ChatMessage;

#[derive(sqlx::FromRow)]
struct DocumentRow {
    title: String,
    state: Option<Vec<u8>>,
}

#[derive(sqlx::FromRow)]
struct ChatMessageRow {
    username: String,
    message: String,
    created_at: DateTime<Utc>,
}

/// PostgreSQL-backed document and chat storage
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool
    pub async fn new(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600)) // Close idle connections after 10 minutes
            .max_lifetime(Duration::from_secs(1800)) // Recycle connections after 30 minutes
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Create the tables this service reads and writes, if absent.
    ///
    /// Document rows themselves are inserted by the external CRUD API; the
    /// schema is bootstrapped here so a fresh deployment can start against an
    /// empty database.
    pub async fn init_schema(&self) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                document_id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT 'Untitled Document',
                state BYTEA,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id BIGSERIAL PRIMARY KEY,
                document_id TEXT NOT NULL,
                username TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS chat_messages_document_idx ON chat_messages (document_id, id)",
        )
        .execute(&self.pool)
        .await?;

        info!("Database schema initialized");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn load_document(&self, document_id: &str) -> Result<Option<StoredDocument>, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT title, state FROM documents WHERE document_id = $1",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| StoredDocument {
            state: row.state.unwrap_or_default(),
            title: row.title,
        }))
    }

    async fn save_document_state(&self, document_id: &str, state: &[u8]) -> Result<(), StoreError> {
        sqlx::query("UPDATE documents SET state = $2, updated_at = NOW() WHERE document_id = $1")
            .bind(document_id)
            .bind(state)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_document_title(&self, document_id: &str, title: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE documents SET title = $2, updated_at = NOW() WHERE document_id = $1")
            .bind(document_id)
            .bind(title)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn load_messages(&self, document_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query_as::<_, ChatMessageRow>(
            "SELECT username, message, created_at FROM chat_messages WHERE document_id = $1 ORDER BY id",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ChatMessage {
                username: row.username,
                message: row.message,
                timestamp: row.created_at,
            })
            .collect())
    }

    async fn append_message(
        &self,
        document_id: &str,
        message: &ChatMessage,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO chat_messages (document_id, username, message, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(document_id)
        .bind(&message.username)
        .bind(&message.message)
        .bind(message.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
