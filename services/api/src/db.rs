//! Persistent session store
//!
//! This module contains all the functions for interacting with the SQLite
//! database. It uses `sqlx` for connection pooling and runtime-checked
//! queries; the schema is applied through `sqlx` migrations.
//!
//! Two invariants are enforced here rather than trusted to callers: a
//! message insert always advances the owning session's `updated_at` in the
//! same transaction, and foreign keys are expected to be ON so a message can
//! never be written against a session that does not exist.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{Message, MessageRole, Session, SessionSummary};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Failures surfaced by the store. On the management surface these become
/// explicit failure responses; on the chat path they become `error`
/// envelopes for the affected turn.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("schema migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// A wrapper around the `SqlitePool` to provide a clear data access
/// interface.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Applies the schema. Idempotent: already-applied migrations are
    /// skipped, so repeated calls (or concurrent processes) are safe.
    pub async fn initialize(&self) -> Result<(), StorageError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    /// Creates a new session with a fresh id; `created_at` and `updated_at`
    /// start equal.
    pub async fn create_session(
        &self,
        title: &str,
        user_id: &str,
        agent_name: &str,
    ) -> Result<Session, StorageError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id, title, created_at, updated_at, user_id, agent_name, metadata)
            VALUES (?, ?, ?, ?, ?, ?, '{}')
            RETURNING id, title, created_at, updated_at, user_id, agent_name, metadata
            "#,
        )
        .bind(&id)
        .bind(title)
        .bind(now)
        .bind(now)
        .bind(user_id)
        .bind(agent_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    /// Appends a message and advances the owning session's `updated_at` to
    /// the message's timestamp, as a single transaction. A concurrent
    /// reader of the session list never observes one without the other.
    pub async fn add_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Message, StorageError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let metadata = Json(metadata.unwrap_or_default());

        let mut tx = self.pool.begin().await?;

        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (id, session_id, role, content, timestamp, metadata)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, session_id, role, content, timestamp, metadata
            "#,
        )
        .bind(&id)
        .bind(session_id)
        .bind(role)
        .bind(content)
        .bind(now)
        .bind(metadata)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(message)
    }

    /// Lists a user's sessions, most recently active first, each with its
    /// true message count at query time.
    pub async fn list_sessions(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<SessionSummary>, StorageError> {
        let sessions = sqlx::query_as::<_, SessionSummary>(
            r#"
            SELECT id, title, created_at, updated_at,
                   (SELECT COUNT(*) FROM messages WHERE session_id = sessions.id) AS message_count
            FROM sessions
            WHERE user_id = ?
            ORDER BY updated_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    /// Retrieves a session's full history in chronological order. Rowid
    /// breaks ties between same-instant inserts so order stays insertion
    /// order.
    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>, StorageError> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, session_id, role, content, timestamp, metadata
            FROM messages
            WHERE session_id = ?
            ORDER BY timestamp ASC, rowid ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    /// Renames a session. Also bumps `updated_at` so the session surfaces
    /// in the listing.
    pub async fn update_title(&self, session_id: &str, title: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE sessions SET title = ?, updated_at = ? WHERE id = ?")
            .bind(title)
            .bind(Utc::now())
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes a session; its messages go with it via ON DELETE CASCADE.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Derives a display title from the session's history. See
    /// [`derive_title`] for the policy.
    pub async fn generate_title(&self, session_id: &str) -> Result<String, StorageError> {
        let messages = self.list_messages(session_id).await?;
        Ok(derive_title(&messages, Utc::now()))
    }
}

/// Maximum number of characters of the first user message used as a title.
const TITLE_MAX_CHARS: usize = 50;

/// Three-tier title derivation, pure and deterministic given the message
/// list: the first user message truncated to 50 characters (ellipsis
/// appended when truncated); else a date-stamped placeholder; else the fixed
/// empty-conversation marker.
pub fn derive_title(messages: &[Message], now: DateTime<Utc>) -> String {
    if messages.is_empty() {
        return "Empty conversation".to_string();
    }

    if let Some(user_message) = messages.iter().find(|m| m.role == MessageRole::User) {
        let mut title: String = user_message.content.chars().take(TITLE_MAX_CHARS).collect();
        if user_message.content.chars().count() > TITLE_MAX_CHARS {
            title.push_str("...");
        }
        return title;
    }

    format!("Conversation on {}", now.format("%d.%m.%Y"))
}

#[cfg(test)]
pub(crate) async fn in_memory() -> Db {
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    // A pool of one: every handle must see the same in-memory database.
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("valid sqlite url")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("in-memory sqlite");

    let db = Db::new(pool);
    db.initialize().await.expect("schema initialization");
    db
}
