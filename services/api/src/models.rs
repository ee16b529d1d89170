//! API and Database Models
//!
//! This module defines the core data structures used for both database
//! mapping with `sqlx` and for generating OpenAPI documentation with
//! `utoipa`. Management-surface responses all carry an explicit `success`
//! flag, matching what the UI consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use std::fmt;
use utoipa::ToSchema;

/// Title given to sessions created implicitly by the chat path, and to
/// management creations that omit one.
pub const DEFAULT_SESSION_TITLE: &str = "New conversation";

/// Opaque per-session / per-message key-value metadata, persisted as JSON
/// text.
pub type Metadata = Json<serde_json::Map<String, serde_json::Value>>;

/// The closed set of message authors. Any other value is rejected both at
/// deserialization time and by the schema's CHECK constraint.
#[derive(sqlx::Type, Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// A persistent conversation. `updated_at` advances to the timestamp of the
/// most recently appended message and is never behind `created_at`.
#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: String,
    pub agent_name: String,
    #[schema(value_type = Object)]
    pub metadata: Metadata,
}

/// A session row as returned by the listing query, augmented with the true
/// message count at query time.
#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: i64,
}

/// One immutable message within a session.
#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub metadata: Metadata,
}

// --- Request payloads ---

#[derive(Deserialize, ToSchema)]
pub struct CreateSessionPayload {
    #[schema(example = "Quarterly planning")]
    pub title: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct AddMessagePayload {
    #[schema(value_type = String, example = "user")]
    pub role: MessageRole,
    pub content: String,
    #[schema(value_type = Object)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateSessionPayload {
    pub title: String,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct ListSessionsQuery {
    pub user_id: Option<String>,
    pub limit: Option<i64>,
}

// --- Response payloads ---

#[derive(Serialize, ToSchema)]
pub struct SessionListResponse {
    pub success: bool,
    pub sessions: Vec<SessionSummary>,
    pub count: usize,
}

#[derive(Serialize, ToSchema)]
pub struct CreateSessionResponse {
    pub success: bool,
    pub session_id: String,
    pub title: String,
}

#[derive(Serialize, ToSchema)]
pub struct SessionDetailResponse {
    pub success: bool,
    pub session_id: String,
    pub messages: Vec<Message>,
    pub message_count: usize,
}

#[derive(Serialize, ToSchema)]
pub struct MessageListResponse {
    pub success: bool,
    pub session_id: String,
    pub messages: Vec<Message>,
}

#[derive(Serialize, ToSchema)]
pub struct AddMessageResponse {
    pub success: bool,
    pub message_id: String,
    pub session_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct UpdateSessionResponse {
    pub success: bool,
    pub session_id: String,
    pub title: String,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteSessionResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct GenerateTitleResponse {
    pub success: bool,
    pub session_id: String,
    pub title: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}
