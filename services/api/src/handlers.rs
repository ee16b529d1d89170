//! Axum Handlers for the Session Management REST API
//!
//! This module contains the logic for handling HTTP requests for session
//! management: listing, creating, renaming and deleting sessions, direct
//! message appends, title auto-generation, and a health probe. It uses
//! `utoipa` doc comments to generate OpenAPI documentation.
//!
//! Every response carries an explicit `success` flag; storage failures
//! surface as HTTP 500 with `success: false` and an error text.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::error;

use crate::{
    models::{
        AddMessagePayload, AddMessageResponse, CreateSessionPayload, CreateSessionResponse,
        DEFAULT_SESSION_TITLE, DeleteSessionResponse, ErrorResponse, GenerateTitleResponse,
        HealthResponse, ListSessionsQuery, MessageListResponse, SessionDetailResponse,
        SessionListResponse, UpdateSessionPayload, UpdateSessionResponse,
    },
    state::AppState,
};

const DEFAULT_SESSION_LIMIT: i64 = 50;

/// Wraps any handler failure; rendered as a 500 with an explicit
/// `success: false` body, with the detail kept in the server log.
pub struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Internal Server Error: {:?}", self.0);
        let body = ErrorResponse {
            success: false,
            error: self.0.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// List sessions for a user, most recently active first.
#[utoipa::path(
    get,
    path = "/api/sessions",
    params(ListSessionsQuery),
    responses(
        (status = 200, description = "List of sessions", body = SessionListResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let user_id = query
        .user_id
        .unwrap_or_else(|| state.config.default_user_id.clone());
    let limit = query.limit.unwrap_or(DEFAULT_SESSION_LIMIT);

    let sessions = state.db.list_sessions(&user_id, limit).await?;
    let count = sessions.len();
    Ok(Json(SessionListResponse {
        success: true,
        sessions,
        count,
    }))
}

/// Create a new session.
#[utoipa::path(
    post,
    path = "/api/sessions",
    request_body = CreateSessionPayload,
    responses(
        (status = 200, description = "Session created", body = CreateSessionResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionPayload>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let title = payload
        .title
        .unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string());
    let user_id = payload
        .user_id
        .unwrap_or_else(|| state.config.default_user_id.clone());

    let session = state
        .db
        .create_session(&title, &user_id, &state.config.agent_name)
        .await?;

    Ok(Json(CreateSessionResponse {
        success: true,
        session_id: session.id,
        title: session.title,
    }))
}

/// Fetch a session's messages together with their count.
#[utoipa::path(
    get,
    path = "/api/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session details", body = SessionDetailResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionDetailResponse>, ApiError> {
    let messages = state.db.list_messages(&session_id).await?;
    let message_count = messages.len();
    Ok(Json(SessionDetailResponse {
        success: true,
        session_id,
        messages,
        message_count,
    }))
}

/// Update a session's title.
#[utoipa::path(
    put,
    path = "/api/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Session ID")),
    request_body = UpdateSessionPayload,
    responses(
        (status = 200, description = "Session updated", body = UpdateSessionResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn update_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<UpdateSessionPayload>,
) -> Result<Json<UpdateSessionResponse>, ApiError> {
    state.db.update_title(&session_id, &payload.title).await?;
    Ok(Json(UpdateSessionResponse {
        success: true,
        session_id,
        title: payload.title,
    }))
}

/// Delete a session and, by cascade, all of its messages.
#[utoipa::path(
    delete,
    path = "/api/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session deleted", body = DeleteSessionResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<DeleteSessionResponse>, ApiError> {
    state.db.delete_session(&session_id).await?;
    Ok(Json(DeleteSessionResponse {
        success: true,
        message: "Session deleted".to_string(),
    }))
}

/// Fetch a session's messages.
#[utoipa::path(
    get,
    path = "/api/sessions/{session_id}/messages",
    params(("session_id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Messages in chronological order", body = MessageListResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<MessageListResponse>, ApiError> {
    let messages = state.db.list_messages(&session_id).await?;
    Ok(Json(MessageListResponse {
        success: true,
        session_id,
        messages,
    }))
}

/// Append a message to a session directly.
#[utoipa::path(
    post,
    path = "/api/sessions/{session_id}/messages",
    params(("session_id" = String, Path, description = "Session ID")),
    request_body = AddMessagePayload,
    responses(
        (status = 200, description = "Message appended", body = AddMessageResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn add_message(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<AddMessagePayload>,
) -> Result<Json<AddMessageResponse>, ApiError> {
    let message = state
        .db
        .add_message(&session_id, payload.role, &payload.content, payload.metadata)
        .await?;
    Ok(Json(AddMessageResponse {
        success: true,
        message_id: message.id,
        session_id,
    }))
}

/// Derive a title from the session's history and apply it.
#[utoipa::path(
    post,
    path = "/api/sessions/{session_id}/generate-title",
    params(("session_id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Title generated and applied", body = GenerateTitleResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn generate_title(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<GenerateTitleResponse>, ApiError> {
    let title = state.db.generate_title(&session_id).await?;
    state.db.update_title(&session_id, &title).await?;
    Ok(Json(GenerateTitleResponse {
        success: true,
        session_id,
        title,
    }))
}

/// Health probe.
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "Chat Session API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
