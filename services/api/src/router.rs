//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the management REST API, the WebSocket gateway endpoint, and
//! OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AddMessagePayload, AddMessageResponse, CreateSessionPayload, CreateSessionResponse,
        DeleteSessionResponse, ErrorResponse, GenerateTitleResponse, HealthResponse, Message,
        MessageListResponse, MessageRole, Session, SessionDetailResponse, SessionListResponse,
        SessionSummary, UpdateSessionPayload, UpdateSessionResponse,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_sessions,
        handlers::create_session,
        handlers::get_session,
        handlers::update_session,
        handlers::delete_session,
        handlers::get_messages,
        handlers::add_message,
        handlers::generate_title,
        handlers::health_check,
    ),
    components(
        schemas(
            Session, SessionSummary, Message, MessageRole,
            CreateSessionPayload, AddMessagePayload, UpdateSessionPayload,
            SessionListResponse, CreateSessionResponse, SessionDetailResponse,
            MessageListResponse, AddMessageResponse, UpdateSessionResponse,
            DeleteSessionResponse, GenerateTitleResponse, HealthResponse, ErrorResponse
        )
    ),
    tags(
        (name = "Chat Session API", description = "Session management for the conversational avatar gateway")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route(
            "/api/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route(
            "/api/sessions/{session_id}",
            get(handlers::get_session)
                .put(handlers::update_session)
                .delete(handlers::delete_session),
        )
        .route(
            "/api/sessions/{session_id}/messages",
            get(handlers::get_messages).post(handlers::add_message),
        )
        .route(
            "/api/sessions/{session_id}/generate-title",
            post(handlers::generate_title),
        )
        .route("/api/health", get(handlers::health_check))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
