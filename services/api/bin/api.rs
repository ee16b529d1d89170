//! Main Entrypoint for the Avatar Gateway Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the SQLite pool and applying the schema.
//! 3. Initializing the agent runner and turn consolidator.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use avatar_api::{
    config::{Config, Provider},
    db::Db,
    registry::ConnectionRegistry,
    router::create_router,
    state::AppState,
};
use avatar_core::{AgentRunner, EventConsolidator, runner::OpenAiChatRunner};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, net::SocketAddr, str::FromStr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional business assistant. \
Answer concisely and concretely, and do not invent facts you cannot know.";

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Database ---
    // Schema initialization failure is fatal: no connections are accepted
    // until the store is known-good.
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .context("Invalid DATABASE_URL")?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;
    let db = Arc::new(Db::new(pool));
    db.initialize()
        .await
        .context("Failed to initialize database schema")?;
    info!("Database connection established and schema is up-to-date.");

    // --- 4. Initialize Agent Runner ---
    let system_prompt = match &config.system_prompt_path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read system prompt from {}", path.display()))?,
        None => DEFAULT_SYSTEM_PROMPT.to_string(),
    };

    let runner: Arc<dyn AgentRunner> = match &config.provider {
        Provider::OpenAi => {
            info!("Using OpenAI provider.");
            let api_key = config.openai_api_key.as_deref().unwrap_or_default();
            let openai_config = OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base("https://api.openai.com/v1/");
            Arc::new(OpenAiChatRunner::new(
                openai_config,
                config.chat_model.clone(),
                system_prompt,
            ))
        }
        Provider::Gemini => {
            info!("Using Gemini provider.");
            let api_key = config.gemini_api_key.as_deref().unwrap_or_default();
            let openai_config = OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base("https://generativelanguage.googleapis.com/v1beta/openai");
            Arc::new(OpenAiChatRunner::new(
                openai_config,
                config.chat_model.clone(),
                system_prompt,
            ))
        }
    };

    let app_state = Arc::new(AppState {
        registry: ConnectionRegistry::new(db.clone(), config.agent_name.clone()),
        consolidator: EventConsolidator::new(runner),
        db,
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
