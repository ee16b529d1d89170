//! Drives one chat turn end to end.
//!
//! A turn is: resolve the connection's session, record the user message,
//! consolidate the agent's reply, record the assistant message, and emit the
//! reply envelopes. This is separated from the socket loop so the whole
//! contract is exercisable without a live WebSocket.

use crate::models::MessageRole;
use crate::registry::ConnectionId;
use crate::state::AppState;
use crate::ws::protocol::ServerMessage;
use std::sync::Arc;
use tracing::{error, info};

/// Runs one turn to completion and returns the envelopes to deliver, in
/// order. Never fails: storage errors become `error` envelopes for this
/// turn and the connection stays usable. Persistence happens before any
/// envelope is handed to the transport, so a socket dying mid-turn cannot
/// lose the exchange.
pub async fn process_chat_turn(
    state: &Arc<AppState>,
    conn: ConnectionId,
    user_text: &str,
) -> Vec<ServerMessage> {
    let binding = match state
        .registry
        .resolve(conn, &state.config.default_user_id)
        .await
    {
        Ok(binding) => binding,
        Err(e) => {
            error!(%conn, error = %e, "failed to bind connection to a session");
            return vec![ServerMessage::error(format!(
                "Could not open a conversation session: {e}"
            ))];
        }
    };

    if let Err(e) = state
        .db
        .add_message(&binding.session_id, MessageRole::User, user_text, None)
        .await
    {
        error!(session_id = %binding.session_id, error = %e, "failed to record user message");
        return vec![ServerMessage::error(format!(
            "Could not record the message: {e}"
        ))];
    }

    let reply = state
        .consolidator
        .run_turn(&binding.session_id, &binding.user_id, user_text)
        .await;
    if reply.is_degraded() {
        info!(session_id = %binding.session_id, reason = reply.reason(), "turn degraded");
    }

    // Degraded replies are persisted like any other, with the failure
    // reason kept in the message metadata.
    let metadata = reply.reason().map(|reason| {
        let mut map = serde_json::Map::new();
        map.insert("degraded".into(), serde_json::Value::Bool(true));
        map.insert("reason".into(), serde_json::Value::String(reason.into()));
        map
    });

    if let Err(e) = state
        .db
        .add_message(
            &binding.session_id,
            MessageRole::Assistant,
            reply.text(),
            metadata,
        )
        .await
    {
        error!(session_id = %binding.session_id, error = %e, "failed to record assistant message");
        return vec![
            ServerMessage::response_chunk(reply.text()),
            ServerMessage::error(format!("Could not record the reply: {e}")),
        ];
    }

    vec![
        ServerMessage::response_chunk(reply.text()),
        ServerMessage::response_complete(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Provider};
    use crate::db;
    use crate::registry::ConnectionRegistry;
    use anyhow::Result;
    use async_trait::async_trait;
    use avatar_core::{AgentRunner, EventConsolidator, TurnEvent, TurnStream};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tracing::Level;

    /// Replies "echo: <input>"; the first turn can be slowed down to check
    /// sequencing.
    struct EchoRunner {
        calls: AtomicUsize,
        first_turn_delay: Duration,
    }

    impl EchoRunner {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                first_turn_delay: Duration::ZERO,
            }
        }

        fn with_slow_first_turn(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                first_turn_delay: delay,
            }
        }
    }

    #[async_trait]
    impl AgentRunner for EchoRunner {
        async fn run(&self, _: &str, _: &str, user_text: &str) -> Result<TurnStream> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(self.first_turn_delay).await;
            }
            let reply = format!("echo: {user_text}");
            Ok(Box::pin(futures::stream::iter(vec![Ok(
                TurnEvent::Final(reply),
            )])))
        }
    }

    /// Fails every turn mid-stream.
    struct FailingRunner;

    #[async_trait]
    impl AgentRunner for FailingRunner {
        async fn run(&self, _: &str, _: &str, _: &str) -> Result<TurnStream> {
            Ok(Box::pin(futures::stream::iter(vec![Ok(TurnEvent::Error(
                "model unavailable".into(),
            ))])))
        }
    }

    async fn state_with(runner: Arc<dyn AgentRunner>) -> Arc<AppState> {
        let db = Arc::new(db::in_memory().await);
        let config = Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            database_url: "sqlite::memory:".into(),
            provider: Provider::Gemini,
            openai_api_key: None,
            gemini_api_key: Some("test-key".into()),
            chat_model: "test-model".into(),
            default_user_id: "default_user".into(),
            agent_name: "business-agent".into(),
            system_prompt_path: None,
            log_level: Level::INFO,
        };
        Arc::new(AppState {
            registry: ConnectionRegistry::new(db.clone(), config.agent_name.clone()),
            consolidator: EventConsolidator::new(runner),
            db,
            config: Arc::new(config),
        })
    }

    fn chunk_content(message: &ServerMessage) -> &str {
        match message {
            ServerMessage::ResponseChunk { content, .. } => content,
            other => panic!("expected response_chunk, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn plain_text_turn_persists_both_sides() {
        let state = state_with(Arc::new(EchoRunner::new())).await;
        let conn = ConnectionId::new();

        let envelopes = process_chat_turn(&state, conn, "hello").await;

        assert_eq!(envelopes.len(), 2);
        assert_eq!(chunk_content(&envelopes[0]), "echo: hello");
        assert!(matches!(envelopes[1], ServerMessage::ResponseComplete { .. }));

        let binding = state.registry.resolve(conn, "default_user").await.unwrap();
        let history = state.db.list_messages(&binding.session_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[0].content, "hello");
        assert_eq!(history[1].role, MessageRole::Assistant);
        assert_eq!(history[1].content, "echo: hello");
    }

    #[tokio::test]
    async fn sequential_turns_stay_in_send_order_despite_slow_agent() {
        let runner = Arc::new(EchoRunner::with_slow_first_turn(Duration::from_millis(100)));
        let state = state_with(runner).await;
        let conn = ConnectionId::new();

        // The gateway loop awaits each turn before reading the next frame;
        // model that here with sequential awaits.
        process_chat_turn(&state, conn, "first").await;
        process_chat_turn(&state, conn, "second").await;

        let binding = state.registry.resolve(conn, "default_user").await.unwrap();
        let history = state.db.list_messages(&binding.session_id).await.unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            ["first", "echo: first", "second", "echo: second"]
        );
    }

    #[tokio::test]
    async fn concurrent_connections_keep_disjoint_histories() {
        let state = state_with(Arc::new(EchoRunner::new())).await;

        let mut handles = Vec::new();
        for label in ["left", "right"] {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                let conn = ConnectionId::new();
                for i in 0..3 {
                    process_chat_turn(&state, conn, &format!("{label}-{i}")).await;
                }
                state
                    .registry
                    .resolve(conn, "default_user")
                    .await
                    .unwrap()
                    .session_id
            }));
        }
        let left = handles.remove(0).await.unwrap();
        let right = handles.remove(0).await.unwrap();
        assert_ne!(left, right);

        let left_history = state.db.list_messages(&left).await.unwrap();
        let right_history = state.db.list_messages(&right).await.unwrap();
        assert_eq!(left_history.len(), 6);
        assert_eq!(right_history.len(), 6);
        assert!(left_history.iter().all(|m| m.content.contains("left")));
        assert!(right_history.iter().all(|m| m.content.contains("right")));
    }

    #[tokio::test]
    async fn degraded_reply_is_delivered_and_persisted_with_reason() {
        let state = state_with(Arc::new(FailingRunner)).await;
        let conn = ConnectionId::new();

        let envelopes = process_chat_turn(&state, conn, "hello").await;

        assert_eq!(envelopes.len(), 2);
        assert!(chunk_content(&envelopes[0]).contains("model unavailable"));
        assert!(matches!(envelopes[1], ServerMessage::ResponseComplete { .. }));

        let binding = state.registry.resolve(conn, "default_user").await.unwrap();
        let history = state.db.list_messages(&binding.session_id).await.unwrap();
        assert_eq!(history.len(), 2);
        let reply = &history[1];
        assert_eq!(reply.role, MessageRole::Assistant);
        assert_eq!(reply.metadata.get("degraded"), Some(&serde_json::Value::Bool(true)));
        assert_eq!(
            reply.metadata.get("reason"),
            Some(&serde_json::Value::String("model unavailable".into()))
        );
    }

    #[tokio::test]
    async fn storage_failure_surfaces_as_error_envelope() {
        let state = state_with(Arc::new(EchoRunner::new())).await;
        let conn = ConnectionId::new();

        // Bind, then pull the session out from under the connection so the
        // next append violates the foreign key.
        let binding = state.registry.resolve(conn, "default_user").await.unwrap();
        state.db.delete_session(&binding.session_id).await.unwrap();

        let envelopes = process_chat_turn(&state, conn, "hello").await;
        assert_eq!(envelopes.len(), 1);
        assert!(matches!(envelopes[0], ServerMessage::Error { .. }));
    }
}
