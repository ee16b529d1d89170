//! The external agent runner abstraction.
//!
//! A runner executes one conversational turn against an LLM-driven agent and
//! yields its output as a finite, ordered stream of [`TurnEvent`]s. The
//! gateway never inspects provider-specific payloads; everything the agent
//! produces is narrowed to this closed variant at the boundary.

use anyhow::Result;
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// One event observed while an agent turn is executing.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Intermediate text produced mid-turn.
    Partial(String),
    /// The text the agent designated as its final response.
    Final(String),
    /// The agent reported a failure while the turn was in flight.
    Error(String),
}

/// The finite event sequence produced by one turn.
pub type TurnStream = Pin<Box<dyn Stream<Item = Result<TurnEvent>> + Send>>;

/// An external, asynchronously-streaming agent runner.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Starts one turn for the given session and returns its event stream.
    async fn run(&self, session_id: &str, user_id: &str, user_text: &str) -> Result<TurnStream>;
}

/// An [`AgentRunner`] backed by any OpenAI-compatible chat completions API.
///
/// Works against OpenAI directly or against Gemini through its
/// OpenAI-compatible endpoint; the distinction is entirely in the
/// `OpenAIConfig` base URL and key.
pub struct OpenAiChatRunner {
    client: Client<OpenAIConfig>,
    model: String,
    system_prompt: String,
}

impl OpenAiChatRunner {
    pub fn new(config: OpenAIConfig, model: String, system_prompt: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            system_prompt,
        }
    }
}

#[async_trait]
impl AgentRunner for OpenAiChatRunner {
    async fn run(&self, session_id: &str, user_id: &str, user_text: &str) -> Result<TurnStream> {
        debug!(%session_id, %user_id, "starting chat completion turn");

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.system_prompt.clone())
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_text.to_string())
                .build()?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .stream(true)
            .build()?;

        let mut inner = self.client.chat().create_stream(request).await?;
        let (tx, rx) = mpsc::channel(16);

        // Drive the provider stream in the background, narrowing it to the
        // closed TurnEvent variant. The accumulated text is re-emitted as the
        // designated final event once the provider stream ends.
        tokio::spawn(async move {
            let mut full_response = String::new();
            while let Some(item) = inner.next().await {
                match item {
                    Ok(response) => {
                        let chunk = response
                            .choices
                            .first()
                            .and_then(|choice| choice.delta.content.clone());
                        if let Some(content) = chunk {
                            if !content.is_empty() {
                                full_response.push_str(&content);
                                if tx.send(Ok(TurnEvent::Partial(content))).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Ok(TurnEvent::Error(e.to_string()))).await;
                        return;
                    }
                }
            }
            let _ = tx.send(Ok(TurnEvent::Final(full_response))).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
