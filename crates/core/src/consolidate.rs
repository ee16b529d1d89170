//! Turn consolidation.
//!
//! Reduces the event stream of one agent turn to a single reply. The
//! consolidator is the only component that observes runner failures, and it
//! converts every failure mode into a deliverable `ConsolidatedReply` so the
//! gateway always has a value to persist and send.

use crate::runner::{AgentRunner, TurnEvent};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reply text used when a turn's stream ends without any usable text.
pub const NO_RESPONSE_FALLBACK: &str =
    "The agent received the message but produced no response.";

/// The consolidated outcome of one turn. Never an error: a failed turn
/// becomes a `Degraded` reply that is still persisted and delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsolidatedReply {
    Ok(String),
    Degraded { text: String, reason: String },
}

impl ConsolidatedReply {
    pub fn text(&self) -> &str {
        match self {
            ConsolidatedReply::Ok(text) => text,
            ConsolidatedReply::Degraded { text, .. } => text,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ConsolidatedReply::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ConsolidatedReply::Ok(_) => None,
            ConsolidatedReply::Degraded { reason, .. } => Some(reason),
        }
    }

    fn degraded(reason: String) -> Self {
        let text = format!(
            "I ran into a problem while handling that request: {reason}. Please try again."
        );
        ConsolidatedReply::Degraded { text, reason }
    }
}

/// Drives one turn through an [`AgentRunner`] and reduces its events to a
/// single reply. Stateless per call; turns for different sessions share
/// nothing through the consolidator.
#[derive(Clone)]
pub struct EventConsolidator {
    runner: Arc<dyn AgentRunner>,
}

impl EventConsolidator {
    pub fn new(runner: Arc<dyn AgentRunner>) -> Self {
        Self { runner }
    }

    /// Runs one turn to completion and selects the reply text.
    ///
    /// Precedence: the text of the event marked final, if non-empty; else
    /// the last non-empty text observed in stream order; else a fixed
    /// no-response fallback.
    pub async fn run_turn(
        &self,
        session_id: &str,
        user_id: &str,
        user_text: &str,
    ) -> ConsolidatedReply {
        let mut stream = match self.runner.run(session_id, user_id, user_text).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(%session_id, error = %e, "agent runner failed to start turn");
                return ConsolidatedReply::degraded(e.to_string());
            }
        };

        let mut final_text: Option<String> = None;
        let mut last_text: Option<String> = None;
        let mut event_count = 0usize;

        while let Some(event) = stream.next().await {
            event_count += 1;
            match event {
                Ok(TurnEvent::Partial(text)) => {
                    if !text.trim().is_empty() {
                        last_text = Some(text);
                    }
                }
                Ok(TurnEvent::Final(text)) => {
                    // An empty final event carries no reply; fall back to
                    // the last observed text instead.
                    if !text.trim().is_empty() {
                        final_text = Some(text);
                    }
                }
                Ok(TurnEvent::Error(reason)) => {
                    warn!(%session_id, %reason, "agent reported failure mid-turn");
                    return ConsolidatedReply::degraded(reason);
                }
                Err(e) => {
                    warn!(%session_id, error = %e, "agent stream failed mid-turn");
                    return ConsolidatedReply::degraded(e.to_string());
                }
            }
        }

        debug!(%session_id, event_count, "turn stream drained");

        let text = final_text
            .or(last_text)
            .unwrap_or_else(|| NO_RESPONSE_FALLBACK.to_string());
        ConsolidatedReply::Ok(text)
    }
}
