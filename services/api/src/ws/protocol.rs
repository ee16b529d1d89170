//! Defines the WebSocket message protocol between the avatar UI and the
//! gateway.
//!
//! Outbound envelopes are a plain serde enum. Inbound frames are looser:
//! the UI has shipped several shapes over time, so classification is a
//! priority cascade rather than a single tagged enum, and an unshaped frame
//! degrades to a raw-text chat turn instead of an error.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Envelopes sent from the gateway to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greets a freshly accepted connection.
    Welcome {
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Liveness reply to a client `ping`.
    Pong { timestamp: DateTime<Utc> },
    /// A piece of the consolidated reply. Currently one per turn.
    ResponseChunk {
        content: String,
        timestamp: DateTime<Utc>,
    },
    /// Marks the end of a turn's reply.
    ResponseComplete { timestamp: DateTime<Utc> },
    /// Reports a per-turn failure; the connection stays usable.
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    pub fn welcome(message: impl Into<String>) -> Self {
        ServerMessage::Welcome {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn pong() -> Self {
        ServerMessage::Pong {
            timestamp: Utc::now(),
        }
    }

    pub fn response_chunk(content: impl Into<String>) -> Self {
        ServerMessage::ResponseChunk {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn response_complete() -> Self {
        ServerMessage::ResponseComplete {
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// What an inbound text frame amounts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A chat turn with the extracted user text.
    Chat(String),
    /// A liveness check; answered with `pong`, nothing persisted.
    Ping,
    /// Nothing actionable; dropped without a reply.
    Ignore,
}

/// Classifies one inbound text frame.
///
/// Priority: `{"type":"message","content":…}` > `{"message":…}` (non-empty)
/// > `{"type":"ping"}` > raw non-JSON text > first string-valued field of
/// any other JSON object. A structured frame with no string field, or an
/// empty payload, is silently ignored. A JSON scalar or array is treated
/// like raw text: the payload itself becomes the turn text.
pub fn classify_frame(text: &str) -> Inbound {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            return if text.trim().is_empty() {
                Inbound::Ignore
            } else {
                Inbound::Chat(text.to_string())
            };
        }
    };

    let map = match value {
        serde_json::Value::Object(map) => map,
        // Scalars and arrays parse as JSON but carry no recognizable shape;
        // fall back to the raw payload just like non-JSON text.
        _ => {
            return if text.trim().is_empty() {
                Inbound::Ignore
            } else {
                Inbound::Chat(text.to_string())
            };
        }
    };

    if map.get("type").and_then(|v| v.as_str()) == Some("message") {
        let content = map
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        return Inbound::Chat(content.to_string());
    }

    if let Some(message) = map.get("message").and_then(|v| v.as_str()) {
        if !message.trim().is_empty() {
            return Inbound::Chat(message.to_string());
        }
    }

    if map.get("type").and_then(|v| v.as_str()) == Some("ping") {
        return Inbound::Ping;
    }

    // Unknown shape: take the first string-valued field in document order
    // as the chat text (serde_json preserves field order here).
    for (_key, value) in &map {
        if let Some(text) = value.as_str() {
            if !text.trim().is_empty() {
                return Inbound::Chat(text.to_string());
            }
        }
    }

    Inbound::Ignore
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_message_frame_is_chat() {
        assert_eq!(
            classify_frame(r#"{"type":"message","content":"hello"}"#),
            Inbound::Chat("hello".into())
        );
    }

    #[test]
    fn typed_message_without_content_is_empty_chat() {
        assert_eq!(
            classify_frame(r#"{"type":"message"}"#),
            Inbound::Chat(String::new())
        );
    }

    #[test]
    fn aliased_message_field_is_chat() {
        assert_eq!(
            classify_frame(r#"{"message":"hi there"}"#),
            Inbound::Chat("hi there".into())
        );
    }

    #[test]
    fn empty_aliased_message_falls_through_to_ignore() {
        assert_eq!(classify_frame(r#"{"message":"  "}"#), Inbound::Ignore);
    }

    #[test]
    fn ping_frame_is_ping() {
        assert_eq!(classify_frame(r#"{"type":"ping"}"#), Inbound::Ping);
    }

    #[test]
    fn typed_message_outranks_ping_field_order() {
        // "type":"message" is checked before anything else.
        assert_eq!(
            classify_frame(r#"{"content":"x","type":"message"}"#),
            Inbound::Chat("x".into())
        );
    }

    #[test]
    fn raw_text_is_chat_verbatim() {
        assert_eq!(classify_frame("hello"), Inbound::Chat("hello".into()));
    }

    #[test]
    fn empty_payload_is_ignored() {
        assert_eq!(classify_frame(""), Inbound::Ignore);
        assert_eq!(classify_frame("   "), Inbound::Ignore);
    }

    #[test]
    fn unknown_object_uses_first_string_field() {
        assert_eq!(
            classify_frame(r#"{"count":3,"text":"use me","other":"not me"}"#),
            Inbound::Chat("use me".into())
        );
    }

    #[test]
    fn object_without_string_fields_is_ignored() {
        assert_eq!(classify_frame(r#"{"count":3,"flag":true}"#), Inbound::Ignore);
        assert_eq!(classify_frame(r#"{}"#), Inbound::Ignore);
    }

    #[test]
    fn json_scalar_is_treated_as_raw_text() {
        assert_eq!(classify_frame(r#""hello""#), Inbound::Chat(r#""hello""#.into()));
        assert_eq!(classify_frame("42"), Inbound::Chat("42".into()));
    }

    #[test]
    fn server_messages_carry_type_tags() {
        let json = serde_json::to_value(ServerMessage::pong()).unwrap();
        assert_eq!(json["type"], "pong");
        assert!(json["timestamp"].is_string());

        let json = serde_json::to_value(ServerMessage::response_chunk("hi")).unwrap();
        assert_eq!(json["type"], "response_chunk");
        assert_eq!(json["content"], "hi");

        let json = serde_json::to_value(ServerMessage::response_complete()).unwrap();
        assert_eq!(json["type"], "response_complete");

        let json = serde_json::to_value(ServerMessage::error("boom")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");

        let json = serde_json::to_value(ServerMessage::welcome("hello")).unwrap();
        assert_eq!(json["type"], "welcome");
    }
}
