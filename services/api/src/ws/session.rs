//! Manages the WebSocket connection lifecycle for the chat gateway.

use crate::registry::ConnectionId;
use crate::state::AppState;
use crate::ws::protocol::{Inbound, ServerMessage, classify_frame};
use crate::ws::turn::process_chat_turn;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const WELCOME_TEXT: &str = "Avatar agent ready. Send a message to start the conversation.";

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// Frames are processed strictly in order: the next inbound frame is not
/// read until the current turn has consolidated and persisted, so one
/// connection's messages are FIFO no matter how slow the agent is. Distinct
/// connections run as independent tasks and never wait on each other.
#[instrument(name = "ws_session", skip_all, fields(conn))]
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let conn = ConnectionId::new();
    tracing::Span::current().record("conn", conn.to_string());
    info!("New WebSocket connection");

    if send_msg(&mut socket, ServerMessage::welcome(WELCOME_TEXT))
        .await
        .is_err()
    {
        // No frame was processed, so no binding exists yet.
        warn!("Failed to send welcome message; dropping connection");
        return;
    }

    while let Some(frame) = socket.recv().await {
        match frame {
            Ok(Message::Text(text)) => match classify_frame(&text) {
                Inbound::Chat(user_text) => {
                    let envelopes = process_chat_turn(&state, conn, &user_text).await;
                    // The exchange is already persisted; a dead socket only
                    // loses delivery, never conversation state.
                    for envelope in envelopes {
                        if let Err(e) = send_msg(&mut socket, envelope).await {
                            warn!(error = %e, "Failed to deliver reply envelope");
                            break;
                        }
                    }
                }
                Inbound::Ping => {
                    if let Err(e) = send_msg(&mut socket, ServerMessage::pong()).await {
                        warn!(error = %e, "Failed to answer ping");
                    }
                }
                Inbound::Ignore => {
                    debug!("Ignoring frame with no usable content");
                }
            },
            Ok(Message::Close(_)) => {
                info!("Client sent close frame");
                break;
            }
            // Binary payloads and transport-level ping/pong are not part of
            // the chat protocol.
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Error receiving from client WebSocket");
                break;
            }
        }
    }

    state.registry.release(conn);
    info!("WebSocket connection closed and binding released");
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(socket: &mut WebSocket, msg: ServerMessage) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket.send(Message::Text(serialized.into())).await?;
    Ok(())
}
