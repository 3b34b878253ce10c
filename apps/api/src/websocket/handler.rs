//! WebSocket upgrade handler
//!
//! Every connection is assigned a fresh session id, announced to the client
//! in a `connect` frame. Authentication happens later, over the socket, with
//! a handshake token obtained from `POST /playco/socketio/auth`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};

use super::connection::Outbound;
use super::correlation::PendingRequests;
use super::events::RealtimeState;
use super::messages::{ClientEvent, ClientFrame, ServerMessage};
use crate::models::SessionId;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(realtime): Extension<RealtimeState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, realtime))
}

/// Parse an inbound text frame
fn parse_frame(text: &str) -> Result<Option<ClientEvent>, serde_json::Error> {
    Ok(serde_json::from_str::<ClientFrame>(text)?.into_event())
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, realtime: RealtimeState) {
    let session_id = SessionId::generate();
    let connections = realtime.connections.clone();

    let mut rx = connections.register(session_id.clone());
    let Some(sender) = connections.sender(&session_id) else {
        return;
    };
    let pending = PendingRequests::new(sender);

    // Queued ahead of anything a handler can produce
    let _ = connections.send(
        &session_id,
        ServerMessage::Connect {
            sid: session_id.clone(),
        },
    );

    tracing::info!(session_id = %session_id, "Realtime connection opened");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Forward queued frames to the socket
    let sid_send = session_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                Outbound::Message(msg) => match serde_json::to_string(&msg) {
                    Ok(json) => {
                        if ws_sender.send(Message::Text(json)).await.is_err() {
                            tracing::debug!(session_id = %sid_send, "WebSocket send failed");
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize message");
                    }
                },
                Outbound::Close => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Handle incoming frames one at a time
    let sid_recv = session_id.clone();
    let recv_state = realtime.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    recv_state.connections.touch(&sid_recv);
                    match parse_frame(&text) {
                        Ok(Some(event)) => {
                            recv_state.handle_event(&sid_recv, event, &pending).await;
                        }
                        Ok(None) => {
                            tracing::debug!(session_id = %sid_recv, "Ignoring unknown event");
                        }
                        Err(e) => {
                            tracing::debug!(
                                error = %e,
                                session_id = %sid_recv,
                                "Failed to parse client frame"
                            );
                        }
                    }
                }
                Ok(Message::Binary(_)) => {
                    tracing::debug!(session_id = %sid_recv, "Received unsupported binary message");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Pings are answered by axum
                    recv_state.connections.touch(&sid_recv);
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(session_id = %sid_recv, "WebSocket close received");
                    break;
                }
                Err(e) => {
                    tracing::debug!(error = %e, session_id = %sid_recv, "WebSocket error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete, then abort the other
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(session_id = %session_id, "Send task completed");
            recv_task.abort();
            // An in-flight event must not register state after cleanup
            let _ = recv_task.await;
        }
        _ = &mut recv_task => {
            tracing::debug!(session_id = %session_id, "Receive task completed");
            send_task.abort();
            let _ = send_task.await;
        }
    }

    connections.remove(&session_id);
    realtime.handle_disconnect(&session_id).await;

    tracing::info!(session_id = %session_id, "Realtime connection closed");
}
