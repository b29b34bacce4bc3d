//! WebSocket connection state machine.
//!
//! Runs the read/write loop for a single connection: inbound frames are
//! routed and answered in arrival order on the same connection, while
//! broadcast traffic queued by the registry is interleaved through the
//! outbound channel. The registry entry lives exactly as long as this
//! task: it is added before the first frame and removed on every exit
//! path, clean or not.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::router::route_frame;
use crate::app_state::AppState;
use crate::domain::ConnectionId;
use crate::domain::registry::ConnectionHandle;

/// Runs the read/write loop for one admitted connection.
pub async fn run_connection(
    socket: WebSocket,
    remote: SocketAddr,
    authenticated: bool,
    state: AppState,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut outbound) = mpsc::unbounded_channel::<Message>();

    let id = ConnectionId::new();
    state
        .registry
        .add(ConnectionHandle::new(id, remote, authenticated, tx));

    loop {
        tokio::select! {
            // Broadcast events and shutdown close frames queued by the registry.
            queued = outbound.recv() => {
                match queued {
                    Some(Message::Close(frame)) => {
                        let _ = ws_tx.send(Message::Close(frame)).await;
                        break;
                    }
                    Some(message) => {
                        if ws_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            // Incoming frame from the client.
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let response = route_frame(text.as_str(), &state, id);
                        let payload = serde_json::to_string(&response).unwrap_or_else(|_| {
                            r#"{"type":"error","message":"internal error"}"#.to_string()
                        });
                        if ws_tx.send(Message::text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::info!(connection = %id, error = %e, "connection closed abnormally");
                        break;
                    }
                    // Pings are answered by axum; binary frames are not
                    // part of the protocol and are ignored.
                    _ => {}
                }
            }
        }
    }

    state.registry.remove(id);
}
