//! WebSocket surface for the Push Bus (spec §4.H): clients open one socket
//! per analysis (`?analysisId=...`) and receive `ScoreUpdate`/`StatusUpdate`
//! events for it, plus any `ShameAdd` broadcasts.
//!
//! Mirrors the teacher backend's `websocket_handler`/`handle_socket` shape
//! (`main.rs`): a single `tokio::select!` loop relaying from a broadcast
//! subscription while also answering client pings.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::push::recv_filtered;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "analysisId")]
    pub analysis_id: Uuid,
}

pub async fn handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(q): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, q.analysis_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, analysis_id: Uuid) {
    let mut rx = state.push.subscribe();

    // Replay current state immediately so a client that connects after the
    // analysis has already progressed isn't left staring at nothing.
    if let Ok(Some(analysis)) = state.store.find_analysis(analysis_id).await {
        let msg = serde_json::to_string(&analysis).unwrap_or_else(|_| "{}".to_string());
        if socket.send(Message::Text(msg)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = recv_filtered(&mut rx, analysis_id) => {
                match event {
                    Some(event) => {
                        let msg = serde_json::to_string(&event).unwrap_or_else(|e| {
                            warn!("failed to serialize push event: {}", e);
                            "{}".to_string()
                        });
                        if socket.send(Message::Text(msg)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) if text == "ping" => {
                        if socket.send(Message::Text("pong".to_string())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}
