use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, State},
    response::Response,
    routing::get,
    Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, warn};

use crate::api::AppState;
use crate::sync::SyncEvent;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(websocket_handler))
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

fn encode(event: &SyncEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|e| json!({"type": "error", "message": e.to_string()}).to_string())
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so nothing falls in between
    let mut event_rx = state.manager.subscribe_events();

    let msg = json!({
        "type": "status",
        "payload": state.manager.status(),
    });
    if let Err(e) = sender.send(Message::Text(msg.to_string())).await {
        error!("Failed to send initial status: {}", e);
        return;
    }

    let manager = state.manager.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let text = match event_rx.recv().await {
                Ok(event) => encode(&event),
                Err(RecvError::Lagged(skipped)) => {
                    // Too slow to keep up; resend the full status instead
                    warn!("WebSocket client lagged by {} events", skipped);
                    json!({"type": "status", "payload": manager.status()}).to_string()
                }
                Err(RecvError::Closed) => break,
            };

            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    debug!("Received WebSocket message: {}", text);
                }
                Message::Close(_) => {
                    debug!("WebSocket closed by client");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    debug!("WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_encode_as_tagged_json() {
        let text = encode(&SyncEvent::Failed {
            error_message: "No source folders found".to_string(),
        });
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "failed");
        assert_eq!(value["errorMessage"], "No source folders found");
    }
}
