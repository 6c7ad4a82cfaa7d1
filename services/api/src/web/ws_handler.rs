//! services/api/src/web/ws_handler.rs
//!
//! This is the entry point and control loop for a relay WebSocket connection.
//! Client events are handed to the relay hub; everything the hub broadcasts is
//! forwarded to the socket by a companion task.

use crate::{
    error::ApiError,
    web::{protocol::ServerEvent, state::AppState},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let client_id = Uuid::new_v4();
    info!(%client_id, "New WebSocket connection established.");

    // The sender is shared between this loop (acks) and the forwarding task (broadcasts).
    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));

    // Subscribe before acknowledging so no broadcast slips past a new client.
    let events = app_state.relay.subscribe();
    info!(%client_id, clients = app_state.relay.client_count(), "Subscribed to the relay.");
    if let Err(e) = send_event(&ws_sender, &ServerEvent::Connected { client_id }).await {
        error!(%client_id, "Failed to send connected message: {}", e);
        return;
    }

    let token = CancellationToken::new();
    let forward_task = tokio::spawn(forward_broadcasts(
        events,
        ws_sender.clone(),
        token.clone(),
        client_id,
    ));

    // --- Main Message Loop ---
    while let Some(received) = receiver.next().await {
        match received {
            Ok(Message::Text(text)) => {
                let ack = app_state.relay.handle_text(text.as_str());
                if let Err(e) = send_event(&ws_sender, &ServerEvent::Ack(ack)).await {
                    warn!(%client_id, "Failed to send ack: {}", e);
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                info!(%client_id, "Client sent close message.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%client_id, "WebSocket receive error: {}", e);
                break;
            }
        }
    }

    // --- Cleanup ---
    token.cancel();
    if let Err(e) = forward_task.await {
        error!(%client_id, "Forwarding task ended abnormally: {:?}", e);
    }
    info!(%client_id, "WebSocket connection closed.");
}

/// Pushes hub events to one socket until the connection closes.
async fn forward_broadcasts(
    mut events: broadcast::Receiver<ServerEvent>,
    ws_sender: WsSender,
    token: CancellationToken,
    client_id: Uuid,
) {
    loop {
        let received = tokio::select! {
            _ = token.cancelled() => break,
            received = events.recv() => received,
        };
        match received {
            Ok(event) => {
                if let Err(e) = send_event(&ws_sender, &event).await {
                    warn!(%client_id, "Failed to forward event: {}", e);
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(%client_id, skipped, "Client lagged behind the relay, events skipped.");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn send_event(ws_sender: &WsSender, event: &ServerEvent) -> Result<(), ApiError> {
    let json = serde_json::to_string(event).map_err(|e| ApiError::Internal(e.to_string()))?;
    ws_sender
        .lock()
        .await
        .send(Message::Text(json.into()))
        .await?;
    Ok(())
}
