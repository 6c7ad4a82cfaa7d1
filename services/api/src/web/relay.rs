//! services/api/src/web/relay.rs
//!
//! The broadcast hub behind the WebSocket control channel. It turns client
//! events into fan-out events for every connection and an acknowledgment for
//! the sender.

use crate::web::protocol::{Ack, ClientEvent, RecordingAction, ServerEvent};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Events buffered per subscriber before a slow client starts lagging.
pub const RELAY_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct EventRelay {
    tx: broadcast::Sender<ServerEvent>,
}

impl Default for EventRelay {
    fn default() -> Self {
        Self::new(RELAY_CAPACITY)
    }
}

impl EventRelay {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Registers a new connection. Events broadcast afterwards are delivered to it.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscriptions, one per open connection.
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Decodes and handles one text frame.
    pub fn handle_text(&self, text: &str) -> Ack {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle(event),
            Err(e) => {
                warn!("Failed to deserialize client event: {}", e);
                Ack::error(None, format!("Invalid event: {}", e))
            }
        }
    }

    pub fn handle(&self, event: ClientEvent) -> Ack {
        let name = event.name();
        match event {
            ClientEvent::TriggerRecording { action } => match RecordingAction::from_value(&action) {
                Some(action) => {
                    info!(?action, "Relaying recording command.");
                    self.broadcast(ServerEvent::AudioCommand {
                        command: action.command(),
                    });
                    Ack::ok(name)
                }
                None => {
                    warn!(%action, "Rejected unknown recording action.");
                    Ack::error(Some(name), "Invalid action")
                }
            },
            ClientEvent::PingEvent(payload) => {
                debug!(device_id = %payload.device_id, "Relaying ping.");
                self.broadcast(ServerEvent::PingReceived(payload));
                Ack::ok(name)
            }
        }
    }

    fn broadcast(&self, event: ServerEvent) {
        // Sending only fails when nobody is connected.
        match self.tx.send(event) {
            Ok(receivers) => debug!(receivers, "Broadcast event."),
            Err(_) => debug!("Broadcast event dropped, no connected clients."),
        }
    }
}
