//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket event protocol of the control relay. Every frame is a
//! JSON text frame of the form `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Events Sent FROM a Client TO the Server
//=========================================================================================

#[derive(Deserialize, Debug)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Asks every connected client to start or stop recording.
    /// `action` is kept as raw JSON so a missing, null or unknown action can
    /// be answered with an error ack.
    TriggerRecording {
        #[serde(default)]
        action: Value,
    },

    /// A heartbeat that is echoed to every connected client.
    PingEvent(PingPayload),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::TriggerRecording { .. } => "trigger_recording",
            ClientEvent::PingEvent(_) => "ping_event",
        }
    }
}

/// The three ping fields, relayed verbatim.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PingPayload {
    #[serde(default)]
    pub device_id: Value,
    #[serde(default)]
    pub message: Value,
    #[serde(default)]
    pub timestamp: Value,
}

/// Recording actions a client may trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingAction {
    Start,
    Stop,
}

impl FromStr for RecordingAction {
    type Err = ();

    fn from_str(action: &str) -> Result<Self, Self::Err> {
        match action {
            "start" => Ok(RecordingAction::Start),
            "stop" => Ok(RecordingAction::Stop),
            _ => Err(()),
        }
    }
}

impl RecordingAction {
    /// Only the strings `start` and `stop` are actions.
    pub fn from_value(action: &Value) -> Option<Self> {
        action.as_str().and_then(|name| name.parse().ok())
    }

    pub fn command(self) -> AudioCommand {
        match self {
            RecordingAction::Start => AudioCommand::StartRecording,
            RecordingAction::Stop => AudioCommand::StopRecording,
        }
    }
}

//=========================================================================================
// Events Sent FROM the Server TO Clients
//=========================================================================================

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AudioCommand {
    StartRecording,
    StopRecording,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Ok,
    Error,
}

/// Acknowledgment of a single client event, sent to that client only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Ack {
    /// Name of the acknowledged event, when it could be determined.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub event: Option<String>,
    pub status: AckStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

impl Ack {
    pub fn ok(event: &str) -> Self {
        Self {
            event: Some(event.to_string()),
            status: AckStatus::Ok,
            message: None,
        }
    }

    pub fn error(event: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            event: event.map(str::to_string),
            status: AckStatus::Error,
            message: Some(message.into()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Sent to a client right after its connection is accepted.
    Connected { client_id: Uuid },

    /// Broadcast to every client.
    AudioCommand { command: AudioCommand },

    /// Broadcast to every client, including the one that pinged.
    PingReceived(PingPayload),

    Ack(Ack),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_client_events() {
        let trigger: ClientEvent =
            serde_json::from_value(json!({"event": "trigger_recording", "data": {"action": "start"}}))
                .unwrap();
        assert!(matches!(trigger, ClientEvent::TriggerRecording { ref action } if action == &json!("start")));

        let empty: ClientEvent =
            serde_json::from_value(json!({"event": "trigger_recording", "data": {}})).unwrap();
        assert!(matches!(empty, ClientEvent::TriggerRecording { action: Value::Null }));

        let ping: ClientEvent = serde_json::from_value(json!({
            "event": "ping_event",
            "data": {"device_id": "virtual_physiotherapist", "message": "Test ping", "timestamp": "2024-01-01T00:00:00Z"}
        }))
        .unwrap();
        let ClientEvent::PingEvent(payload) = ping else {
            panic!("expected a ping");
        };
        assert_eq!(payload.device_id, json!("virtual_physiotherapist"));
        assert_eq!(payload.timestamp, json!("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn encodes_server_events() {
        let command = ServerEvent::AudioCommand {
            command: AudioCommand::StopRecording,
        };
        assert_eq!(
            serde_json::to_value(&command).unwrap(),
            json!({"event": "audio_command", "data": {"command": "stop_recording"}})
        );

        let ack = ServerEvent::Ack(Ack::error(Some("trigger_recording"), "Invalid action"));
        assert_eq!(
            serde_json::to_value(&ack).unwrap(),
            json!({"event": "ack", "data": {"event": "trigger_recording", "status": "error", "message": "Invalid action"}})
        );
    }

    #[test]
    fn only_start_and_stop_are_actions() {
        assert_eq!("start".parse::<RecordingAction>(), Ok(RecordingAction::Start));
        assert_eq!("stop".parse::<RecordingAction>(), Ok(RecordingAction::Stop));
        assert!("pause".parse::<RecordingAction>().is_err());
        assert!("Start".parse::<RecordingAction>().is_err());
        assert_eq!(RecordingAction::from_value(&json!("stop")), Some(RecordingAction::Stop));
        assert_eq!(RecordingAction::from_value(&json!(5)), None);
        assert_eq!(RecordingAction::from_value(&Value::Null), None);
    }
}
