//! Session message envelope.
//!
//! Every frame exchanged with a client is one JSON envelope:
//!
//! ```json
//! {"type": "join_game", "game_id": null, "user_id": null, "data": "g1", "timestamp": 1700000000000}
//! ```
//!
//! Inbound types are `ping`, `pong`, `join_game`, `leave_game`, `game_action`
//! and `chat_message`. Outbound types are `pong`, `game_update`, `game_event`,
//! `notification` and `error`.

use jutland_core::GameEvent;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Envelope `type` tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Ping,
    Pong,
    JoinGame,
    LeaveGame,
    GameAction,
    ChatMessage,
    GameUpdate,
    GameEvent,
    Notification,
    Error,
    /// Any tag this protocol does not know.
    #[serde(other)]
    Unknown,
}

impl MessageType {
    /// Whether a client may send this type.
    pub fn is_inbound(self) -> bool {
        matches!(
            self,
            MessageType::Ping
                | MessageType::Pong
                | MessageType::JoinGame
                | MessageType::LeaveGame
                | MessageType::GameAction
                | MessageType::ChatMessage
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub data: Value,
    /// Unix milliseconds.
    #[serde(default)]
    pub timestamp: i64,
}

impl Envelope {
    pub fn new(kind: MessageType, data: Value) -> Self {
        Self {
            kind,
            game_id: None,
            user_id: None,
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_game(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn ping() -> Self {
        Self::new(MessageType::Ping, Value::Null)
    }

    pub fn pong() -> Self {
        Self::new(MessageType::Pong, Value::Null)
    }

    pub fn join_game(game_id: &str) -> Self {
        Self::new(MessageType::JoinGame, Value::String(game_id.to_string()))
    }

    pub fn leave_game() -> Self {
        Self::new(MessageType::LeaveGame, Value::Null)
    }

    pub fn game_action(data: Value) -> Self {
        Self::new(MessageType::GameAction, data)
    }

    pub fn chat_message(message: &str) -> Self {
        Self::new(MessageType::ChatMessage, json!({ "message": message }))
    }

    pub fn game_update(game_id: &str, data: Value) -> Self {
        Self::new(MessageType::GameUpdate, data).with_game(game_id)
    }

    /// A `game_event` whose data is `{event, ...fields}`.
    pub fn game_event(game_id: &str, event: &str, fields: Value) -> Self {
        let mut data = match fields {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        data.insert("event".to_string(), Value::String(event.to_string()));
        Self::new(MessageType::GameEvent, Value::Object(data)).with_game(game_id)
    }

    /// Wrap a committed core event for its game's room.
    pub fn from_game_event(event: &GameEvent) -> Result<Self, serde_json::Error> {
        let data = serde_json::to_value(event)?;
        Ok(Self::new(MessageType::GameEvent, data).with_game(event.game_id()))
    }

    pub fn notification(message: &str) -> Self {
        Self::new(MessageType::Notification, json!({ "message": message }))
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self::new(MessageType::Error, json!({ "code": code, "message": message }))
    }

    /// Name of the `event` inside a `game_event` payload.
    pub fn event_name(&self) -> Option<&str> {
        if self.kind != MessageType::GameEvent {
            return None;
        }
        self.data.get("event").and_then(Value::as_str)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jutland_core::TurnPhase;

    #[test]
    fn test_inbound_parse() {
        let env = Envelope::from_json(r#"{"type":"join_game","data":"g1"}"#).unwrap();
        assert_eq!(env.kind, MessageType::JoinGame);
        assert_eq!(env.data, Value::String("g1".to_string()));
        assert_eq!(env.game_id, None);
        assert_eq!(env.timestamp, 0);
    }

    #[test]
    fn test_unknown_type() {
        let env = Envelope::from_json(r#"{"type":"teleport","data":{}}"#).unwrap();
        assert_eq!(env.kind, MessageType::Unknown);
        assert!(!env.kind.is_inbound());
    }

    #[test]
    fn test_missing_type_is_malformed() {
        assert!(Envelope::from_json(r#"{"data":"g1"}"#).is_err());
        assert!(Envelope::from_json("not json").is_err());
    }

    #[test]
    fn test_game_event_data_carries_event_name() {
        let env = Envelope::game_event("g1", "chat_message", json!({ "message": "Hood sunk" }));
        assert_eq!(env.event_name(), Some("chat_message"));
        assert_eq!(env.data["message"], "Hood sunk");
        assert_eq!(env.game_id.as_deref(), Some("g1"));
    }

    #[test]
    fn test_core_event_wrapping() {
        let event = GameEvent::PhaseAdvanced {
            game_id: "g1".to_string(),
            turn: 3,
            phase: TurnPhase::Search,
        };
        let env = Envelope::from_game_event(&event).unwrap();
        assert_eq!(env.kind, MessageType::GameEvent);
        assert_eq!(env.event_name(), Some("phase_advanced"));
        assert_eq!(env.data["turn"], 3);

        let json = env.to_json().unwrap();
        assert!(json.contains(r#""type":"game_event""#));
        assert!(!json.contains("user_id"));
    }
}
