//! Glue between the hub and game logic.
//!
//! Inbound `game_action` payloads go to an [`ActionHandler`]; committed core
//! events come back through [`HubEventSink`] as `game_event` broadcasts.

use crate::error::ActionError;
use crate::hub::{HubHandle, SessionId};
use crate::protocol::Envelope;
use jutland_core::{EventSink, GameEvent};
use serde_json::Value;
use tracing::warn;

/// Who sent a `game_action`, and from which room.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionContext {
    pub session_id: SessionId,
    pub user_id: Option<String>,
    /// The envelope's `game_id`, or the room the session has joined.
    pub game_id: Option<String>,
}

/// Interprets `game_action` payloads. The hub treats them as opaque.
///
/// The returned value is sent back to the acting session as a `game_update`.
pub trait ActionHandler: Send + Sync {
    fn handle(&self, ctx: &ActionContext, payload: Value) -> Result<Value, ActionError>;
}

/// Handler for a hub with no game logic attached.
pub struct RejectActions;

impl ActionHandler for RejectActions {
    fn handle(&self, _ctx: &ActionContext, _payload: Value) -> Result<Value, ActionError> {
        Err(ActionError::new(
            "unsupported",
            "game actions are not accepted here",
        ))
    }
}

/// Core event sink that forwards every event to its game's room.
#[derive(Clone)]
pub struct HubEventSink {
    hub: HubHandle,
}

impl HubEventSink {
    pub fn new(hub: HubHandle) -> Self {
        Self { hub }
    }
}

impl EventSink for HubEventSink {
    fn publish(&self, event: GameEvent) {
        let envelope = match Envelope::from_game_event(&event) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(event = event.name(), error = %err, "failed to encode game event");
                return;
            }
        };
        if let Err(err) = self.hub.try_broadcast_room(event.game_id(), envelope) {
            warn!(
                game_id = event.game_id(),
                event = event.name(),
                error = %err,
                "game event not delivered"
            );
        }
    }
}
