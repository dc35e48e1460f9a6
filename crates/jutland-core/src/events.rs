//! Game events published by the core services.
//!
//! Services hand every committed state change to an [`EventSink`]. The
//! realtime layer implements the sink and fans events out to the game's room.

use crate::hex::Hex;
use crate::movement::MovementKind;
use crate::types::{Faction, GameId, MovementId, TaskForceId, Turn, TurnPhase, UnitId};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Something that happened to a game, after it was committed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    UnitMoved {
        game_id: GameId,
        unit_id: UnitId,
        owner: Faction,
        movement_id: MovementId,
        from: Hex,
        to: Hex,
        path: Vec<Hex>,
        fuel_cost: u32,
        kind: MovementKind,
        turn: Turn,
    },
    TaskForceCreated {
        game_id: GameId,
        task_force_id: TaskForceId,
        owner: Faction,
        name: String,
        unit_ids: Vec<UnitId>,
    },
    TaskForceMoved {
        game_id: GameId,
        task_force_id: TaskForceId,
        owner: Faction,
        from: Hex,
        to: Hex,
        unit_ids: Vec<UnitId>,
        turn: Turn,
    },
    TaskForceDissolved {
        game_id: GameId,
        task_force_id: TaskForceId,
    },
    PhaseAdvanced {
        game_id: GameId,
        turn: Turn,
        phase: TurnPhase,
    },
}

impl GameEvent {
    /// Game whose room should receive the event.
    pub fn game_id(&self) -> &str {
        match self {
            GameEvent::UnitMoved { game_id, .. }
            | GameEvent::TaskForceCreated { game_id, .. }
            | GameEvent::TaskForceMoved { game_id, .. }
            | GameEvent::TaskForceDissolved { game_id, .. }
            | GameEvent::PhaseAdvanced { game_id, .. } => game_id,
        }
    }

    /// The `event` tag this variant serializes with.
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::UnitMoved { .. } => "unit_moved",
            GameEvent::TaskForceCreated { .. } => "task_force_created",
            GameEvent::TaskForceMoved { .. } => "task_force_moved",
            GameEvent::TaskForceDissolved { .. } => "task_force_dissolved",
            GameEvent::PhaseAdvanced { .. } => "phase_advanced",
        }
    }
}

/// Receiver of committed game events.
///
/// Publishing must not block: implementations enqueue and return.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: GameEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn publish(&self, event: GameEvent) {
        (**self).publish(event)
    }
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: GameEvent) {}
}

/// Keeps every event in memory, in publication order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<GameEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GameEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: GameEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
