//! Per-unit fuel tracking and the emergency-fuel policy.

use crate::types::{GameId, Turn, UnitId};
use serde::{Deserialize, Serialize};

/// Movement history and emergency-fuel state of one unit.
///
/// The counters describe `turn`. When the game moves on, [`FuelTracking::roll_to`]
/// shifts this turn's movement into `hexes_moved_previous_turn`, which drives
/// the speed-class rest rule and the variable fuel cost.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelTracking {
    pub unit_id: UnitId,
    pub game_id: GameId,
    pub turn: Turn,
    pub hexes_moved_previous_turn: u32,
    pub hexes_moved_this_turn: u32,
    /// Set once the unit has executed its move for `turn`.
    pub moved_this_turn: bool,
    pub emergency_fuel: bool,
    /// Last turn on which emergency fuel still applies.
    pub emergency_expires_turn: Option<Turn>,
}

impl FuelTracking {
    pub fn new(unit_id: UnitId, game_id: GameId, turn: Turn) -> Self {
        Self {
            unit_id,
            game_id,
            turn,
            hexes_moved_previous_turn: 0,
            hexes_moved_this_turn: 0,
            moved_this_turn: false,
            emergency_fuel: false,
            emergency_expires_turn: None,
        }
    }

    /// Bring the counters forward to `turn`.
    ///
    /// A unit that skipped one or more whole turns counts as having moved 0
    /// hexes in the previous turn. Expired emergency fuel is cleared.
    pub fn roll_to(&mut self, turn: Turn) {
        if turn <= self.turn {
            return;
        }
        self.hexes_moved_previous_turn = if turn == self.turn + 1 {
            self.hexes_moved_this_turn
        } else {
            0
        };
        self.hexes_moved_this_turn = 0;
        self.moved_this_turn = false;
        self.turn = turn;

        if let Some(expires) = self.emergency_expires_turn {
            if turn > expires {
                self.clear_emergency();
            }
        }
    }

    pub fn record_move(&mut self, hexes: u32) {
        self.hexes_moved_this_turn = hexes;
        self.moved_this_turn = true;
    }

    pub fn enter_emergency(&mut self, expires_turn: Turn) {
        self.emergency_fuel = true;
        self.emergency_expires_turn = Some(expires_turn);
    }

    pub fn clear_emergency(&mut self) {
        self.emergency_fuel = false;
        self.emergency_expires_turn = None;
    }
}

/// When a unit goes onto emergency fuel and for how long.
///
/// A unit that starts a turn with an empty bunker switches to emergency fuel
/// for `duration_turns` turns (that turn included). On emergency fuel it may
/// only steam one hex per turn, free of charge. Refueling ends it early.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyFuelPolicy {
    pub duration_turns: u32,
}

impl Default for EmergencyFuelPolicy {
    fn default() -> Self {
        Self { duration_turns: 2 }
    }
}

impl EmergencyFuelPolicy {
    /// Evaluate the policy at the start of `turn` for a unit holding `fuel`.
    ///
    /// Returns `true` when the tracking record changed.
    pub fn begin_turn(&self, tracking: &mut FuelTracking, fuel: u32, turn: Turn) -> bool {
        let before = tracking.clone();
        tracking.roll_to(turn);

        if fuel > 0 {
            tracking.clear_emergency();
        } else if !tracking.emergency_fuel && self.duration_turns > 0 {
            tracking.enter_emergency(turn + self.duration_turns - 1);
        }

        *tracking != before
    }
}
