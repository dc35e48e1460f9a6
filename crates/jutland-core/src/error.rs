//! Error types for the game-state core.

use crate::hex::Hex;
use crate::types::{AirUnitId, GameId, TaskForceId, UnitId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a destination or path was refused by the map restrictions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionReason {
    /// Hex lies outside the playable map.
    OffMap,
    /// Hex is land.
    Land,
    /// German destroyer flotillas may not cross the boundary line.
    GermanDestroyerBoundary,
    /// Tankers may not enter convoy hexes.
    TankerConvoyHex,
    /// The unit is sunk or in repair and cannot steam.
    UnitNotOperational,
    /// No passable route reaches the hex within the unit's movement allowance.
    OutOfRange,
}

impl fmt::Display for RestrictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestrictionReason::OffMap => write!(f, "destination is off the map"),
            RestrictionReason::Land => write!(f, "destination is land"),
            RestrictionReason::GermanDestroyerBoundary => {
                write!(f, "german destroyers may not cross the boundary")
            }
            RestrictionReason::TankerConvoyHex => write!(f, "tankers may not enter convoy hexes"),
            RestrictionReason::UnitNotOperational => write!(f, "unit is not operational"),
            RestrictionReason::OutOfRange => write!(f, "destination is out of range"),
        }
    }
}

/// Errors returned by the core services.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("destination {0} is the unit's current position")]
    InvalidTarget(Hex),
    #[error("unit {0} may not move this turn")]
    MovementForbiddenThisTurn(UnitId),
    #[error("unit {unit_id} is on emergency fuel and may move only 1 hex (requested {requested})")]
    EmergencyFuelRangeExceeded { unit_id: UnitId, requested: u32 },
    #[error("movement restricted: {reason}")]
    MovementRestricted { reason: RestrictionReason },
    #[error("insufficient fuel: {required} required, {available} available")]
    InsufficientFuel { required: u32, available: u32 },
    #[error("unit {unit_id} already belongs to task force {task_force_id}")]
    UnitAlreadyGrouped { unit_id: UnitId, task_force_id: TaskForceId },
    #[error("unit {0} belongs to a different owner")]
    UnitOwnerMismatch(UnitId),
    #[error("unit {0} is not at the task force position")]
    PositionMismatch(UnitId),
    #[error("task force move rejected for {} member(s)", rejected.len())]
    PartialMoveRejected { rejected: Vec<(UnitId, String)> },
    #[error("move needs {requested} hexes but the requested speed is {available}")]
    SpeedExceeded { requested: u32, available: u32 },
    #[error("a task force needs at least one unit")]
    EmptyTaskForce,
    #[error("task force {0} not found")]
    TaskForceNotFound(TaskForceId),
    #[error("unit {0} not found")]
    UnitNotFound(UnitId),
    #[error("air unit {0} not found")]
    AirUnitNotFound(AirUnitId),
    #[error("air unit {unit_id} cannot {action} while {status}")]
    InvalidAirUnitTransition {
        unit_id: AirUnitId,
        action: &'static str,
        status: String,
    },
    #[error("game {0} not found")]
    GameNotFound(GameId),
    #[error("ship {0} is not in the catalog")]
    UnknownShip(String),
    #[error("player {0} is not seated in this game")]
    PlayerNotInGame(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl CoreError {
    /// Stable machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::InvalidTarget(_) => "invalid_target",
            CoreError::MovementForbiddenThisTurn(_) => "movement_forbidden_this_turn",
            CoreError::EmergencyFuelRangeExceeded { .. } => "emergency_fuel_range_exceeded",
            CoreError::MovementRestricted { .. } => "movement_restricted",
            CoreError::InsufficientFuel { .. } => "insufficient_fuel",
            CoreError::UnitAlreadyGrouped { .. } => "unit_already_grouped",
            CoreError::UnitOwnerMismatch(_) => "unit_owner_mismatch",
            CoreError::PositionMismatch(_) => "position_mismatch",
            CoreError::PartialMoveRejected { .. } => "partial_move_rejected",
            CoreError::SpeedExceeded { .. } => "speed_exceeded",
            CoreError::EmptyTaskForce => "empty_task_force",
            CoreError::TaskForceNotFound(_) => "task_force_not_found",
            CoreError::UnitNotFound(_) => "unit_not_found",
            CoreError::AirUnitNotFound(_) => "air_unit_not_found",
            CoreError::InvalidAirUnitTransition { .. } => "invalid_air_unit_transition",
            CoreError::GameNotFound(_) => "game_not_found",
            CoreError::UnknownShip(_) => "unknown_ship",
            CoreError::PlayerNotInGame(_) => "player_not_in_game",
            CoreError::Unavailable(_) => "unavailable",
        }
    }
}

/// Failures raised by a persistence backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("lock error: {0}")]
    Lock(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        CoreError::Unavailable(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
