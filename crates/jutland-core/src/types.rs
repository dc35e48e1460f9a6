//! Core identifiers and small enums shared across the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a game.
pub type GameId = String;

/// Authenticated user id of a player (issued by the external auth layer).
pub type PlayerId = String;

/// Unique identifier for a naval unit.
pub type UnitId = u64;

/// Unique identifier for an air unit.
pub type AirUnitId = u64;

/// Unique identifier for a task force.
pub type TaskForceId = u64;

/// Unique identifier for a movement record.
pub type MovementId = u64;

/// Unique identifier for a search record.
pub type SearchId = u64;

/// Turn counter, starting at 1.
pub type Turn = u32;

/// The two sides of the campaign.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Faction {
    German,
    British,
}

impl Faction {
    /// The opposing side.
    pub const fn opponent(&self) -> Faction {
        match self {
            Faction::German => Faction::British,
            Faction::British => Faction::German,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Faction::German => "german",
            Faction::British => "british",
        }
    }
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Faction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "german" => Ok(Faction::German),
            "british" => Ok(Faction::British),
            other => Err(format!("unknown faction `{}`", other)),
        }
    }
}

/// Phase within a game turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    #[default]
    Movement,
    Search,
    Shadowing,
    Combat,
    AirOperations,
    EndOfTurn,
}

impl TurnPhase {
    /// Next phase in the turn sequence; `None` after the last one.
    pub const fn next(&self) -> Option<TurnPhase> {
        match self {
            TurnPhase::Movement => Some(TurnPhase::Search),
            TurnPhase::Search => Some(TurnPhase::Shadowing),
            TurnPhase::Shadowing => Some(TurnPhase::Combat),
            TurnPhase::Combat => Some(TurnPhase::AirOperations),
            TurnPhase::AirOperations => Some(TurnPhase::EndOfTurn),
            TurnPhase::EndOfTurn => None,
        }
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnPhase::Movement => "movement",
            TurnPhase::Search => "search",
            TurnPhase::Shadowing => "shadowing",
            TurnPhase::Combat => "combat",
            TurnPhase::AirOperations => "air_operations",
            TurnPhase::EndOfTurn => "end_of_turn",
        };
        f.write_str(name)
    }
}
