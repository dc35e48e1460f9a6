//! Game records: seats, turn bookkeeping and search history.

use crate::hex::Hex;
use crate::types::{Faction, GameId, PlayerId, SearchId, Turn, TurnPhase, UnitId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A player seated in a game, playing one side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSeat {
    pub user_id: PlayerId,
    pub faction: Faction,
}

/// Turn state and seating of one game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: GameId,
    pub name: String,
    pub turn: Turn,
    pub phase: TurnPhase,
    pub players: Vec<PlayerSeat>,
    pub created_at: DateTime<Utc>,
}

impl GameRecord {
    pub fn new(id: impl Into<GameId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            turn: 1,
            phase: TurnPhase::Movement,
            players: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Seat a player. Returns `false` if the user is already seated.
    pub fn seat(&mut self, user_id: impl Into<PlayerId>, faction: Faction) -> bool {
        let user_id = user_id.into();
        if self.players.iter().any(|p| p.user_id == user_id) {
            return false;
        }
        self.players.push(PlayerSeat { user_id, faction });
        true
    }

    pub fn faction_of(&self, user_id: &str) -> Option<Faction> {
        self.players
            .iter()
            .find(|p| p.user_id == user_id)
            .map(|p| p.faction)
    }

    /// Players who do not command `faction`, i.e. who need fog of war for its units.
    pub fn observers_of(&self, faction: Faction) -> impl Iterator<Item = &PlayerSeat> {
        self.players.iter().filter(move |p| p.faction != faction)
    }

    /// Advance to the next phase, rolling over into a new turn after the last one.
    ///
    /// Returns `true` when a new turn started.
    pub fn advance_phase(&mut self) -> bool {
        match self.phase.next() {
            Some(next) => {
                self.phase = next;
                false
            }
            None => {
                self.turn += 1;
                self.phase = TurnPhase::Movement;
                true
            }
        }
    }
}

/// One executed search, kept for the game's history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub id: SearchId,
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub searched_hexes: Vec<Hex>,
    pub found_units: Vec<UnitId>,
    pub turn: Turn,
    pub phase: TurnPhase,
    pub created_at: DateTime<Utc>,
}
