//! Fog of war: what each player knows about enemy units.
//!
//! Knowledge is tracked per (unit, observing player). Each pair moves through
//! `Unknown -> Sighted -> Shadowed` and may fall back to `Sighted` or
//! `Unknown` at any time.
//!
//! # Visibility Rules
//!
//! - Own units are always visible to their owner. This is computed and never stored.
//! - Enemy units are visible while the observer has them Sighted or Shadowed.
//! - An observer who cannot see a unit keeps the last hex where it was seen.
//! - Hull and fuel of enemy units are never revealed.

use crate::error::{CoreError, CoreResult};
use crate::game::{GameRecord, SearchRecord};
use crate::hex::Hex;
use crate::store::{ChangeSet, GameStore, IdKind};
use crate::types::{Faction, GameId, PlayerId, UnitId};
use crate::unit::{NavalUnit, ShipType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// How much an observer knows about a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityLevel {
    /// No current contact.
    #[default]
    Unknown,
    /// Detected once.
    Sighted,
    /// Actively tracked; subsequent movement is observed.
    Shadowed,
}

impl VisibilityLevel {
    pub fn is_visible(&self) -> bool {
        matches!(self, VisibilityLevel::Sighted | VisibilityLevel::Shadowed)
    }
}

/// Stored knowledge of one observer about one enemy unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisibilityRecord {
    pub unit_id: UnitId,
    pub observer: PlayerId,
    pub game_id: GameId,
    pub level: VisibilityLevel,
    pub last_known_hex: Option<Hex>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl VisibilityRecord {
    pub fn unknown(unit_id: UnitId, observer: impl Into<PlayerId>, game_id: impl Into<GameId>) -> Self {
        Self {
            unit_id,
            observer: observer.into(),
            game_id: game_id.into(),
            level: VisibilityLevel::Unknown,
            last_known_hex: None,
            last_seen_at: None,
        }
    }

    fn observe(&mut self, hex: Hex) {
        self.last_known_hex = Some(hex);
        self.last_seen_at = Some(Utc::now());
    }
}

/// A unit as an observer currently sees it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisibleUnit {
    pub unit_id: UnitId,
    pub name: String,
    pub ship_type: ShipType,
    pub owner: Faction,
    pub position: Hex,
    pub level: VisibilityLevel,
    /// Only present for the observer's own units.
    pub hull: Option<u32>,
    /// Only present for the observer's own units.
    pub fuel: Option<u32>,
}

impl VisibleUnit {
    fn own(unit: &NavalUnit) -> Self {
        Self {
            unit_id: unit.id,
            name: unit.name.clone(),
            ship_type: unit.ship_type,
            owner: unit.owner,
            position: unit.position,
            level: VisibilityLevel::Sighted,
            hull: Some(unit.hull),
            fuel: Some(unit.fuel),
        }
    }

    fn enemy(unit: &NavalUnit, level: VisibilityLevel) -> Self {
        Self {
            unit_id: unit.id,
            name: unit.name.clone(),
            ship_type: unit.ship_type,
            owner: unit.owner,
            position: unit.position,
            level,
            hull: None,
            fuel: None,
        }
    }
}

/// Where an observer last saw an enemy unit it has since lost.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LastKnownPosition {
    pub unit_id: UnitId,
    pub hex: Hex,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Maintains and answers per-observer visibility.
#[derive(Clone)]
pub struct VisibilityEngine {
    store: Arc<dyn GameStore>,
}

impl VisibilityEngine {
    pub fn new(store: Arc<dyn GameStore>) -> Self {
        Self { store }
    }

    /// Visibility writes caused by `unit` moving from `from` to `to`.
    ///
    /// Every player not on the unit's side gets a record (created at
    /// `Unknown` with `from` as the last known hex if missing). Observers
    /// who currently see the unit learn the new hex; the rest keep what
    /// they knew.
    pub fn plan_movement(
        &self,
        game: &GameRecord,
        unit: &NavalUnit,
        from: Hex,
        to: Hex,
    ) -> CoreResult<Vec<VisibilityRecord>> {
        let mut records = Vec::new();
        for seat in game.observers_of(unit.owner) {
            let mut record = match self.store.visibility(unit.id, &seat.user_id)? {
                Some(record) => record,
                None => {
                    let mut record = VisibilityRecord::unknown(unit.id, &seat.user_id, &game.id);
                    record.last_known_hex = Some(from);
                    record
                }
            };
            if record.level.is_visible() {
                record.observe(to);
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Recompute and store visibility after a move.
    pub fn process_movement_visibility(&self, unit_id: UnitId, from: Hex, to: Hex) -> CoreResult<()> {
        let unit = self.load_unit(unit_id)?;
        let game = self.load_game(&unit.game_id)?;
        let records = self.plan_movement(&game, &unit, from, to)?;
        self.store.commit(ChangeSet {
            visibility: records,
            ..ChangeSet::default()
        })?;
        Ok(())
    }

    /// Set what `observer` knows about a unit, as decided by search or detection.
    ///
    /// Promoting to Sighted or Shadowed fixes the unit's current hex as its
    /// last known position. Setting the level of an own unit is a no-op.
    pub fn update_visibility(
        &self,
        unit_id: UnitId,
        observer: &str,
        level: VisibilityLevel,
    ) -> CoreResult<Option<VisibilityRecord>> {
        let unit = self.load_unit(unit_id)?;
        let game = self.load_game(&unit.game_id)?;
        let faction = game
            .faction_of(observer)
            .ok_or_else(|| CoreError::PlayerNotInGame(observer.to_string()))?;
        if faction == unit.owner {
            return Ok(None);
        }

        let mut record = self
            .store
            .visibility(unit_id, observer)?
            .unwrap_or_else(|| VisibilityRecord::unknown(unit_id, observer, &game.id));
        let previous = record.level;
        record.level = level;
        if level.is_visible() {
            record.observe(unit.position);
        }

        self.store.commit(ChangeSet {
            visibility: vec![record.clone()],
            ..ChangeSet::default()
        })?;
        debug!(unit_id, observer, ?previous, ?level, "visibility updated");
        Ok(Some(record))
    }

    /// Own units plus every enemy unit the observer currently sees.
    pub fn get_visible_units_for_player(
        &self,
        game_id: &str,
        observer: &str,
    ) -> CoreResult<Vec<VisibleUnit>> {
        let game = self.load_game(game_id)?;
        let faction = game
            .faction_of(observer)
            .ok_or_else(|| CoreError::PlayerNotInGame(observer.to_string()))?;

        let records = self.store.visibility_by_observer(game_id, observer)?;
        let mut visible = Vec::new();
        for unit in self.store.units_by_game(game_id)? {
            if unit.owner == faction {
                visible.push(VisibleUnit::own(&unit));
                continue;
            }
            if let Some(record) = records
                .iter()
                .find(|r| r.unit_id == unit.id && r.level.is_visible())
            {
                visible.push(VisibleUnit::enemy(&unit, record.level));
            }
        }
        Ok(visible)
    }

    /// Enemy units the observer has lost contact with, at their last known hex.
    pub fn get_last_known_positions(
        &self,
        game_id: &str,
        observer: &str,
    ) -> CoreResult<Vec<LastKnownPosition>> {
        let game = self.load_game(game_id)?;
        if game.faction_of(observer).is_none() {
            return Err(CoreError::PlayerNotInGame(observer.to_string()));
        }

        Ok(self
            .store
            .visibility_by_observer(game_id, observer)?
            .into_iter()
            .filter(|r| r.level == VisibilityLevel::Unknown)
            .filter_map(|r| {
                r.last_known_hex.map(|hex| LastKnownPosition {
                    unit_id: r.unit_id,
                    hex,
                    last_seen_at: r.last_seen_at,
                })
            })
            .collect())
    }

    /// Store the outcome of a search and mark every unit found as Sighted.
    pub fn record_search(
        &self,
        game_id: &str,
        player_id: &str,
        searched_hexes: Vec<Hex>,
        found_units: Vec<UnitId>,
    ) -> CoreResult<SearchRecord> {
        let game = self.load_game(game_id)?;
        if game.faction_of(player_id).is_none() {
            return Err(CoreError::PlayerNotInGame(player_id.to_string()));
        }

        let search = SearchRecord {
            id: self.store.next_id(IdKind::Search)?,
            game_id: game.id.clone(),
            player_id: player_id.to_string(),
            searched_hexes,
            found_units,
            turn: game.turn,
            phase: game.phase,
            created_at: Utc::now(),
        };
        self.store.create_search(&search)?;
        for &unit_id in &search.found_units {
            self.update_visibility(unit_id, player_id, VisibilityLevel::Sighted)?;
        }
        debug!(game_id, player_id, found = search.found_units.len(), "search recorded");
        Ok(search)
    }

    pub fn search_history(&self, game_id: &str) -> CoreResult<Vec<SearchRecord>> {
        Ok(self.store.searches_by_game(game_id)?)
    }

    fn load_unit(&self, unit_id: UnitId) -> CoreResult<NavalUnit> {
        self.store
            .unit(unit_id)?
            .ok_or(CoreError::UnitNotFound(unit_id))
    }

    fn load_game(&self, game_id: &str) -> CoreResult<GameRecord> {
        self.store
            .game(game_id)?
            .ok_or_else(|| CoreError::GameNotFound(game_id.to_string()))
    }
}
