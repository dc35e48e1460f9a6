//! Movement service: validates and executes naval moves.
//!
//! A move is checked in a fixed order (target, rest turn, emergency fuel, map
//! restrictions, fuel) before anything is written. Every write of a move
//! (movement record, unit, fuel tracking, visibility) goes to the store as
//! one change set, so a rejected move leaves no trace.

use crate::error::{CoreError, CoreResult, RestrictionReason};
use crate::events::{EventSink, GameEvent};
use crate::fuel::{EmergencyFuelPolicy, FuelTracking};
use crate::game::GameRecord;
use crate::hex::Hex;
use crate::map::TerrainMap;
use crate::pathfinding::{find_reachable, find_route};
use crate::store::{ChangeSet, GameStore, IdKind};
use crate::types::{GameId, MovementId, Turn, TurnPhase, UnitId};
use crate::unit::NavalUnit;
use crate::visibility::VisibilityEngine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// How a move came about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    #[default]
    Normal,
    /// Following an enemy unit after contact.
    Pursued,
    /// Steaming on emergency fuel.
    Emergency,
}

/// Append-only history entry for one executed move.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementId,
    pub unit_id: UnitId,
    pub game_id: GameId,
    pub from: Hex,
    pub to: Hex,
    /// Every hex entered, starting with `from` and ending with `to`.
    pub path: Vec<Hex>,
    pub fuel_cost: u32,
    pub hexes_moved: u32,
    pub kind: MovementKind,
    pub turn: Turn,
    pub phase: TurnPhase,
    pub created_at: DateTime<Utc>,
}

/// A validated move that has not been written yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedMove {
    pub unit_id: UnitId,
    pub from: Hex,
    pub to: Hex,
    pub path: Vec<Hex>,
    pub fuel_cost: u32,
    pub kind: MovementKind,
}

impl PlannedMove {
    pub fn hexes(&self) -> u32 {
        self.path.len().saturating_sub(1) as u32
    }
}

/// Legal destinations for a unit this turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableMoves {
    pub hexes: Vec<Hex>,
    pub fuel_costs: BTreeMap<Hex, u32>,
}

/// Hexes per turn a unit can make right now.
///
/// Zero when the unit cannot steam at all, one on emergency fuel.
pub fn effective_speed(unit: &NavalUnit, tracking: &FuelTracking) -> u32 {
    if !unit.is_operational() {
        0
    } else if tracking.emergency_fuel {
        1
    } else {
        unit.speed_class.max_movement_distance()
    }
}

/// Executes moves against the store and publishes the results.
#[derive(Clone)]
pub struct MovementService {
    store: Arc<dyn GameStore>,
    map: Arc<TerrainMap>,
    events: Arc<dyn EventSink>,
    visibility: VisibilityEngine,
    policy: EmergencyFuelPolicy,
}

impl MovementService {
    pub fn new(store: Arc<dyn GameStore>, map: Arc<TerrainMap>, events: Arc<dyn EventSink>) -> Self {
        let visibility = VisibilityEngine::new(store.clone());
        Self {
            store,
            map,
            events,
            visibility,
            policy: EmergencyFuelPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: EmergencyFuelPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &Arc<dyn GameStore> {
        &self.store
    }

    pub fn map(&self) -> &TerrainMap {
        &self.map
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    pub fn visibility(&self) -> &VisibilityEngine {
        &self.visibility
    }

    pub fn policy(&self) -> EmergencyFuelPolicy {
        self.policy
    }

    pub fn load_unit(&self, unit_id: UnitId) -> CoreResult<NavalUnit> {
        self.store
            .unit(unit_id)?
            .ok_or(CoreError::UnitNotFound(unit_id))
    }

    pub fn load_game(&self, game_id: &str) -> CoreResult<GameRecord> {
        self.store
            .game(game_id)?
            .ok_or_else(|| CoreError::GameNotFound(game_id.to_string()))
    }

    /// The unit's fuel tracking, brought forward to `turn`.
    pub fn tracking_for(&self, unit: &NavalUnit, turn: Turn) -> CoreResult<FuelTracking> {
        let mut tracking = self
            .store
            .fuel_tracking(unit.id)?
            .unwrap_or_else(|| FuelTracking::new(unit.id, unit.game_id.clone(), turn));
        tracking.roll_to(turn);
        Ok(tracking)
    }

    /// Move a unit to `to` as a normal move.
    pub fn execute_move(&self, unit_id: UnitId, to: Hex) -> CoreResult<MovementRecord> {
        self.execute_move_as(unit_id, to, MovementKind::Normal)
    }

    /// Move a unit to `to`, recording the move as `kind`.
    ///
    /// Emergency fuel overrides `kind`.
    pub fn execute_move_as(
        &self,
        unit_id: UnitId,
        to: Hex,
        kind: MovementKind,
    ) -> CoreResult<MovementRecord> {
        let unit = self.load_unit(unit_id)?;
        let game = self.load_game(&unit.game_id)?;
        let tracking = self.tracking_for(&unit, game.turn)?;

        let plan = match self.plan_move(&unit, &tracking, to, kind) {
            Ok(plan) => plan,
            Err(err) => {
                debug!(unit_id, game_id = %unit.game_id, to = %to, error = %err, "move rejected");
                return Err(err);
            }
        };

        let movement_id = self.store.next_id(IdKind::Movement)?;
        let (changes, record) = self.stage_move(&game, unit.clone(), tracking, &plan, movement_id)?;
        self.store.commit(changes)?;

        info!(
            unit_id,
            game_id = %unit.game_id,
            from = %record.from,
            to = %record.to,
            fuel_cost = record.fuel_cost,
            "unit moved"
        );
        self.events.publish(GameEvent::UnitMoved {
            game_id: record.game_id.clone(),
            unit_id,
            owner: unit.owner,
            movement_id: record.id,
            from: record.from,
            to: record.to,
            path: record.path.clone(),
            fuel_cost: record.fuel_cost,
            kind: record.kind,
            turn: record.turn,
        });
        Ok(record)
    }

    /// Validate a move without writing anything.
    pub fn plan_move(
        &self,
        unit: &NavalUnit,
        tracking: &FuelTracking,
        to: Hex,
        kind: MovementKind,
    ) -> CoreResult<PlannedMove> {
        let from = unit.position;
        if to == from {
            return Err(CoreError::InvalidTarget(to));
        }
        if !unit.is_operational() {
            return Err(CoreError::MovementRestricted {
                reason: RestrictionReason::UnitNotOperational,
            });
        }

        if tracking.moved_this_turn
            || !unit
                .speed_class
                .can_move_this_turn(tracking.hexes_moved_previous_turn)
        {
            return Err(CoreError::MovementForbiddenThisTurn(unit.id));
        }

        let requested = from.distance(&to);
        if tracking.emergency_fuel && requested > 1 {
            return Err(CoreError::EmergencyFuelRangeExceeded {
                unit_id: unit.id,
                requested,
            });
        }

        let path = find_route(&self.map, unit, to, effective_speed(unit, tracking))
            .map_err(|reason| CoreError::MovementRestricted { reason })?;
        let hexes = path.len().saturating_sub(1) as u32;

        let fuel_cost = if tracking.emergency_fuel {
            0
        } else {
            unit.speed_class
                .fuel_cost(hexes, tracking.hexes_moved_previous_turn)
        };
        if unit.fuel < fuel_cost {
            return Err(CoreError::InsufficientFuel {
                required: fuel_cost,
                available: unit.fuel,
            });
        }

        Ok(PlannedMove {
            unit_id: unit.id,
            from,
            to,
            path,
            fuel_cost,
            kind: if tracking.emergency_fuel {
                MovementKind::Emergency
            } else {
                kind
            },
        })
    }

    /// Build every write a validated move causes.
    pub(crate) fn stage_move(
        &self,
        game: &GameRecord,
        mut unit: NavalUnit,
        mut tracking: FuelTracking,
        plan: &PlannedMove,
        movement_id: MovementId,
    ) -> CoreResult<(ChangeSet, MovementRecord)> {
        let record = MovementRecord {
            id: movement_id,
            unit_id: unit.id,
            game_id: unit.game_id.clone(),
            from: plan.from,
            to: plan.to,
            path: plan.path.clone(),
            fuel_cost: plan.fuel_cost,
            hexes_moved: plan.hexes(),
            kind: plan.kind,
            turn: game.turn,
            phase: game.phase,
            created_at: Utc::now(),
        };

        let visibility = self.visibility.plan_movement(game, &unit, plan.from, plan.to)?;

        unit.position = plan.to;
        unit.fuel -= plan.fuel_cost;
        tracking.record_move(plan.hexes());

        let changes = ChangeSet {
            units: vec![unit],
            fuel: vec![tracking],
            movements: vec![record.clone()],
            visibility,
            ..ChangeSet::default()
        };
        Ok((changes, record))
    }

    /// Hexes the unit may move to this turn, with the fuel each would cost.
    pub fn get_available_moves(&self, unit_id: UnitId) -> CoreResult<AvailableMoves> {
        let unit = self.load_unit(unit_id)?;
        let game = self.load_game(&unit.game_id)?;
        let tracking = self.tracking_for(&unit, game.turn)?;

        let can_move = unit.is_operational()
            && !tracking.moved_this_turn
            && unit
                .speed_class
                .can_move_this_turn(tracking.hexes_moved_previous_turn);
        if !can_move {
            return Ok(AvailableMoves::default());
        }

        let reachable = find_reachable(&self.map, &unit, effective_speed(&unit, &tracking));
        let fuel_costs: BTreeMap<Hex, u32> = reachable
            .into_iter()
            .map(|(hex, steps)| {
                let cost = if tracking.emergency_fuel {
                    0
                } else {
                    unit.speed_class
                        .fuel_cost(steps, tracking.hexes_moved_previous_turn)
                };
                (hex, cost)
            })
            .collect();

        Ok(AvailableMoves {
            hexes: fuel_costs.keys().copied().collect(),
            fuel_costs,
        })
    }

    /// Roll every unit's fuel tracking into the game's current turn and apply
    /// the emergency-fuel policy.
    ///
    /// Returns the units on emergency fuel for this turn.
    pub fn begin_turn(&self, game_id: &str) -> CoreResult<Vec<UnitId>> {
        let game = self.load_game(game_id)?;
        let mut changes = ChangeSet::new();
        let mut on_emergency = Vec::new();

        for unit in self.store.units_by_game(game_id)? {
            if unit.is_sunk() {
                continue;
            }
            let mut tracking = self
                .store
                .fuel_tracking(unit.id)?
                .unwrap_or_else(|| FuelTracking::new(unit.id, unit.game_id.clone(), game.turn));
            let was_on_emergency = tracking.emergency_fuel;
            self.policy.begin_turn(&mut tracking, unit.fuel, game.turn);
            if tracking.emergency_fuel {
                if !was_on_emergency {
                    info!(unit_id = unit.id, game_id, turn = game.turn, "unit on emergency fuel");
                }
                on_emergency.push(unit.id);
            }
            changes.fuel.push(tracking);
        }

        self.store.commit(changes)?;
        Ok(on_emergency)
    }

    /// Advance the game one phase; a new turn also runs [`Self::begin_turn`].
    pub fn advance_phase(&self, game_id: &str) -> CoreResult<GameRecord> {
        let mut game = self.load_game(game_id)?;
        let new_turn = game.advance_phase();
        self.store.update_game(&game)?;
        if new_turn {
            self.begin_turn(game_id)?;
        }

        info!(game_id, turn = game.turn, phase = %game.phase, "phase advanced");
        self.events.publish(GameEvent::PhaseAdvanced {
            game_id: game.id.clone(),
            turn: game.turn,
            phase: game.phase,
        });
        Ok(game)
    }

    /// Take on `amount` fuel points (capped at capacity). Ends emergency fuel.
    pub fn refuel(&self, unit_id: UnitId, amount: u32) -> CoreResult<NavalUnit> {
        let mut unit = self.load_unit(unit_id)?;
        let game = self.load_game(&unit.game_id)?;
        let mut tracking = self.tracking_for(&unit, game.turn)?;

        unit.fuel = unit.fuel.saturating_add(amount).min(unit.max_fuel);
        if unit.fuel > 0 {
            tracking.clear_emergency();
        }

        self.store.commit(ChangeSet {
            units: vec![unit.clone()],
            fuel: vec![tracking],
            ..ChangeSet::default()
        })?;
        debug!(unit_id, fuel = unit.fuel, "unit refueled");
        Ok(unit)
    }

    /// Movement history of a game, oldest first.
    pub fn movement_history(&self, game_id: &str) -> CoreResult<Vec<MovementRecord>> {
        Ok(self.store.movements_by_game(game_id)?)
    }
}
