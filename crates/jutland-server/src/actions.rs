//! `game_action` dispatcher.
//!
//! Payloads are tagged by `action`:
//!
//! ```json
//! {"action": "move_unit", "unit_id": 3, "to": "K16"}
//! ```
//!
//! The acting user must hold a seat in the game the action targets, and may
//! only order units and task forces of their own faction.
//!
//! The core services assume one writer per game, so actions on the same game
//! run one at a time. Actions on different games run in parallel.

use jutland_core::{
    AirOperations, AirUnitId, AirUnitType, BattleContext, CoreError, Faction, GameRecord,
    GameSetup, Hex, MovementKind, MovementService, NavalUnit, ShipCatalog, SpecialRulesEngine,
    TaskForce, TaskForceId, TaskForceManager, UnitId, VisibilityLevel,
};
use jutland_network::{ActionContext, ActionError, ActionHandler};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GameAction {
    // Setup
    CreateGame {
        name: String,
    },
    TakeSeat {
        faction: Faction,
    },
    DeployShip {
        ship: String,
        at: Hex,
    },
    DeployAirUnit {
        air_type: AirUnitType,
        home: Hex,
        max_speed: u32,
        endurance: u32,
    },

    // Movement
    MoveUnit {
        unit_id: UnitId,
        to: Hex,
        #[serde(default)]
        kind: MovementKind,
    },
    AvailableMoves {
        unit_id: UnitId,
    },
    Refuel {
        unit_id: UnitId,
        amount: u32,
    },
    MovementHistory,
    AdvancePhase,

    // Task forces
    CreateTaskForce {
        name: String,
        unit_ids: Vec<UnitId>,
    },
    AddToTaskForce {
        task_force_id: TaskForceId,
        unit_id: UnitId,
    },
    RemoveFromTaskForce {
        task_force_id: TaskForceId,
        unit_id: UnitId,
    },
    DissolveTaskForce {
        task_force_id: TaskForceId,
    },
    MoveTaskForce {
        task_force_id: TaskForceId,
        to: Hex,
        speed: u32,
    },
    SetTaskForceVisibility {
        task_force_id: TaskForceId,
        visible: bool,
    },

    // Fog of war
    VisibleUnits,
    LastKnownPositions,
    ReportContact {
        unit_id: UnitId,
        level: VisibilityLevel,
    },
    RecordSearch {
        hexes: Vec<Hex>,
        #[serde(default)]
        found: Vec<UnitId>,
    },

    // Battle and air
    ApplyBattleContext {
        unit_ids: Vec<UnitId>,
        context: BattleContext,
    },
    LaunchAirUnit {
        air_unit_id: AirUnitId,
        target: Hex,
    },
    LandAirUnit {
        air_unit_id: AirUnitId,
    },
    RefitAirUnit {
        air_unit_id: AirUnitId,
    },
    CompleteRefit {
        air_unit_id: AirUnitId,
    },
}

impl GameAction {
    pub fn name(&self) -> &'static str {
        match self {
            GameAction::CreateGame { .. } => "create_game",
            GameAction::TakeSeat { .. } => "take_seat",
            GameAction::DeployShip { .. } => "deploy_ship",
            GameAction::DeployAirUnit { .. } => "deploy_air_unit",
            GameAction::MoveUnit { .. } => "move_unit",
            GameAction::AvailableMoves { .. } => "available_moves",
            GameAction::Refuel { .. } => "refuel",
            GameAction::MovementHistory => "movement_history",
            GameAction::AdvancePhase => "advance_phase",
            GameAction::CreateTaskForce { .. } => "create_task_force",
            GameAction::AddToTaskForce { .. } => "add_to_task_force",
            GameAction::RemoveFromTaskForce { .. } => "remove_from_task_force",
            GameAction::DissolveTaskForce { .. } => "dissolve_task_force",
            GameAction::MoveTaskForce { .. } => "move_task_force",
            GameAction::SetTaskForceVisibility { .. } => "set_task_force_visibility",
            GameAction::VisibleUnits => "visible_units",
            GameAction::LastKnownPositions => "last_known_positions",
            GameAction::ReportContact { .. } => "report_contact",
            GameAction::RecordSearch { .. } => "record_search",
            GameAction::ApplyBattleContext { .. } => "apply_battle_context",
            GameAction::LaunchAirUnit { .. } => "launch_air_unit",
            GameAction::LandAirUnit { .. } => "land_air_unit",
            GameAction::RefitAirUnit { .. } => "refit_air_unit",
            GameAction::CompleteRefit { .. } => "complete_refit",
        }
    }
}

/// The acting user, resolved against the game.
struct Seat {
    game: GameRecord,
    user_id: String,
    faction: Faction,
}

/// Core services behind the hub.
pub struct GameActions {
    setup: GameSetup,
    movement: MovementService,
    task_forces: TaskForceManager,
    air: AirOperations,
    rules: Mutex<SpecialRulesEngine>,
    /// One lock per game id.
    games: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GameActions {
    pub fn new(movement: MovementService, catalog: Arc<ShipCatalog>) -> Self {
        let store = Arc::clone(movement.store());
        Self {
            setup: GameSetup::new(Arc::clone(&store), catalog),
            task_forces: TaskForceManager::new(movement.clone()),
            air: AirOperations::new(store),
            movement,
            rules: Mutex::new(SpecialRulesEngine::new()),
            games: Mutex::new(HashMap::new()),
        }
    }

    /// Run one parsed action.
    pub fn dispatch(&self, ctx: &ActionContext, action: GameAction) -> Result<Value, ActionError> {
        let user_id = ctx
            .user_id
            .as_deref()
            .ok_or_else(|| ActionError::new("unauthenticated", "no user on this session"))?;
        let game_id = ctx
            .game_id
            .as_deref()
            .ok_or_else(|| ActionError::new("not_in_game", "join a game or name one in game_id"))?;

        let game_lock = self.game_lock(game_id);
        let _serialized = game_lock.lock().unwrap_or_else(PoisonError::into_inner);

        match action {
            GameAction::CreateGame { name } => reply(&self.setup.create_game(game_id, &name)?),
            GameAction::TakeSeat { faction } => {
                reply(&self.setup.seat_player(game_id, user_id, faction)?)
            }
            other => {
                let seat = self.seat(game_id, user_id)?;
                self.seated(&seat, other)
            }
        }
    }

    fn seated(&self, seat: &Seat, action: GameAction) -> Result<Value, ActionError> {
        let game_id = seat.game.id.as_str();
        match action {
            GameAction::CreateGame { .. } | GameAction::TakeSeat { .. } => {
                Err(ActionError::new("invalid_action", "already handled"))
            }
            GameAction::DeployShip { ship, at } => {
                let spec_faction = self.setup.catalog().get(&ship).map(|spec| spec.faction);
                if spec_faction.is_some_and(|faction| faction != seat.faction) {
                    return Err(not_yours("ship"));
                }
                let mut rules = self.rules()?;
                reply(&self.setup.deploy_ship(game_id, &ship, at, &mut rules)?)
            }
            GameAction::DeployAirUnit {
                air_type,
                home,
                max_speed,
                endurance,
            } => reply(&self.setup.deploy_air_unit(
                game_id,
                air_type,
                seat.faction,
                home,
                max_speed,
                endurance,
            )?),
            GameAction::MoveUnit { unit_id, to, kind } => {
                self.own_unit(seat, unit_id)?;
                reply(&self.movement.execute_move_as(unit_id, to, kind)?)
            }
            GameAction::AvailableMoves { unit_id } => {
                self.own_unit(seat, unit_id)?;
                reply(&self.movement.get_available_moves(unit_id)?)
            }
            GameAction::Refuel { unit_id, amount } => {
                self.own_unit(seat, unit_id)?;
                reply(&self.movement.refuel(unit_id, amount)?)
            }
            GameAction::MovementHistory => {
                let own: Vec<_> = self
                    .movement
                    .movement_history(game_id)?
                    .into_iter()
                    .filter(|record| {
                        self.movement
                            .load_unit(record.unit_id)
                            .map(|unit| unit.owner == seat.faction)
                            .unwrap_or(false)
                    })
                    .collect();
                reply(&own)
            }
            GameAction::AdvancePhase => reply(&self.movement.advance_phase(game_id)?),
            GameAction::CreateTaskForce { name, unit_ids } => reply(
                &self
                    .task_forces
                    .create_task_force(game_id, &name, seat.faction, &unit_ids)?,
            ),
            GameAction::AddToTaskForce {
                task_force_id,
                unit_id,
            } => {
                self.own_task_force(seat, task_force_id)?;
                self.own_unit(seat, unit_id)?;
                reply(&self.task_forces.add_unit(task_force_id, unit_id)?)
            }
            GameAction::RemoveFromTaskForce {
                task_force_id,
                unit_id,
            } => {
                self.own_task_force(seat, task_force_id)?;
                let remaining = self.task_forces.remove_unit(task_force_id, unit_id)?;
                Ok(json!({ "task_force": remaining, "dissolved": remaining.is_none() }))
            }
            GameAction::DissolveTaskForce { task_force_id } => {
                self.own_task_force(seat, task_force_id)?;
                self.task_forces.dissolve(task_force_id)?;
                Ok(json!({ "dissolved": task_force_id }))
            }
            GameAction::MoveTaskForce {
                task_force_id,
                to,
                speed,
            } => {
                self.own_task_force(seat, task_force_id)?;
                reply(&self.task_forces.move_task_force(task_force_id, to, speed)?)
            }
            GameAction::SetTaskForceVisibility {
                task_force_id,
                visible,
            } => {
                self.own_task_force(seat, task_force_id)?;
                reply(&self.task_forces.set_visibility(task_force_id, visible)?)
            }
            GameAction::VisibleUnits => reply(
                &self
                    .movement
                    .visibility()
                    .get_visible_units_for_player(game_id, &seat.user_id)?,
            ),
            GameAction::LastKnownPositions => reply(
                &self
                    .movement
                    .visibility()
                    .get_last_known_positions(game_id, &seat.user_id)?,
            ),
            GameAction::ReportContact { unit_id, level } => {
                self.game_unit(seat, unit_id)?;
                reply(
                    &self
                        .movement
                        .visibility()
                        .update_visibility(unit_id, &seat.user_id, level)?,
                )
            }
            GameAction::RecordSearch { hexes, found } => reply(
                &self
                    .movement
                    .visibility()
                    .record_search(game_id, &seat.user_id, hexes, found)?,
            ),
            GameAction::ApplyBattleContext { unit_ids, context } => {
                self.apply_battle_context(seat, &unit_ids, &context)
            }
            GameAction::LaunchAirUnit {
                air_unit_id,
                target,
            } => {
                self.own_air_unit(seat, air_unit_id)?;
                reply(&self.air.launch(air_unit_id, target)?)
            }
            GameAction::LandAirUnit { air_unit_id } => {
                self.own_air_unit(seat, air_unit_id)?;
                reply(&self.air.land(air_unit_id)?)
            }
            GameAction::RefitAirUnit { air_unit_id } => {
                self.own_air_unit(seat, air_unit_id)?;
                reply(&self.air.begin_refit(air_unit_id)?)
            }
            GameAction::CompleteRefit { air_unit_id } => {
                self.own_air_unit(seat, air_unit_id)?;
                reply(&self.air.complete_refit(air_unit_id)?)
            }
        }
    }

    /// Evaluate special rules for the given units and persist the result.
    fn apply_battle_context(
        &self,
        seat: &Seat,
        unit_ids: &[UnitId],
        context: &BattleContext,
    ) -> Result<Value, ActionError> {
        let mut units = Vec::with_capacity(unit_ids.len());
        for unit_id in unit_ids {
            units.push(self.game_unit(seat, *unit_id)?);
        }

        let mut rules = self.rules()?;
        let mut applications = Vec::new();
        for mut unit in units {
            // Registry lives in memory; re-declare from the catalog after a restart
            if rules.rules_for(unit.id).is_empty() {
                if let Some(spec) = self.setup.catalog().get(&unit.name) {
                    rules.register_from_catalog(unit.id, spec);
                }
            }
            applications.extend(rules.apply_to_unit(&mut unit, context));
            self.movement.store().update_unit(&unit).map_err(CoreError::from)?;
        }
        reply(&applications)
    }

    fn game_lock(&self, game_id: &str) -> Arc<Mutex<()>> {
        let mut games = self.games.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(games.entry(game_id.to_string()).or_default())
    }

    fn seat(&self, game_id: &str, user_id: &str) -> Result<Seat, ActionError> {
        let game = self.movement.load_game(game_id)?;
        let faction = game
            .faction_of(user_id)
            .ok_or_else(|| CoreError::PlayerNotInGame(user_id.to_string()))?;
        Ok(Seat {
            game,
            user_id: user_id.to_string(),
            faction,
        })
    }

    /// A unit of the seat's game, whoever owns it.
    fn game_unit(&self, seat: &Seat, unit_id: UnitId) -> Result<NavalUnit, ActionError> {
        let unit = self.movement.load_unit(unit_id)?;
        if unit.game_id != seat.game.id {
            return Err(CoreError::UnitNotFound(unit_id).into());
        }
        Ok(unit)
    }

    fn own_unit(&self, seat: &Seat, unit_id: UnitId) -> Result<NavalUnit, ActionError> {
        let unit = self.game_unit(seat, unit_id)?;
        if unit.owner != seat.faction {
            return Err(not_yours("unit"));
        }
        Ok(unit)
    }

    fn own_task_force(&self, seat: &Seat, id: TaskForceId) -> Result<TaskForce, ActionError> {
        let task_force = self.task_forces.get(id)?;
        if task_force.game_id != seat.game.id {
            return Err(CoreError::TaskForceNotFound(id).into());
        }
        if task_force.owner != seat.faction {
            return Err(not_yours("task force"));
        }
        Ok(task_force)
    }

    fn own_air_unit(&self, seat: &Seat, id: AirUnitId) -> Result<(), ActionError> {
        let unit = self.air.get(id)?;
        if unit.game_id != seat.game.id {
            return Err(CoreError::AirUnitNotFound(id).into());
        }
        if unit.owner != seat.faction {
            return Err(not_yours("air unit"));
        }
        Ok(())
    }

    fn rules(&self) -> Result<std::sync::MutexGuard<'_, SpecialRulesEngine>, ActionError> {
        self.rules
            .lock()
            .map_err(|_| ActionError::new("unavailable", "special rules registry poisoned"))
    }
}

impl ActionHandler for GameActions {
    fn handle(&self, ctx: &ActionContext, payload: Value) -> Result<Value, ActionError> {
        let action: GameAction = serde_json::from_value(payload)
            .map_err(|err| ActionError::new("invalid_action", err.to_string()))?;
        let name = action.name();
        let result = self.dispatch(ctx, action);
        if let Err(err) = &result {
            debug!(
                action = name,
                user_id = ctx.user_id.as_deref(),
                game_id = ctx.game_id.as_deref(),
                code = %err.code,
                "action rejected"
            );
        }
        result
    }
}

fn reply<T: Serialize>(value: &T) -> Result<Value, ActionError> {
    serde_json::to_value(value).map_err(|err| ActionError::new("internal", err.to_string()))
}

fn not_yours(what: &str) -> ActionError {
    ActionError::new("not_owner", format!("that {what} belongs to the other side"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jutland_core::{MemoryStore, NullSink, TerrainMap};
    use jutland_network::SessionId;

    fn actions() -> GameActions {
        let movement = MovementService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(TerrainMap::open_sea(26, 30)),
            Arc::new(NullSink),
        );
        GameActions::new(movement, Arc::new(ShipCatalog::builtin()))
    }

    fn ctx(user: &str) -> ActionContext {
        ActionContext {
            session_id: SessionId::nil(),
            user_id: Some(user.to_string()),
            game_id: Some("g1".to_string()),
        }
    }

    fn run(actions: &GameActions, user: &str, payload: Value) -> Result<Value, ActionError> {
        actions.handle(&ctx(user), payload)
    }

    fn seated() -> GameActions {
        let actions = actions();
        run(&actions, "lutjens", json!({ "action": "create_game", "name": "Rheinübung" })).unwrap();
        run(&actions, "lutjens", json!({ "action": "take_seat", "faction": "german" })).unwrap();
        run(&actions, "tovey", json!({ "action": "take_seat", "faction": "british" })).unwrap();
        actions
    }

    #[test]
    fn test_payload_parsing() {
        let action: GameAction =
            serde_json::from_value(json!({ "action": "move_unit", "unit_id": 1, "to": "K16" }))
                .unwrap();
        assert_eq!(
            action,
            GameAction::MoveUnit {
                unit_id: 1,
                to: "K16".parse().unwrap(),
                kind: MovementKind::Normal,
            }
        );

        let err = run(&actions(), "lutjens", json!({ "action": "sink_hood" })).unwrap_err();
        assert_eq!(err.code, "invalid_action");
    }

    #[test]
    fn test_requires_user_and_game() {
        let actions = actions();
        let anonymous = ActionContext {
            user_id: None,
            ..ctx("nobody")
        };
        let err = actions
            .handle(&anonymous, json!({ "action": "advance_phase" }))
            .unwrap_err();
        assert_eq!(err.code, "unauthenticated");

        let roomless = ActionContext {
            game_id: None,
            ..ctx("lutjens")
        };
        let err = actions
            .handle(&roomless, json!({ "action": "advance_phase" }))
            .unwrap_err();
        assert_eq!(err.code, "not_in_game");
    }

    #[test]
    fn test_unseated_player_is_rejected() {
        let actions = seated();
        let err = run(&actions, "raeder", json!({ "action": "visible_units" })).unwrap_err();
        assert_eq!(err.code, "player_not_in_game");
    }

    #[test]
    fn test_orders_only_own_units() {
        let actions = seated();
        let bismarck = run(
            &actions,
            "lutjens",
            json!({ "action": "deploy_ship", "ship": "Bismarck", "at": "K15" }),
        )
        .unwrap();
        let bismarck_id = bismarck["id"].as_u64().unwrap();

        let err = run(
            &actions,
            "tovey",
            json!({ "action": "deploy_ship", "ship": "Prinz Eugen", "at": "K15" }),
        )
        .unwrap_err();
        assert_eq!(err.code, "not_owner");

        let err = run(
            &actions,
            "tovey",
            json!({ "action": "move_unit", "unit_id": bismarck_id, "to": "K16" }),
        )
        .unwrap_err();
        assert_eq!(err.code, "not_owner");

        let moved = run(
            &actions,
            "lutjens",
            json!({ "action": "move_unit", "unit_id": bismarck_id, "to": "K16" }),
        )
        .unwrap();
        assert_eq!(moved["to"], "K16");

        let history = run(&actions, "tovey", json!({ "action": "movement_history" })).unwrap();
        assert_eq!(history.as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_concurrent_orders_for_one_unit_apply_once() {
        for _ in 0..50 {
            let actions = seated();
            let bismarck = run(
                &actions,
                "lutjens",
                json!({ "action": "deploy_ship", "ship": "Bismarck", "at": "K15" }),
            )
            .unwrap();
            let unit_id = bismarck["id"].as_u64().unwrap();

            let barrier = std::sync::Barrier::new(2);
            let results: Vec<_> = std::thread::scope(|scope| {
                let handles: Vec<_> = ["K16", "K14"]
                    .into_iter()
                    .map(|to| {
                        let (actions, barrier) = (&actions, &barrier);
                        scope.spawn(move || {
                            barrier.wait();
                            run(
                                actions,
                                "lutjens",
                                json!({ "action": "move_unit", "unit_id": unit_id, "to": to }),
                            )
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            let err = results.into_iter().find_map(Result::err).unwrap();
            assert_eq!(err.code, "movement_forbidden_this_turn");
            assert_eq!(actions.movement.movement_history("g1").unwrap().len(), 1);
        }
    }

    #[test]
    fn test_task_force_flow() {
        let actions = seated();
        let mut ids = Vec::new();
        for ship in ["Bismarck", "Prinz Eugen"] {
            let unit = run(
                &actions,
                "lutjens",
                json!({ "action": "deploy_ship", "ship": ship, "at": "K15" }),
            )
            .unwrap();
            ids.push(unit["id"].as_u64().unwrap());
        }

        let tf = run(
            &actions,
            "lutjens",
            json!({ "action": "create_task_force", "name": "Rheinübung", "unit_ids": ids }),
        )
        .unwrap();
        let tf_id = tf["id"].as_u64().unwrap();

        let err = run(
            &actions,
            "tovey",
            json!({ "action": "move_task_force", "task_force_id": tf_id, "to": "K16", "speed": 1 }),
        )
        .unwrap_err();
        assert_eq!(err.code, "not_owner");

        let records = run(
            &actions,
            "lutjens",
            json!({ "action": "move_task_force", "task_force_id": tf_id, "to": "K16", "speed": 1 }),
        )
        .unwrap();
        assert_eq!(records.as_array().unwrap().len(), 2);

        let removed = run(
            &actions,
            "lutjens",
            json!({ "action": "remove_from_task_force", "task_force_id": tf_id, "unit_id": ids[0] }),
        )
        .unwrap();
        assert_eq!(removed["dissolved"], false);
        let removed = run(
            &actions,
            "lutjens",
            json!({ "action": "remove_from_task_force", "task_force_id": tf_id, "unit_id": ids[1] }),
        )
        .unwrap();
        assert_eq!(removed["dissolved"], true);
    }

    #[test]
    fn test_battle_context_persists_armament() {
        let actions = seated();
        let rodney = run(
            &actions,
            "tovey",
            json!({ "action": "deploy_ship", "ship": "Rodney", "at": "C5" }),
        )
        .unwrap();
        let rodney_id = rodney["id"].as_u64().unwrap();

        let applied = run(
            &actions,
            "tovey",
            json!({
                "action": "apply_battle_context",
                "unit_ids": [rodney_id],
                "context": { "phase": "main", "range": "long", "round": 2 }
            }),
        )
        .unwrap();
        assert!(applied
            .as_array()
            .unwrap()
            .iter()
            .any(|a| a["rule_type"] == "stern_guns_initial_phase_only" && a["triggered"] == true));

        let unit = actions.movement.load_unit(rodney_id).unwrap();
        assert_eq!(unit.primary_stern, 0);
    }
}
