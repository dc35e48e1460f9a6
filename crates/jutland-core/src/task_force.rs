//! Task forces: named groups of ships that move and are detected together.
//!
//! The task force owns its member set. Which task force a unit belongs to is
//! answered by [`TaskForceManager::task_force_of`], never stored on the unit.

use crate::error::{CoreError, CoreResult, RestrictionReason};
use crate::events::GameEvent;
use crate::hex::Hex;
use crate::movement::{effective_speed, MovementKind, MovementRecord, MovementService};
use crate::store::{ChangeSet, GameStore, IdKind};
use crate::types::{Faction, GameId, TaskForceId, UnitId};
use crate::unit::NavalUnit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// A group of one owner's ships sharing a hex.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskForce {
    pub id: TaskForceId,
    pub game_id: GameId,
    pub name: String,
    pub owner: Faction,
    pub position: Hex,
    pub members: BTreeSet<UnitId>,
    pub is_visible: bool,
    pub created_at: DateTime<Utc>,
}

impl TaskForce {
    pub fn contains(&self, unit_id: UnitId) -> bool {
        self.members.contains(&unit_id)
    }

    pub fn unit_ids(&self) -> Vec<UnitId> {
        self.members.iter().copied().collect()
    }
}

/// Creates, edits and moves task forces.
#[derive(Clone)]
pub struct TaskForceManager {
    store: Arc<dyn GameStore>,
    movement: MovementService,
}

impl TaskForceManager {
    pub fn new(movement: MovementService) -> Self {
        Self {
            store: movement.store().clone(),
            movement,
        }
    }

    pub fn movement(&self) -> &MovementService {
        &self.movement
    }

    pub fn get(&self, id: TaskForceId) -> CoreResult<TaskForce> {
        self.store
            .task_force(id)?
            .ok_or(CoreError::TaskForceNotFound(id))
    }

    pub fn task_forces(&self, game_id: &str) -> CoreResult<Vec<TaskForce>> {
        Ok(self.store.task_forces_by_game(game_id)?)
    }

    /// The task force a unit currently belongs to, if any.
    pub fn task_force_of(&self, unit_id: UnitId) -> CoreResult<Option<TaskForce>> {
        let unit = self.movement.load_unit(unit_id)?;
        Ok(self
            .store
            .task_forces_by_game(&unit.game_id)?
            .into_iter()
            .find(|tf| tf.contains(unit_id)))
    }

    /// Group units into a new task force at their shared hex.
    pub fn create_task_force(
        &self,
        game_id: &str,
        name: &str,
        owner: Faction,
        unit_ids: &[UnitId],
    ) -> CoreResult<TaskForce> {
        let members: BTreeSet<UnitId> = unit_ids.iter().copied().collect();
        let Some(&first) = members.iter().next() else {
            return Err(CoreError::EmptyTaskForce);
        };

        let existing = self.store.task_forces_by_game(game_id)?;
        for &unit_id in &members {
            if let Some(tf) = existing.iter().find(|tf| tf.contains(unit_id)) {
                return Err(CoreError::UnitAlreadyGrouped {
                    unit_id,
                    task_force_id: tf.id,
                });
            }
        }
        let position = self.movement.load_unit(first)?.position;
        for &unit_id in &members {
            let unit = self.movement.load_unit(unit_id)?;
            self.check_joinable(&unit, game_id, owner, position)?;
        }

        let task_force = TaskForce {
            id: self.store.next_id(IdKind::TaskForce)?,
            game_id: game_id.to_string(),
            name: name.to_string(),
            owner,
            position,
            members,
            is_visible: false,
            created_at: Utc::now(),
        };
        self.store.commit(ChangeSet {
            task_forces: vec![task_force.clone()],
            ..ChangeSet::default()
        })?;

        info!(
            task_force_id = task_force.id,
            game_id,
            units = task_force.members.len(),
            speed = self.effective_speed(task_force.id)?,
            "task force created"
        );
        self.movement.events().publish(GameEvent::TaskForceCreated {
            game_id: task_force.game_id.clone(),
            task_force_id: task_force.id,
            owner,
            name: task_force.name.clone(),
            unit_ids: task_force.unit_ids(),
        });
        Ok(task_force)
    }

    /// Add a unit at the task force's hex. Adding a current member is a no-op.
    pub fn add_unit(&self, id: TaskForceId, unit_id: UnitId) -> CoreResult<TaskForce> {
        let mut task_force = self.get(id)?;
        if task_force.contains(unit_id) {
            return Ok(task_force);
        }
        if let Some(other) = self.task_force_of(unit_id)? {
            return Err(CoreError::UnitAlreadyGrouped {
                unit_id,
                task_force_id: other.id,
            });
        }
        let unit = self.movement.load_unit(unit_id)?;
        self.check_joinable(&unit, &task_force.game_id, task_force.owner, task_force.position)?;

        task_force.members.insert(unit_id);
        self.store.commit(ChangeSet {
            task_forces: vec![task_force.clone()],
            ..ChangeSet::default()
        })?;
        debug!(task_force_id = id, unit_id, "unit joined task force");
        Ok(task_force)
    }

    /// Detach a unit. Removing the last member dissolves the task force and
    /// returns `None`.
    pub fn remove_unit(&self, id: TaskForceId, unit_id: UnitId) -> CoreResult<Option<TaskForce>> {
        let mut task_force = self.get(id)?;
        if !task_force.members.remove(&unit_id) {
            return Err(CoreError::UnitNotFound(unit_id));
        }

        if task_force.members.is_empty() {
            self.delete(&task_force)?;
            return Ok(None);
        }

        self.store.commit(ChangeSet {
            task_forces: vec![task_force.clone()],
            ..ChangeSet::default()
        })?;
        debug!(task_force_id = id, unit_id, "unit left task force");
        Ok(Some(task_force))
    }

    /// Break up a task force; its ships stay where they are.
    pub fn dissolve(&self, id: TaskForceId) -> CoreResult<()> {
        let task_force = self.get(id)?;
        self.delete(&task_force)
    }

    pub fn set_visibility(&self, id: TaskForceId, visible: bool) -> CoreResult<TaskForce> {
        let mut task_force = self.get(id)?;
        task_force.is_visible = visible;
        self.store.commit(ChangeSet {
            task_forces: vec![task_force.clone()],
            ..ChangeSet::default()
        })?;
        Ok(task_force)
    }

    /// Slowest member's speed, from current member state.
    pub fn effective_speed(&self, id: TaskForceId) -> CoreResult<u32> {
        let task_force = self.get(id)?;
        let game = self.movement.load_game(&task_force.game_id)?;
        let mut speed: Option<u32> = None;
        for unit in self.members(&task_force)? {
            let tracking = self.movement.tracking_for(&unit, game.turn)?;
            let unit_speed = effective_speed(&unit, &tracking);
            speed = Some(speed.map_or(unit_speed, |s| s.min(unit_speed)));
        }
        Ok(speed.unwrap_or(0))
    }

    /// One search factor for every member still able to search.
    pub fn total_search_factors(&self, id: TaskForceId) -> CoreResult<u32> {
        let task_force = self.get(id)?;
        Ok(self
            .members(&task_force)?
            .iter()
            .filter(|unit| unit.can_search())
            .count() as u32)
    }

    /// Move every member to `to` together.
    ///
    /// `speed` is the movement allowance requested for this move: `to` must lie
    /// within it and no member's route may be longer. Each member must also
    /// pass the same checks as a single-ship move (its own speed class, fuel,
    /// terrain). If any member fails, nothing moves and the error lists every
    /// failing member.
    pub fn move_task_force(
        &self,
        id: TaskForceId,
        to: Hex,
        speed: u32,
    ) -> CoreResult<Vec<MovementRecord>> {
        let mut task_force = self.get(id)?;
        let game = self.movement.load_game(&task_force.game_id)?;

        if to == task_force.position {
            return Err(CoreError::InvalidTarget(to));
        }
        if task_force.position.distance(&to) > speed {
            return Err(CoreError::MovementRestricted {
                reason: RestrictionReason::OutOfRange,
            });
        }

        let mut staged = Vec::new();
        let mut rejected = Vec::new();
        for unit in self.members(&task_force)? {
            let tracking = self.movement.tracking_for(&unit, game.turn)?;
            if unit.position != task_force.position {
                rejected.push((unit.id, CoreError::PositionMismatch(unit.id).to_string()));
                continue;
            }
            match self.movement.plan_move(&unit, &tracking, to, MovementKind::Normal) {
                Ok(plan) if plan.hexes() > speed => rejected.push((
                    unit.id,
                    CoreError::SpeedExceeded {
                        requested: plan.hexes(),
                        available: speed,
                    }
                    .to_string(),
                )),
                Ok(plan) => staged.push((unit, tracking, plan)),
                Err(err) => rejected.push((unit.id, err.to_string())),
            }
        }

        if !rejected.is_empty() {
            debug!(task_force_id = id, rejected = rejected.len(), "task force move rejected");
            return Err(CoreError::PartialMoveRejected { rejected });
        }

        let from = task_force.position;
        let mut changes = ChangeSet::new();
        let mut records = Vec::with_capacity(staged.len());
        for (unit, tracking, plan) in staged {
            let movement_id = self.store.next_id(IdKind::Movement)?;
            let (unit_changes, record) =
                self.movement
                    .stage_move(&game, unit, tracking, &plan, movement_id)?;
            changes.merge(unit_changes);
            records.push(record);
        }
        task_force.position = to;
        changes.task_forces.push(task_force.clone());
        self.store.commit(changes)?;

        info!(task_force_id = id, from = %from, to = %to, units = records.len(), "task force moved");
        self.movement.events().publish(GameEvent::TaskForceMoved {
            game_id: task_force.game_id.clone(),
            task_force_id: id,
            owner: task_force.owner,
            from,
            to,
            unit_ids: task_force.unit_ids(),
            turn: game.turn,
        });
        Ok(records)
    }

    fn members(&self, task_force: &TaskForce) -> CoreResult<Vec<NavalUnit>> {
        task_force
            .members
            .iter()
            .map(|&unit_id| self.movement.load_unit(unit_id))
            .collect()
    }

    fn check_joinable(
        &self,
        unit: &NavalUnit,
        game_id: &str,
        owner: Faction,
        position: Hex,
    ) -> CoreResult<()> {
        if unit.game_id != game_id {
            return Err(CoreError::UnitNotFound(unit.id));
        }
        if unit.owner != owner {
            return Err(CoreError::UnitOwnerMismatch(unit.id));
        }
        if unit.position != position {
            return Err(CoreError::PositionMismatch(unit.id));
        }
        Ok(())
    }

    fn delete(&self, task_force: &TaskForce) -> CoreResult<()> {
        self.store.commit(ChangeSet {
            deleted_task_forces: vec![task_force.id],
            ..ChangeSet::default()
        })?;
        info!(task_force_id = task_force.id, game_id = %task_force.game_id, "task force dissolved");
        self.movement.events().publish(GameEvent::TaskForceDissolved {
            game_id: task_force.game_id.clone(),
            task_force_id: task_force.id,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ShipCatalog;
    use crate::events::NullSink;
    use crate::fuel::FuelTracking;
    use crate::game::GameRecord;
    use crate::map::TerrainMap;
    use crate::store::MemoryStore;
    use crate::unit::UnitStatus;

    fn hex(label: &str) -> Hex {
        label.parse().unwrap()
    }

    fn setup(ships: &[(UnitId, &str, &str)]) -> (Arc<MemoryStore>, TaskForceManager) {
        let store = Arc::new(MemoryStore::new());
        let mut game = GameRecord::new("g1", "test");
        game.seat("raeder", Faction::German);
        game.seat("tovey", Faction::British);
        store.create_game(&game).unwrap();

        let catalog = ShipCatalog::builtin();
        for &(id, name, at) in ships {
            let unit = NavalUnit::from_spec(id, "g1".to_string(), catalog.get(name).unwrap(), hex(at));
            store.create_unit(&unit).unwrap();
        }
        let movement = MovementService::new(
            store.clone(),
            Arc::new(TerrainMap::open_sea(26, 30)),
            Arc::new(NullSink),
        );
        (store, TaskForceManager::new(movement))
    }

    #[test]
    fn test_create_requires_units() {
        let (_store, manager) = setup(&[]);
        assert_eq!(
            manager.create_task_force("g1", "empty", Faction::German, &[]),
            Err(CoreError::EmptyTaskForce)
        );
    }

    #[test]
    fn test_create_rejects_mixed_owners_and_positions() {
        let (_store, manager) = setup(&[
            (1, "Bismarck", "K15"),
            (2, "Hood", "K15"),
            (3, "Prinz Eugen", "K16"),
        ]);
        assert_eq!(
            manager.create_task_force("g1", "mixed", Faction::German, &[1, 2]),
            Err(CoreError::UnitOwnerMismatch(2))
        );
        assert_eq!(
            manager.create_task_force("g1", "spread", Faction::German, &[1, 3]),
            Err(CoreError::PositionMismatch(3))
        );
    }

    #[test]
    fn test_speed_is_slowest_member() {
        let (_store, manager) = setup(&[(1, "Bismarck", "K15"), (2, "Prinz Eugen", "K15")]);
        let tf = manager
            .create_task_force("g1", "Rheinübung", Faction::German, &[2])
            .unwrap();
        assert_eq!(manager.effective_speed(tf.id).unwrap(), 2);
        manager.add_unit(tf.id, 1).unwrap();
        assert_eq!(manager.effective_speed(tf.id).unwrap(), 1);
    }

    #[test]
    fn test_unit_cannot_join_two_task_forces() {
        let (_store, manager) = setup(&[(1, "Bismarck", "K15"), (2, "Prinz Eugen", "K15")]);
        let first = manager
            .create_task_force("g1", "one", Faction::German, &[1])
            .unwrap();
        let second = manager
            .create_task_force("g1", "two", Faction::German, &[2])
            .unwrap();
        assert_eq!(
            manager.add_unit(second.id, 1),
            Err(CoreError::UnitAlreadyGrouped {
                unit_id: 1,
                task_force_id: first.id
            })
        );
        assert_eq!(manager.task_force_of(1).unwrap().map(|tf| tf.id), Some(first.id));
    }

    #[test]
    fn test_search_factors_skip_sunk_and_repairing() {
        let (store, manager) = setup(&[
            (1, "King George V", "K15"),
            (2, "Rodney", "K15"),
            (3, "Norfolk", "K15"),
        ]);
        let tf = manager
            .create_task_force("g1", "Home Fleet", Faction::British, &[1, 2, 3])
            .unwrap();
        assert_eq!(manager.total_search_factors(tf.id).unwrap(), 3);

        let mut rodney = store.unit(2).unwrap().unwrap();
        rodney.set_status(UnitStatus::Repairing);
        store.update_unit(&rodney).unwrap();
        assert_eq!(manager.total_search_factors(tf.id).unwrap(), 2);
        assert_eq!(manager.effective_speed(tf.id).unwrap(), 0);
    }

    #[test]
    fn test_visibility_flag_and_dissolve() {
        let (_store, manager) = setup(&[(1, "Bismarck", "K15")]);
        let tf = manager
            .create_task_force("g1", "solo", Faction::German, &[1])
            .unwrap();
        assert!(!tf.is_visible);
        assert!(manager.set_visibility(tf.id, true).unwrap().is_visible);

        manager.dissolve(tf.id).unwrap();
        assert_eq!(manager.get(tf.id), Err(CoreError::TaskForceNotFound(tf.id)));
        assert_eq!(manager.task_force_of(1).unwrap(), None);
    }

    #[test]
    fn test_destination_beyond_requested_speed() {
        let (_store, manager) = setup(&[(1, "Bismarck", "K15"), (2, "Prinz Eugen", "K15")]);
        let tf = manager
            .create_task_force("g1", "Rheinübung", Faction::German, &[1, 2])
            .unwrap();
        assert_eq!(
            manager.move_task_force(tf.id, hex("K17"), 1),
            Err(CoreError::MovementRestricted {
                reason: RestrictionReason::OutOfRange
            })
        );

        // Within the requested speed, but beyond what the battleship can make
        match manager.move_task_force(tf.id, hex("K17"), 3) {
            Err(CoreError::PartialMoveRejected { rejected }) => {
                assert_eq!(rejected.len(), 1);
                assert_eq!(rejected[0].0, 1);
            }
            other => panic!("expected partial move rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_generous_speed_moves_when_every_member_can() {
        let (store, manager) = setup(&[(1, "Bismarck", "K15"), (2, "Gneisenau", "K15")]);
        for id in [1, 2] {
            let mut unit = store.unit(id).unwrap().unwrap();
            unit.fuel = 10;
            store.update_unit(&unit).unwrap();
        }
        let tf = manager
            .create_task_force("g1", "Rheinübung", Faction::German, &[1, 2])
            .unwrap();

        let records = manager.move_task_force(tf.id, hex("K16"), 3).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(manager.get(tf.id).unwrap().position, hex("K16"));
    }

    #[test]
    fn test_member_short_of_fuel_holds_everyone() {
        let (store, manager) = setup(&[(1, "Bismarck", "K15"), (2, "Gneisenau", "K15")]);
        let tf = manager
            .create_task_force("g1", "Rheinübung", Faction::German, &[1, 2])
            .unwrap();

        // A medium ship that steamed 1 hex last turn pays 1 FP for the next hex
        let mut bismarck = store.unit(1).unwrap().unwrap();
        bismarck.fuel = 0;
        store.update_unit(&bismarck).unwrap();
        store
            .commit(ChangeSet {
                fuel: vec![FuelTracking {
                    hexes_moved_previous_turn: 1,
                    ..FuelTracking::new(1, "g1".to_string(), 1)
                }],
                ..ChangeSet::default()
            })
            .unwrap();

        match manager.move_task_force(tf.id, hex("K16"), 3) {
            Err(CoreError::PartialMoveRejected { rejected }) => {
                assert_eq!(rejected.len(), 1);
                assert_eq!(rejected[0].0, 1);
            }
            other => panic!("expected partial move rejection, got {other:?}"),
        }
        assert_eq!(manager.get(tf.id).unwrap().position, hex("K15"));
        for id in [1, 2] {
            assert_eq!(store.unit(id).unwrap().unwrap().position, hex("K15"));
        }
        assert!(store.movements_by_game("g1").unwrap().is_empty());
    }

    #[test]
    fn test_grouped_unit_elsewhere_is_already_grouped() {
        let (_store, manager) = setup(&[(1, "Bismarck", "K15"), (2, "Prinz Eugen", "K16")]);
        let first = manager
            .create_task_force("g1", "one", Faction::German, &[1])
            .unwrap();
        let second = manager
            .create_task_force("g1", "two", Faction::German, &[2])
            .unwrap();

        let grouped = CoreError::UnitAlreadyGrouped {
            unit_id: 1,
            task_force_id: first.id,
        };
        assert_eq!(manager.add_unit(second.id, 1), Err(grouped.clone()));
        assert_eq!(
            manager.create_task_force("g1", "three", Faction::German, &[2, 1]),
            Err(grouped)
        );
    }

    #[test]
    fn test_straggler_blocks_whole_move() {
        let (store, manager) = setup(&[(1, "Bismarck", "K15"), (2, "Prinz Eugen", "K15")]);
        let tf = manager
            .create_task_force("g1", "Rheinübung", Faction::German, &[1, 2])
            .unwrap();

        let mut prinz = store.unit(2).unwrap().unwrap();
        prinz.position = hex("J15");
        store.update_unit(&prinz).unwrap();

        match manager.move_task_force(tf.id, hex("K16"), 1) {
            Err(CoreError::PartialMoveRejected { rejected }) => {
                assert_eq!(rejected.len(), 1);
                assert_eq!(rejected[0].0, 2);
            }
            other => panic!("expected partial move rejection, got {other:?}"),
        }
        assert_eq!(manager.get(tf.id).unwrap().position, hex("K15"));
        assert_eq!(store.unit(1).unwrap().unwrap().position, hex("K15"));
        assert!(store.movements_by_game("g1").unwrap().is_empty());
    }

    #[test]
    fn test_synchronized_move() {
        let (store, manager) = setup(&[(1, "Bismarck", "K15"), (2, "Prinz Eugen", "K15")]);
        let tf = manager
            .create_task_force("g1", "Rheinübung", Faction::German, &[1, 2])
            .unwrap();

        let records = manager.move_task_force(tf.id, hex("K16"), 1).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(manager.get(tf.id).unwrap().position, hex("K16"));
        for id in [1, 2] {
            assert_eq!(store.unit(id).unwrap().unwrap().position, hex("K16"));
        }
    }
}
