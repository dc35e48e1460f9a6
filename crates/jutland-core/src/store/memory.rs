//! In-process store for tests and single-node deployments.

use super::{ChangeSet, GameStore, IdKind};
use crate::error::StoreError;
use crate::fuel::FuelTracking;
use crate::game::{GameRecord, SearchRecord};
use crate::movement::MovementRecord;
use crate::task_force::TaskForce;
use crate::types::{AirUnitId, GameId, MovementId, PlayerId, SearchId, TaskForceId, UnitId};
use crate::unit::{AirUnit, NavalUnit};
use crate::visibility::VisibilityRecord;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    sequences: HashMap<IdKind, u64>,
    games: HashMap<GameId, GameRecord>,
    units: BTreeMap<UnitId, NavalUnit>,
    air_units: BTreeMap<AirUnitId, AirUnit>,
    task_forces: BTreeMap<TaskForceId, TaskForce>,
    movements: BTreeMap<MovementId, MovementRecord>,
    searches: BTreeMap<SearchId, SearchRecord>,
    fuel: BTreeMap<UnitId, FuelTracking>,
    visibility: BTreeMap<(UnitId, PlayerId), VisibilityRecord>,
}

/// All tables behind one lock, so a commit is trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }
}

fn by_game<'a, T: Clone + 'a>(
    rows: impl Iterator<Item = &'a T>,
    game_id: &str,
    key: impl Fn(&T) -> &str,
) -> Vec<T> {
    rows.filter(|row| key(row) == game_id).cloned().collect()
}

impl GameStore for MemoryStore {
    fn next_id(&self, kind: IdKind) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        let next = tables.sequences.entry(kind).or_insert(0);
        *next += 1;
        Ok(*next)
    }

    fn create_game(&self, game: &GameRecord) -> Result<(), StoreError> {
        self.write()?.games.insert(game.id.clone(), game.clone());
        Ok(())
    }

    fn game(&self, id: &str) -> Result<Option<GameRecord>, StoreError> {
        Ok(self.read()?.games.get(id).cloned())
    }

    fn update_game(&self, game: &GameRecord) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        match tables.games.get_mut(&game.id) {
            Some(existing) => {
                *existing = game.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("game {}", game.id))),
        }
    }

    fn create_unit(&self, unit: &NavalUnit) -> Result<(), StoreError> {
        self.write()?.units.insert(unit.id, unit.clone());
        Ok(())
    }

    fn unit(&self, id: UnitId) -> Result<Option<NavalUnit>, StoreError> {
        Ok(self.read()?.units.get(&id).cloned())
    }

    fn units_by_game(&self, game_id: &str) -> Result<Vec<NavalUnit>, StoreError> {
        Ok(by_game(self.read()?.units.values(), game_id, |u| u.game_id.as_str()))
    }

    fn create_air_unit(&self, unit: &AirUnit) -> Result<(), StoreError> {
        self.write()?.air_units.insert(unit.id, unit.clone());
        Ok(())
    }

    fn air_unit(&self, id: AirUnitId) -> Result<Option<AirUnit>, StoreError> {
        Ok(self.read()?.air_units.get(&id).cloned())
    }

    fn air_units_by_game(&self, game_id: &str) -> Result<Vec<AirUnit>, StoreError> {
        Ok(by_game(self.read()?.air_units.values(), game_id, |u| u.game_id.as_str()))
    }

    fn task_force(&self, id: TaskForceId) -> Result<Option<TaskForce>, StoreError> {
        Ok(self.read()?.task_forces.get(&id).cloned())
    }

    fn task_forces_by_game(&self, game_id: &str) -> Result<Vec<TaskForce>, StoreError> {
        Ok(by_game(self.read()?.task_forces.values(), game_id, |tf| tf.game_id.as_str()))
    }

    fn movement(&self, id: MovementId) -> Result<Option<MovementRecord>, StoreError> {
        Ok(self.read()?.movements.get(&id).cloned())
    }

    fn movements_by_game(&self, game_id: &str) -> Result<Vec<MovementRecord>, StoreError> {
        Ok(by_game(self.read()?.movements.values(), game_id, |m| m.game_id.as_str()))
    }

    fn create_search(&self, search: &SearchRecord) -> Result<(), StoreError> {
        self.write()?.searches.insert(search.id, search.clone());
        Ok(())
    }

    fn search(&self, id: SearchId) -> Result<Option<SearchRecord>, StoreError> {
        Ok(self.read()?.searches.get(&id).cloned())
    }

    fn searches_by_game(&self, game_id: &str) -> Result<Vec<SearchRecord>, StoreError> {
        Ok(by_game(self.read()?.searches.values(), game_id, |s| s.game_id.as_str()))
    }

    fn fuel_tracking(&self, unit_id: UnitId) -> Result<Option<FuelTracking>, StoreError> {
        Ok(self.read()?.fuel.get(&unit_id).cloned())
    }

    fn fuel_tracking_by_game(&self, game_id: &str) -> Result<Vec<FuelTracking>, StoreError> {
        Ok(by_game(self.read()?.fuel.values(), game_id, |f| f.game_id.as_str()))
    }

    fn visibility(
        &self,
        unit_id: UnitId,
        observer: &str,
    ) -> Result<Option<VisibilityRecord>, StoreError> {
        Ok(self
            .read()?
            .visibility
            .get(&(unit_id, observer.to_string()))
            .cloned())
    }

    fn visibility_by_observer(
        &self,
        game_id: &str,
        observer: &str,
    ) -> Result<Vec<VisibilityRecord>, StoreError> {
        Ok(self
            .read()?
            .visibility
            .values()
            .filter(|v| v.game_id == game_id && v.observer == observer)
            .cloned()
            .collect())
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let mut tables = self.write()?;

        // Validate before touching anything so a failed commit leaves no trace
        for id in &changes.deleted_task_forces {
            let recreated = changes.task_forces.iter().any(|tf| tf.id == *id);
            if !tables.task_forces.contains_key(id) && !recreated {
                return Err(StoreError::NotFound(format!("task force {id}")));
            }
        }
        for unit in &changes.units {
            if !tables.units.contains_key(&unit.id) {
                return Err(StoreError::NotFound(format!("unit {}", unit.id)));
            }
        }
        for unit in &changes.air_units {
            if !tables.air_units.contains_key(&unit.id) {
                return Err(StoreError::NotFound(format!("air unit {}", unit.id)));
            }
        }

        for unit in changes.units {
            tables.units.insert(unit.id, unit);
        }
        for unit in changes.air_units {
            tables.air_units.insert(unit.id, unit);
        }
        for tracking in changes.fuel {
            tables.fuel.insert(tracking.unit_id, tracking);
        }
        for movement in changes.movements {
            tables.movements.insert(movement.id, movement);
        }
        for tf in changes.task_forces {
            tables.task_forces.insert(tf.id, tf);
        }
        for id in changes.deleted_task_forces {
            tables.task_forces.remove(&id);
        }
        for record in changes.visibility {
            tables
                .visibility
                .insert((record.unit_id, record.observer.clone()), record);
        }
        Ok(())
    }
}
