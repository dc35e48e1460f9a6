//! Persistence contract for the game-state core.
//!
//! The core only needs create / read-by-game / read-by-id / update for each
//! record kind. Every mutation a service performs is collected into a
//! [`ChangeSet`] and handed to [`GameStore::commit`], which applies it as one
//! unit of work.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::fuel::FuelTracking;
use crate::game::{GameRecord, SearchRecord};
use crate::movement::MovementRecord;
use crate::task_force::TaskForce;
use crate::types::{AirUnitId, MovementId, SearchId, TaskForceId, UnitId};
use crate::unit::{AirUnit, NavalUnit};
use crate::visibility::VisibilityRecord;

/// Id sequences handed out by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdKind {
    Unit,
    AirUnit,
    TaskForce,
    Movement,
    Search,
}

impl IdKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            IdKind::Unit => "unit",
            IdKind::AirUnit => "air_unit",
            IdKind::TaskForce => "task_force",
            IdKind::Movement => "movement",
            IdKind::Search => "search",
        }
    }
}

/// Writes belonging to one logical operation.
#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    pub units: Vec<NavalUnit>,
    pub air_units: Vec<AirUnit>,
    pub fuel: Vec<FuelTracking>,
    pub movements: Vec<MovementRecord>,
    pub task_forces: Vec<TaskForce>,
    pub deleted_task_forces: Vec<TaskForceId>,
    pub visibility: Vec<VisibilityRecord>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
            && self.air_units.is_empty()
            && self.fuel.is_empty()
            && self.movements.is_empty()
            && self.task_forces.is_empty()
            && self.deleted_task_forces.is_empty()
            && self.visibility.is_empty()
    }

    /// Fold another change set into this one, keeping write order.
    pub fn merge(&mut self, other: ChangeSet) {
        self.units.extend(other.units);
        self.air_units.extend(other.air_units);
        self.fuel.extend(other.fuel);
        self.movements.extend(other.movements);
        self.task_forces.extend(other.task_forces);
        self.deleted_task_forces.extend(other.deleted_task_forces);
        self.visibility.extend(other.visibility);
    }
}

/// Storage backend behind the core services.
///
/// Implementations must apply a [`ChangeSet`] atomically: either every write
/// lands or none does.
pub trait GameStore: Send + Sync {
    fn next_id(&self, kind: IdKind) -> Result<u64, StoreError>;

    fn create_game(&self, game: &GameRecord) -> Result<(), StoreError>;
    fn game(&self, id: &str) -> Result<Option<GameRecord>, StoreError>;
    fn update_game(&self, game: &GameRecord) -> Result<(), StoreError>;

    fn create_unit(&self, unit: &NavalUnit) -> Result<(), StoreError>;
    fn unit(&self, id: UnitId) -> Result<Option<NavalUnit>, StoreError>;
    fn units_by_game(&self, game_id: &str) -> Result<Vec<NavalUnit>, StoreError>;

    fn create_air_unit(&self, unit: &AirUnit) -> Result<(), StoreError>;
    fn air_unit(&self, id: AirUnitId) -> Result<Option<AirUnit>, StoreError>;
    fn air_units_by_game(&self, game_id: &str) -> Result<Vec<AirUnit>, StoreError>;

    fn task_force(&self, id: TaskForceId) -> Result<Option<TaskForce>, StoreError>;
    fn task_forces_by_game(&self, game_id: &str) -> Result<Vec<TaskForce>, StoreError>;

    fn movement(&self, id: MovementId) -> Result<Option<MovementRecord>, StoreError>;
    fn movements_by_game(&self, game_id: &str) -> Result<Vec<MovementRecord>, StoreError>;

    fn create_search(&self, search: &SearchRecord) -> Result<(), StoreError>;
    fn search(&self, id: SearchId) -> Result<Option<SearchRecord>, StoreError>;
    fn searches_by_game(&self, game_id: &str) -> Result<Vec<SearchRecord>, StoreError>;

    fn fuel_tracking(&self, unit_id: UnitId) -> Result<Option<FuelTracking>, StoreError>;
    fn fuel_tracking_by_game(&self, game_id: &str) -> Result<Vec<FuelTracking>, StoreError>;

    fn visibility(&self, unit_id: UnitId, observer: &str) -> Result<Option<VisibilityRecord>, StoreError>;
    fn visibility_by_observer(
        &self,
        game_id: &str,
        observer: &str,
    ) -> Result<Vec<VisibilityRecord>, StoreError>;

    /// Apply every write of `changes` as one unit of work.
    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError>;

    fn update_unit(&self, unit: &NavalUnit) -> Result<(), StoreError> {
        self.commit(ChangeSet {
            units: vec![unit.clone()],
            ..ChangeSet::default()
        })
    }

    fn update_air_unit(&self, unit: &AirUnit) -> Result<(), StoreError> {
        self.commit(ChangeSet {
            air_units: vec![unit.clone()],
            ..ChangeSet::default()
        })
    }
}
