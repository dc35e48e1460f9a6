//! SQLite storage backend.
//!
//! Each record is stored whole as JSON in a `raw` column, next to the key
//! columns used for lookups.

use super::{ChangeSet, GameStore, IdKind};
use crate::error::StoreError;
use crate::fuel::FuelTracking;
use crate::game::{GameRecord, SearchRecord};
use crate::movement::MovementRecord;
use crate::task_force::TaskForce;
use crate::types::{AirUnitId, MovementId, SearchId, TaskForceId, UnitId};
use crate::unit::{AirUnit, NavalUnit};
use crate::visibility::VisibilityRecord;
use rusqlite::{params, Connection, OptionalExtension, Params};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Thread-safe SQLite store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sequences (
        kind TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS games (
        id TEXT PRIMARY KEY,
        raw TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS naval_units (
        id INTEGER PRIMARY KEY,
        game_id TEXT NOT NULL,
        raw TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS air_units (
        id INTEGER PRIMARY KEY,
        game_id TEXT NOT NULL,
        raw TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS task_forces (
        id INTEGER PRIMARY KEY,
        game_id TEXT NOT NULL,
        raw TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS movements (
        id INTEGER PRIMARY KEY,
        game_id TEXT NOT NULL,
        unit_id INTEGER NOT NULL,
        raw TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS searches (
        id INTEGER PRIMARY KEY,
        game_id TEXT NOT NULL,
        raw TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS fuel_tracking (
        unit_id INTEGER PRIMARY KEY,
        game_id TEXT NOT NULL,
        raw TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS visibility (
        unit_id INTEGER NOT NULL,
        observer TEXT NOT NULL,
        game_id TEXT NOT NULL,
        raw TEXT NOT NULL,
        PRIMARY KEY (unit_id, observer)
    )",
    "CREATE INDEX IF NOT EXISTS idx_naval_units_game_id ON naval_units(game_id)",
    "CREATE INDEX IF NOT EXISTS idx_air_units_game_id ON air_units(game_id)",
    "CREATE INDEX IF NOT EXISTS idx_task_forces_game_id ON task_forces(game_id)",
    "CREATE INDEX IF NOT EXISTS idx_movements_game_id ON movements(game_id)",
    "CREATE INDEX IF NOT EXISTS idx_searches_game_id ON searches(game_id)",
    "CREATE INDEX IF NOT EXISTS idx_fuel_tracking_game_id ON fuel_tracking(game_id)",
    "CREATE INDEX IF NOT EXISTS idx_visibility_observer ON visibility(game_id, observer)",
];

impl SqliteStore {
    /// Open a store backed by a private in-memory database.
    pub fn new_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Open (or create) a file-backed store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening game store");
        Self::from_connection(Connection::open(path)?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_db()?;
        Ok(store)
    }

    fn init_db(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        for statement in SCHEMA {
            conn.execute(statement, [])?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }
}

fn key(id: u64) -> i64 {
    id as i64
}

fn to_raw<T: Serialize>(value: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

fn fetch_one<T: DeserializeOwned>(
    conn: &Connection,
    sql: &str,
    params: impl Params,
) -> Result<Option<T>, StoreError> {
    let raw: Option<String> = conn.query_row(sql, params, |row| row.get(0)).optional()?;
    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

fn fetch_all<T: DeserializeOwned>(
    conn: &Connection,
    sql: &str,
    params: impl Params,
) -> Result<Vec<T>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
    let mut records = Vec::new();
    for raw in rows {
        records.push(serde_json::from_str(&raw?)?);
    }
    Ok(records)
}

fn require_updated(changed: usize, what: String) -> Result<(), StoreError> {
    if changed == 0 {
        Err(StoreError::NotFound(what))
    } else {
        Ok(())
    }
}

impl GameStore for SqliteStore {
    fn next_id(&self, kind: IdKind) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let value: i64 = conn.query_row(
            "INSERT INTO sequences (kind, value) VALUES (?1, 1)
             ON CONFLICT(kind) DO UPDATE SET value = value + 1
             RETURNING value",
            params![kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(value as u64)
    }

    fn create_game(&self, game: &GameRecord) -> Result<(), StoreError> {
        self.lock()?.execute(
            "INSERT OR REPLACE INTO games (id, raw) VALUES (?1, ?2)",
            params![game.id, to_raw(game)?],
        )?;
        Ok(())
    }

    fn game(&self, id: &str) -> Result<Option<GameRecord>, StoreError> {
        fetch_one(&*self.lock()?, "SELECT raw FROM games WHERE id = ?1", params![id])
    }

    fn update_game(&self, game: &GameRecord) -> Result<(), StoreError> {
        let changed = self.lock()?.execute(
            "UPDATE games SET raw = ?2 WHERE id = ?1",
            params![game.id, to_raw(game)?],
        )?;
        require_updated(changed, format!("game {}", game.id))
    }

    fn create_unit(&self, unit: &NavalUnit) -> Result<(), StoreError> {
        self.lock()?.execute(
            "INSERT OR REPLACE INTO naval_units (id, game_id, raw) VALUES (?1, ?2, ?3)",
            params![key(unit.id), unit.game_id, to_raw(unit)?],
        )?;
        Ok(())
    }

    fn unit(&self, id: UnitId) -> Result<Option<NavalUnit>, StoreError> {
        fetch_one(
            &*self.lock()?,
            "SELECT raw FROM naval_units WHERE id = ?1",
            params![key(id)],
        )
    }

    fn units_by_game(&self, game_id: &str) -> Result<Vec<NavalUnit>, StoreError> {
        fetch_all(
            &*self.lock()?,
            "SELECT raw FROM naval_units WHERE game_id = ?1 ORDER BY id",
            params![game_id],
        )
    }

    fn create_air_unit(&self, unit: &AirUnit) -> Result<(), StoreError> {
        self.lock()?.execute(
            "INSERT OR REPLACE INTO air_units (id, game_id, raw) VALUES (?1, ?2, ?3)",
            params![key(unit.id), unit.game_id, to_raw(unit)?],
        )?;
        Ok(())
    }

    fn air_unit(&self, id: AirUnitId) -> Result<Option<AirUnit>, StoreError> {
        fetch_one(
            &*self.lock()?,
            "SELECT raw FROM air_units WHERE id = ?1",
            params![key(id)],
        )
    }

    fn air_units_by_game(&self, game_id: &str) -> Result<Vec<AirUnit>, StoreError> {
        fetch_all(
            &*self.lock()?,
            "SELECT raw FROM air_units WHERE game_id = ?1 ORDER BY id",
            params![game_id],
        )
    }

    fn task_force(&self, id: TaskForceId) -> Result<Option<TaskForce>, StoreError> {
        fetch_one(
            &*self.lock()?,
            "SELECT raw FROM task_forces WHERE id = ?1",
            params![key(id)],
        )
    }

    fn task_forces_by_game(&self, game_id: &str) -> Result<Vec<TaskForce>, StoreError> {
        fetch_all(
            &*self.lock()?,
            "SELECT raw FROM task_forces WHERE game_id = ?1 ORDER BY id",
            params![game_id],
        )
    }

    fn movement(&self, id: MovementId) -> Result<Option<MovementRecord>, StoreError> {
        fetch_one(
            &*self.lock()?,
            "SELECT raw FROM movements WHERE id = ?1",
            params![key(id)],
        )
    }

    fn movements_by_game(&self, game_id: &str) -> Result<Vec<MovementRecord>, StoreError> {
        fetch_all(
            &*self.lock()?,
            "SELECT raw FROM movements WHERE game_id = ?1 ORDER BY id",
            params![game_id],
        )
    }

    fn create_search(&self, search: &SearchRecord) -> Result<(), StoreError> {
        self.lock()?.execute(
            "INSERT INTO searches (id, game_id, raw) VALUES (?1, ?2, ?3)",
            params![key(search.id), search.game_id, to_raw(search)?],
        )?;
        Ok(())
    }

    fn search(&self, id: SearchId) -> Result<Option<SearchRecord>, StoreError> {
        fetch_one(
            &*self.lock()?,
            "SELECT raw FROM searches WHERE id = ?1",
            params![key(id)],
        )
    }

    fn searches_by_game(&self, game_id: &str) -> Result<Vec<SearchRecord>, StoreError> {
        fetch_all(
            &*self.lock()?,
            "SELECT raw FROM searches WHERE game_id = ?1 ORDER BY id",
            params![game_id],
        )
    }

    fn fuel_tracking(&self, unit_id: UnitId) -> Result<Option<FuelTracking>, StoreError> {
        fetch_one(
            &*self.lock()?,
            "SELECT raw FROM fuel_tracking WHERE unit_id = ?1",
            params![key(unit_id)],
        )
    }

    fn fuel_tracking_by_game(&self, game_id: &str) -> Result<Vec<FuelTracking>, StoreError> {
        fetch_all(
            &*self.lock()?,
            "SELECT raw FROM fuel_tracking WHERE game_id = ?1 ORDER BY unit_id",
            params![game_id],
        )
    }

    fn visibility(
        &self,
        unit_id: UnitId,
        observer: &str,
    ) -> Result<Option<VisibilityRecord>, StoreError> {
        fetch_one(
            &*self.lock()?,
            "SELECT raw FROM visibility WHERE unit_id = ?1 AND observer = ?2",
            params![key(unit_id), observer],
        )
    }

    fn visibility_by_observer(
        &self,
        game_id: &str,
        observer: &str,
    ) -> Result<Vec<VisibilityRecord>, StoreError> {
        fetch_all(
            &*self.lock()?,
            "SELECT raw FROM visibility WHERE game_id = ?1 AND observer = ?2 ORDER BY unit_id",
            params![game_id, observer],
        )
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        // Dropping the transaction on any early return rolls it back
        let tx = conn.transaction()?;

        for unit in &changes.units {
            let changed = tx.execute(
                "UPDATE naval_units SET raw = ?2 WHERE id = ?1",
                params![key(unit.id), to_raw(unit)?],
            )?;
            require_updated(changed, format!("unit {}", unit.id))?;
        }
        for unit in &changes.air_units {
            let changed = tx.execute(
                "UPDATE air_units SET raw = ?2 WHERE id = ?1",
                params![key(unit.id), to_raw(unit)?],
            )?;
            require_updated(changed, format!("air unit {}", unit.id))?;
        }
        for tracking in &changes.fuel {
            tx.execute(
                "INSERT OR REPLACE INTO fuel_tracking (unit_id, game_id, raw) VALUES (?1, ?2, ?3)",
                params![key(tracking.unit_id), tracking.game_id, to_raw(tracking)?],
            )?;
        }
        for movement in &changes.movements {
            tx.execute(
                "INSERT INTO movements (id, game_id, unit_id, raw) VALUES (?1, ?2, ?3, ?4)",
                params![
                    key(movement.id),
                    movement.game_id,
                    key(movement.unit_id),
                    to_raw(movement)?
                ],
            )?;
        }
        for tf in &changes.task_forces {
            tx.execute(
                "INSERT OR REPLACE INTO task_forces (id, game_id, raw) VALUES (?1, ?2, ?3)",
                params![key(tf.id), tf.game_id, to_raw(tf)?],
            )?;
        }
        for id in &changes.deleted_task_forces {
            let changed = tx.execute("DELETE FROM task_forces WHERE id = ?1", params![key(*id)])?;
            require_updated(changed, format!("task force {id}"))?;
        }
        for record in &changes.visibility {
            tx.execute(
                "INSERT OR REPLACE INTO visibility (unit_id, observer, game_id, raw)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    key(record.unit_id),
                    record.observer,
                    record.game_id,
                    to_raw(record)?
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}
