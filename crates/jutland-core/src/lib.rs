//! Jutland Core Library
//!
//! Game-state core for a turn-based naval operations game on a hex map:
//! speed-class movement rules, fuel, task forces, fog of war and ship
//! special rules, behind a small persistence contract.
//!
//! # Design Principles
//!
//! - **No transport dependencies**: realtime delivery lives in `jutland-network`
//! - **All-or-nothing operations**: every service call commits one change set
//! - **Serializable**: all records round-trip through serde

// Map and coordinates
pub mod hex;
pub mod map;
pub mod pathfinding;
pub mod types;

// Units and rules
pub mod catalog;
pub mod fuel;
pub mod special_rules;
pub mod speed_class;
pub mod unit;

// Services
pub mod air;
pub mod movement;
pub mod setup;
pub mod task_force;
pub mod visibility;

// Games, events and storage
pub mod error;
pub mod events;
pub mod game;
pub mod store;

// Re-exports for convenience
pub use air::AirOperations;
pub use catalog::{CatalogError, ShipCatalog, ShipSpec};
pub use error::{CoreError, CoreResult, RestrictionReason, StoreError};
pub use events::{EventSink, GameEvent, NullSink, RecordingSink};
pub use fuel::{EmergencyFuelPolicy, FuelTracking};
pub use game::{GameRecord, PlayerSeat, SearchRecord};
pub use hex::{Hex, ParseHexError};
pub use map::{MapConfig, TerrainMap};
pub use movement::{
    effective_speed, AvailableMoves, MovementKind, MovementRecord, MovementService, PlannedMove,
};
pub use pathfinding::{find_reachable, find_route};
pub use setup::GameSetup;
pub use special_rules::{
    BattleContext, BattlePhase, RangeBand, RuleApplication, SpecialRule, SpecialRuleType,
    SpecialRulesEngine, TriggerHistory,
};
pub use speed_class::SpeedClass;
pub use store::{ChangeSet, GameStore, IdKind, MemoryStore, SqliteStore};
pub use task_force::{TaskForce, TaskForceManager};
pub use types::*;
pub use unit::{
    AirUnit, AirUnitStatus, AirUnitType, DamageRecord, NavalUnit, ShipType, UnitStatus,
};
pub use visibility::{
    LastKnownPosition, VisibilityEngine, VisibilityLevel, VisibilityRecord, VisibleUnit,
};
