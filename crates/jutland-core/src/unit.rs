//! Naval and air units.

use crate::catalog::ShipSpec;
use crate::error::{CoreError, CoreResult};
use crate::hex::Hex;
use crate::speed_class::SpeedClass;
use crate::types::{AirUnitId, Faction, GameId, Turn, UnitId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A ship or flotilla on the operations map.
///
/// Armament, evasion and radar come in pairs: a `base_*` value taken from the
/// ship catalog that never changes, and a current value that special rules and
/// damage modify. Current values are restored from the baseline when a rule's
/// condition lapses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavalUnit {
    pub id: UnitId,
    pub game_id: GameId,
    /// Ship or flotilla name, e.g. "Bismarck".
    pub name: String,
    pub ship_type: ShipType,
    pub owner: Faction,
    pub speed_class: SpeedClass,
    pub position: Hex,
    pub base_evasion: u32,
    pub evasion: u32,
    pub base_primary_bow: u32,
    pub primary_bow: u32,
    pub base_primary_stern: u32,
    pub primary_stern: u32,
    pub base_secondary: u32,
    pub secondary: u32,
    pub torpedoes: u32,
    pub fuel: u32,
    pub max_fuel: u32,
    pub hull_boxes: u32,
    pub hull: u32,
    pub base_radar: u32,
    pub radar: u32,
    pub status: UnitStatus,
    pub damage: Vec<DamageRecord>,
}

impl NavalUnit {
    /// Seed a fresh unit from its catalog entry.
    pub fn from_spec(id: UnitId, game_id: GameId, spec: &ShipSpec, position: Hex) -> Self {
        Self {
            id,
            game_id,
            name: spec.name.clone(),
            ship_type: spec.ship_type,
            owner: spec.faction,
            speed_class: spec.speed_class(),
            position,
            base_evasion: spec.evasion,
            evasion: spec.evasion,
            base_primary_bow: spec.primary_bow,
            primary_bow: spec.primary_bow,
            base_primary_stern: spec.primary_stern,
            primary_stern: spec.primary_stern,
            base_secondary: spec.secondary,
            secondary: spec.secondary,
            torpedoes: spec.torpedoes,
            fuel: spec.max_fuel,
            max_fuel: spec.max_fuel,
            hull_boxes: spec.hull_boxes,
            hull: spec.hull_boxes,
            base_radar: spec.radar,
            radar: spec.radar,
            status: UnitStatus::Active,
            damage: Vec::new(),
        }
    }

    /// Can the unit get under way at all?
    pub fn is_operational(&self) -> bool {
        !matches!(self.status, UnitStatus::Sunk | UnitStatus::Repairing)
    }

    /// Does the unit still contribute a search factor?
    pub fn can_search(&self) -> bool {
        matches!(
            self.status,
            UnitStatus::Active | UnitStatus::Damaged | UnitStatus::Hidden
        )
    }

    pub fn is_sunk(&self) -> bool {
        self.status == UnitStatus::Sunk
    }

    /// Record hull damage. The unit sinks exactly when its hull reaches zero.
    pub fn apply_damage(&mut self, boxes: u32, cause: impl Into<String>, turn: Turn) {
        if self.is_sunk() {
            return;
        }
        let inflicted = boxes.min(self.hull);
        self.hull -= inflicted;
        self.damage.push(DamageRecord {
            turn,
            hull_boxes: inflicted,
            cause: cause.into(),
            recorded_at: Utc::now(),
        });

        if self.hull == 0 {
            self.status = UnitStatus::Sunk;
        } else if inflicted > 0 && self.status == UnitStatus::Active {
            self.status = UnitStatus::Damaged;
        }
    }

    /// Restore hull boxes; sunk ships stay sunk.
    pub fn repair(&mut self, boxes: u32) {
        if self.is_sunk() {
            return;
        }
        self.hull = (self.hull + boxes).min(self.hull_boxes);
        if self.hull == self.hull_boxes && self.status == UnitStatus::Damaged {
            self.status = UnitStatus::Active;
        }
    }

    /// Change lifecycle status. A sunk unit cannot be revived this way.
    pub fn set_status(&mut self, status: UnitStatus) {
        if self.is_sunk() || status == UnitStatus::Sunk {
            return;
        }
        self.status = status;
    }

    /// Reset current values to their baselines at the end of an engagement.
    pub fn restore_baselines(&mut self) {
        self.evasion = self.base_evasion;
        self.primary_bow = self.base_primary_bow;
        self.primary_stern = self.base_primary_stern;
        self.secondary = self.base_secondary;
        self.radar = self.base_radar;
    }
}

/// Ship types in the naval order of battle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipType {
    Battleship,
    Battlecruiser,
    Carrier,
    HeavyCruiser,
    LightCruiser,
    DestroyerFlotilla,
    CoastGuard,
    Tanker,
}

impl ShipType {
    /// Speed class a ship of this type has unless its catalog entry overrides it.
    pub const fn default_speed_class(&self) -> SpeedClass {
        match self {
            ShipType::Battlecruiser
            | ShipType::Carrier
            | ShipType::HeavyCruiser
            | ShipType::LightCruiser
            | ShipType::DestroyerFlotilla => SpeedClass::Fast,
            ShipType::Battleship => SpeedClass::Medium,
            ShipType::CoastGuard => SpeedClass::Slow,
            ShipType::Tanker => SpeedClass::VerySlow,
        }
    }
}

/// Lifecycle status of a naval unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    #[default]
    Active,
    Damaged,
    Sunk,
    Repairing,
    Refueling,
    Hidden,
}

/// One entry of a unit's damage log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DamageRecord {
    pub turn: Turn,
    pub hull_boxes: u32,
    pub cause: String,
    pub recorded_at: DateTime<Utc>,
}

/// Air unit role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AirUnitType {
    Combat,
    Recon,
}

/// Lifecycle status of an air unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AirUnitStatus {
    Landing,
    Refit,
    #[default]
    Operational,
    OnRaid,
}

impl fmt::Display for AirUnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AirUnitStatus::Landing => "landing",
            AirUnitStatus::Refit => "refit",
            AirUnitStatus::Operational => "operational",
            AirUnitStatus::OnRaid => "on_raid",
        };
        f.write_str(name)
    }
}

/// A squadron flying from a carrier or an airfield.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AirUnit {
    pub id: AirUnitId,
    pub game_id: GameId,
    pub air_type: AirUnitType,
    pub owner: Faction,
    pub position: Hex,
    pub home: Hex,
    /// Hexes per air phase.
    pub max_speed: u32,
    /// Air phases aloft before it must land.
    pub endurance: u32,
    pub status: AirUnitStatus,
}

impl AirUnit {
    pub fn new(
        id: AirUnitId,
        game_id: GameId,
        air_type: AirUnitType,
        owner: Faction,
        home: Hex,
        max_speed: u32,
        endurance: u32,
    ) -> Self {
        Self {
            id,
            game_id,
            air_type,
            owner,
            position: home,
            home,
            max_speed,
            endurance,
            status: AirUnitStatus::Operational,
        }
    }

    /// Total reach in hexes.
    pub fn range(&self) -> u32 {
        self.endurance * self.max_speed
    }

    /// Send the squadron on a raid towards `target`.
    pub fn launch(&mut self, target: Hex) -> CoreResult<()> {
        self.expect_status(AirUnitStatus::Operational, "launch")?;
        self.position = target;
        self.status = AirUnitStatus::OnRaid;
        Ok(())
    }

    /// Recover the squadron at its home base.
    pub fn land(&mut self) -> CoreResult<()> {
        self.expect_status(AirUnitStatus::OnRaid, "land")?;
        self.position = self.home;
        self.status = AirUnitStatus::Landing;
        Ok(())
    }

    pub fn begin_refit(&mut self) -> CoreResult<()> {
        self.expect_status(AirUnitStatus::Landing, "refit")?;
        self.status = AirUnitStatus::Refit;
        Ok(())
    }

    pub fn complete_refit(&mut self) -> CoreResult<()> {
        self.expect_status(AirUnitStatus::Refit, "complete refit")?;
        self.status = AirUnitStatus::Operational;
        Ok(())
    }

    fn expect_status(&self, expected: AirUnitStatus, action: &'static str) -> CoreResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(CoreError::InvalidAirUnitTransition {
                unit_id: self.id,
                action,
                status: self.status.to_string(),
            })
        }
    }
}
