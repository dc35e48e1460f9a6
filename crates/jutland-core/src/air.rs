//! Air operations: raids, recovery and refit of squadrons.

use crate::error::{CoreError, CoreResult, RestrictionReason};
use crate::hex::Hex;
use crate::store::GameStore;
use crate::types::AirUnitId;
use crate::unit::AirUnit;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct AirOperations {
    store: Arc<dyn GameStore>,
}

impl AirOperations {
    pub fn new(store: Arc<dyn GameStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, id: AirUnitId) -> CoreResult<AirUnit> {
        self.store
            .air_unit(id)?
            .ok_or(CoreError::AirUnitNotFound(id))
    }

    pub fn air_units(&self, game_id: &str) -> CoreResult<Vec<AirUnit>> {
        Ok(self.store.air_units_by_game(game_id)?)
    }

    /// Launch a raid. The target must lie within the squadron's range of home.
    pub fn launch(&self, id: AirUnitId, target: Hex) -> CoreResult<AirUnit> {
        let mut unit = self.get(id)?;
        if unit.home.distance(&target) > unit.range() {
            return Err(CoreError::MovementRestricted {
                reason: RestrictionReason::OutOfRange,
            });
        }
        unit.launch(target)?;
        self.save(&unit, "launched")
    }

    pub fn land(&self, id: AirUnitId) -> CoreResult<AirUnit> {
        let mut unit = self.get(id)?;
        unit.land()?;
        self.save(&unit, "landed")
    }

    pub fn begin_refit(&self, id: AirUnitId) -> CoreResult<AirUnit> {
        let mut unit = self.get(id)?;
        unit.begin_refit()?;
        self.save(&unit, "refitting")
    }

    pub fn complete_refit(&self, id: AirUnitId) -> CoreResult<AirUnit> {
        let mut unit = self.get(id)?;
        unit.complete_refit()?;
        self.save(&unit, "operational")
    }

    fn save(&self, unit: &AirUnit, what: &str) -> CoreResult<AirUnit> {
        self.store.update_air_unit(unit)?;
        debug!(air_unit_id = unit.id, position = %unit.position, "air unit {what}");
        Ok(unit.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Faction;
    use crate::unit::{AirUnitStatus, AirUnitType};

    fn hex(label: &str) -> Hex {
        label.parse().unwrap()
    }

    fn setup() -> AirOperations {
        let store = Arc::new(MemoryStore::new());
        let swordfish = AirUnit::new(
            1,
            "g1".to_string(),
            AirUnitType::Combat,
            Faction::British,
            hex("K15"),
            2,
            2,
        );
        store.create_air_unit(&swordfish).unwrap();
        AirOperations::new(store)
    }

    #[test]
    fn test_raid_cycle() {
        let ops = setup();
        assert_eq!(ops.launch(1, hex("K18")).unwrap().status, AirUnitStatus::OnRaid);
        let landed = ops.land(1).unwrap();
        assert_eq!(landed.position, hex("K15"));
        ops.begin_refit(1).unwrap();
        assert_eq!(ops.complete_refit(1).unwrap().status, AirUnitStatus::Operational);
    }

    #[test]
    fn test_raid_beyond_range() {
        let ops = setup();
        assert_eq!(
            ops.launch(1, hex("K20")),
            Err(CoreError::MovementRestricted {
                reason: RestrictionReason::OutOfRange
            })
        );
        assert_eq!(ops.get(1).unwrap().status, AirUnitStatus::Operational);
    }

    #[test]
    fn test_cannot_land_without_raid() {
        let ops = setup();
        assert!(matches!(
            ops.land(1),
            Err(CoreError::InvalidAirUnitTransition { action: "land", .. })
        ));
        assert_eq!(ops.get(9), Err(CoreError::AirUnitNotFound(9)));
    }
}
