//! Creating games and putting forces on the map.

use crate::catalog::ShipCatalog;
use crate::error::{CoreError, CoreResult};
use crate::game::GameRecord;
use crate::hex::Hex;
use crate::special_rules::SpecialRulesEngine;
use crate::store::{GameStore, IdKind};
use crate::types::{AirUnitId, Faction};
use crate::unit::{AirUnit, AirUnitType, NavalUnit};
use std::sync::Arc;
use tracing::info;

/// Seeds games, seats and units from the read-only ship catalog.
#[derive(Clone)]
pub struct GameSetup {
    store: Arc<dyn GameStore>,
    catalog: Arc<ShipCatalog>,
}

impl GameSetup {
    pub fn new(store: Arc<dyn GameStore>, catalog: Arc<ShipCatalog>) -> Self {
        Self { store, catalog }
    }

    pub fn catalog(&self) -> &ShipCatalog {
        &self.catalog
    }

    pub fn create_game(&self, id: &str, name: &str) -> CoreResult<GameRecord> {
        let game = GameRecord::new(id, name);
        self.store.create_game(&game)?;
        info!(game_id = id, name, "game created");
        Ok(game)
    }

    /// Seat a player on one side. Re-seating a seated player is a no-op.
    pub fn seat_player(&self, game_id: &str, user_id: &str, faction: Faction) -> CoreResult<GameRecord> {
        let mut game = self
            .store
            .game(game_id)?
            .ok_or_else(|| CoreError::GameNotFound(game_id.to_string()))?;
        if game.seat(user_id, faction) {
            self.store.update_game(&game)?;
            info!(game_id, user_id, %faction, "player seated");
        }
        Ok(game)
    }

    /// Put a catalog ship on the map and declare its special rules.
    pub fn deploy_ship(
        &self,
        game_id: &str,
        ship_name: &str,
        position: Hex,
        rules: &mut SpecialRulesEngine,
    ) -> CoreResult<NavalUnit> {
        if self.store.game(game_id)?.is_none() {
            return Err(CoreError::GameNotFound(game_id.to_string()));
        }
        let spec = self
            .catalog
            .get(ship_name)
            .ok_or_else(|| CoreError::UnknownShip(ship_name.to_string()))?;

        let id = self.store.next_id(IdKind::Unit)?;
        let unit = NavalUnit::from_spec(id, game_id.to_string(), spec, position);
        self.store.create_unit(&unit)?;
        rules.register_from_catalog(id, spec);
        info!(unit_id = id, game_id, ship = ship_name, position = %position, "ship deployed");
        Ok(unit)
    }

    pub fn deploy_air_unit(
        &self,
        game_id: &str,
        air_type: AirUnitType,
        owner: Faction,
        home: Hex,
        max_speed: u32,
        endurance: u32,
    ) -> CoreResult<AirUnit> {
        if self.store.game(game_id)?.is_none() {
            return Err(CoreError::GameNotFound(game_id.to_string()));
        }
        let id: AirUnitId = self.store.next_id(IdKind::AirUnit)?;
        let unit = AirUnit::new(id, game_id.to_string(), air_type, owner, home, max_speed, endurance);
        self.store.create_air_unit(&unit)?;
        info!(air_unit_id = id, game_id, home = %home, "air unit deployed");
        Ok(unit)
    }
}
