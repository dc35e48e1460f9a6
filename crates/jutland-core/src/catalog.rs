//! Static ship catalog.
//!
//! Per-ship base statistics and declared special rules. The catalog is loaded
//! once at startup, either the built-in order of battle or a TOML file, and is
//! only ever read afterwards: to seed new units and to register special rules.

use crate::special_rules::SpecialRuleType;
use crate::speed_class::SpeedClass;
use crate::types::Faction;
use crate::unit::ShipType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Base statistics for one named ship or flotilla.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipSpec {
    pub name: String,
    pub ship_type: ShipType,
    pub faction: Faction,
    /// Overrides the type's default speed class when set.
    #[serde(default)]
    pub speed_class: Option<SpeedClass>,
    #[serde(default)]
    pub evasion: u32,
    #[serde(default)]
    pub primary_bow: u32,
    #[serde(default)]
    pub primary_stern: u32,
    #[serde(default)]
    pub secondary: u32,
    #[serde(default)]
    pub torpedoes: u32,
    pub max_fuel: u32,
    pub hull_boxes: u32,
    #[serde(default)]
    pub radar: u32,
    #[serde(default)]
    pub special_rules: Vec<SpecialRuleType>,
}

impl ShipSpec {
    pub fn speed_class(&self) -> SpeedClass {
        self.speed_class
            .unwrap_or_else(|| self.ship_type.default_speed_class())
    }
}

/// Errors while loading a catalog file.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate ship `{0}` in catalog")]
    Duplicate(String),
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "ship")]
    ships: Vec<ShipSpec>,
}

/// Read-only lookup of ship specs by name.
#[derive(Clone, Debug, Default)]
pub struct ShipCatalog {
    ships: HashMap<String, ShipSpec>,
}

impl ShipCatalog {
    fn from_specs(specs: Vec<ShipSpec>) -> Result<Self, CatalogError> {
        let mut ships = HashMap::with_capacity(specs.len());
        for spec in specs {
            if ships.contains_key(&spec.name) {
                return Err(CatalogError::Duplicate(spec.name));
            }
            ships.insert(spec.name.clone(), spec);
        }
        Ok(Self { ships })
    }

    /// Parse a catalog from TOML made of `[[ship]]` tables.
    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::from_specs(file.ships)
    }

    /// Load a catalog file from disk.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_toml_str(&content)?;
        info!(path = %path.display(), ships = catalog.len(), "loaded ship catalog");
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&ShipSpec> {
        self.ships.get(name)
    }

    pub fn len(&self) -> usize {
        self.ships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ships.is_empty()
    }

    /// Ship names for one side, sorted.
    pub fn names_for(&self, faction: Faction) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .ships
            .values()
            .filter(|s| s.faction == faction)
            .map(|s| s.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// The May 1941 Atlantic order of battle.
    pub fn builtin() -> Self {
        use ShipType::*;
        use SpecialRuleType::*;

        #[allow(clippy::too_many_arguments)]
        fn ship(
            name: &str,
            ship_type: ShipType,
            faction: Faction,
            evasion: u32,
            armament: (u32, u32, u32, u32),
            max_fuel: u32,
            hull_boxes: u32,
            radar: u32,
            special_rules: Vec<SpecialRuleType>,
        ) -> ShipSpec {
            let (primary_bow, primary_stern, secondary, torpedoes) = armament;
            ShipSpec {
                name: name.to_string(),
                ship_type,
                faction,
                speed_class: None,
                evasion,
                primary_bow,
                primary_stern,
                secondary,
                torpedoes,
                max_fuel,
                hull_boxes,
                radar,
                special_rules,
            }
        }

        let german = Faction::German;
        let british = Faction::British;
        let specs = vec![
            ship("Bismarck", Battleship, german, 2, (4, 4, 3, 0), 20, 12, 2, vec![RadarLossAfterFirstRound]),
            ShipSpec {
                speed_class: Some(SpeedClass::Fast),
                ..ship("Gneisenau", Battleship, german, 2, (3, 2, 2, 0), 18, 10, 1, vec![])
            },
            ship("Prinz Eugen", HeavyCruiser, german, 3, (2, 2, 1, 4), 14, 6, 2, vec![]),
            ship("6th Destroyer Flotilla", DestroyerFlotilla, german, 4, (1, 0, 0, 8), 8, 3, 0, vec![]),
            ship("Weissenburg", Tanker, german, 1, (0, 0, 0, 0), 30, 3, 0, vec![]),
            ship("Vorpostenboot 1", CoastGuard, german, 1, (0, 0, 1, 0), 6, 2, 0, vec![]),
            ship("Hood", Battlecruiser, british, 2, (4, 4, 2, 0), 16, 9, 1, vec![NoMainGunsAtExtremeRange]),
            ship("Prince of Wales", Battleship, british, 2, (5, 5, 3, 0), 18, 11, 2, vec![UnreliableMainArmament]),
            ship("King George V", Battleship, british, 2, (5, 5, 3, 0), 18, 11, 2, vec![]),
            ship("Rodney", Battleship, british, 1, (6, 4, 2, 2), 16, 12, 1, vec![SternGunsInitialPhaseOnly]),
            ship("Ark Royal", Carrier, british, 2, (0, 0, 2, 0), 18, 7, 1, vec![]),
            ship("Victorious", Carrier, british, 2, (0, 0, 2, 0), 18, 7, 1, vec![]),
            ship("Norfolk", HeavyCruiser, british, 3, (2, 2, 1, 2), 14, 6, 2, vec![]),
            ship("Suffolk", HeavyCruiser, british, 3, (2, 2, 1, 2), 14, 6, 3, vec![]),
            ship("Sheffield", LightCruiser, british, 3, (2, 1, 1, 2), 12, 5, 2, vec![]),
            ship("4th Destroyer Flotilla", DestroyerFlotilla, british, 4, (1, 0, 0, 8), 8, 3, 0, vec![]),
        ];

        // Names in the built-in list are unique
        let ships = specs.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self { ships }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = ShipCatalog::builtin();
        let rodney = catalog.get("Rodney").unwrap();
        assert_eq!(rodney.speed_class(), SpeedClass::Medium);
        assert_eq!(rodney.special_rules, vec![SpecialRuleType::SternGunsInitialPhaseOnly]);
        assert!(catalog.names_for(Faction::German).contains(&"Bismarck"));
        assert!(!catalog.names_for(Faction::German).contains(&"Hood"));

        let gneisenau = catalog.get("Gneisenau").unwrap();
        assert_eq!(gneisenau.ship_type, ShipType::Battleship);
        assert_eq!(gneisenau.speed_class(), SpeedClass::Fast);
        assert_eq!(catalog.get("Bismarck").unwrap().speed_class(), SpeedClass::Medium);
    }

    #[test]
    fn test_toml_catalog_with_override() {
        let content = r#"
            [[ship]]
            name = "Scharnhorst"
            ship_type = "battleship"
            faction = "german"
            speed_class = "fast"
            primary_bow = 3
            primary_stern = 2
            max_fuel = 18
            hull_boxes = 10
            special_rules = ["radar_loss_after_first_round"]
        "#;
        let catalog = ShipCatalog::from_toml_str(content).unwrap();
        let spec = catalog.get("Scharnhorst").unwrap();
        assert_eq!(spec.speed_class(), SpeedClass::Fast);
        assert_eq!(spec.secondary, 0);
        assert_eq!(spec.special_rules, vec![SpecialRuleType::RadarLossAfterFirstRound]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let content = r#"
            [[ship]]
            name = "Hood"
            ship_type = "battlecruiser"
            faction = "british"
            max_fuel = 16
            hull_boxes = 9

            [[ship]]
            name = "Hood"
            ship_type = "battlecruiser"
            faction = "british"
            max_fuel = 16
            hull_boxes = 9
        "#;
        assert!(matches!(
            ShipCatalog::from_toml_str(content),
            Err(CatalogError::Duplicate(name)) if name == "Hood"
        ));
    }
}
