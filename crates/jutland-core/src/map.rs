//! Operations map: playable area, land, convoy lanes and boundary lines.

use crate::error::RestrictionReason;
use crate::hex::{Hex, MAX_COLUMNS, MAX_ROW};
use crate::types::Faction;
use crate::unit::{NavalUnit, ShipType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Map description as it appears in configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Number of columns, starting at `A`.
    pub width: u8,
    /// Number of rows, starting at 1.
    pub height: u16,
    pub land: Vec<Hex>,
    pub convoy: Vec<Hex>,
    /// Hexes German destroyer flotillas may not enter.
    pub german_destroyer_boundary: Vec<Hex>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self::north_atlantic()
    }
}

impl MapConfig {
    /// The Denmark Strait to Brest theatre.
    pub fn north_atlantic() -> Self {
        fn hexes(labels: &[&str]) -> Vec<Hex> {
            labels.iter().filter_map(|l| l.parse().ok()).collect()
        }

        // Boundary runs down column T, keeping the flotillas in Norwegian waters
        let boundary: Vec<String> = (1..=30).map(|row| format!("T{}", row)).collect();
        let boundary: Vec<&str> = boundary.iter().map(String::as_str).collect();

        Self {
            width: 26,
            height: 30,
            land: hexes(&[
                // Greenland
                "A1", "A2", "A3", "A4", "B1", "B2", "B3", "C1", "C2",
                // Iceland
                "G3", "G4", "H3", "H4", "I3", "I4",
                // Faroes
                "N6",
                // Scotland and Ireland
                "P12", "P13", "Q11", "Q12", "Q13", "Q14", "O15", "O16", "P16",
                // Norway
                "X1", "X2", "X3", "Y1", "Y2", "Y3", "Y4", "Z1", "Z2", "Z3", "Z4", "Z5",
                // Brittany
                "R28", "R29", "S28", "S29", "S30",
            ]),
            convoy: hexes(&[
                "H20", "I20", "J21", "K21", "L22", "M22", "N22", "O21", "O20",
            ]),
            german_destroyer_boundary: hexes(&boundary),
        }
    }
}

/// Indexed form of [`MapConfig`] used for movement checks.
#[derive(Clone, Debug)]
pub struct TerrainMap {
    width: u8,
    height: u16,
    land: HashSet<Hex>,
    convoy: HashSet<Hex>,
    german_destroyer_boundary: HashSet<Hex>,
}

impl TerrainMap {
    pub fn new(config: &MapConfig) -> Self {
        Self {
            width: config.width.min(MAX_COLUMNS),
            height: config.height.min(MAX_ROW),
            land: config.land.iter().copied().collect(),
            convoy: config.convoy.iter().copied().collect(),
            german_destroyer_boundary: config.german_destroyer_boundary.iter().copied().collect(),
        }
    }

    /// An open-sea map with no land and no special hexes (useful for testing).
    pub fn open_sea(width: u8, height: u16) -> Self {
        Self::new(&MapConfig {
            width,
            height,
            land: Vec::new(),
            convoy: Vec::new(),
            german_destroyer_boundary: Vec::new(),
        })
    }

    pub fn in_bounds(&self, hex: &Hex) -> bool {
        hex.col() < self.width && hex.row() <= self.height
    }

    pub fn is_land(&self, hex: &Hex) -> bool {
        self.land.contains(hex)
    }

    pub fn is_convoy(&self, hex: &Hex) -> bool {
        self.convoy.contains(hex)
    }

    pub fn is_boundary(&self, hex: &Hex) -> bool {
        self.german_destroyer_boundary.contains(hex)
    }

    /// Sea hexes inside the playable area.
    pub fn is_navigable(&self, hex: &Hex) -> bool {
        self.in_bounds(hex) && !self.is_land(hex)
    }

    /// Reason `unit` may not enter `hex`, if any.
    pub fn restriction_for(&self, unit: &NavalUnit, hex: &Hex) -> Option<RestrictionReason> {
        if !self.is_navigable(hex) {
            return Some(if self.in_bounds(hex) {
                RestrictionReason::Land
            } else {
                RestrictionReason::OffMap
            });
        }
        if unit.ship_type == ShipType::DestroyerFlotilla
            && unit.owner == Faction::German
            && self.is_boundary(hex)
        {
            return Some(RestrictionReason::GermanDestroyerBoundary);
        }
        if unit.ship_type == ShipType::Tanker && self.is_convoy(hex) {
            return Some(RestrictionReason::TankerConvoyHex);
        }
        None
    }
}

impl Default for TerrainMap {
    fn default() -> Self {
        Self::new(&MapConfig::default())
    }
}
