//! Hex coordinates for the operations map.
//!
//! Hexes are addressed the way the paper map labels them: a column letter
//! followed by a row number (`"K15"`). Columns run `A`..=`Z`, rows start at 1.
//! Odd columns sit half a hex lower than even ones ("odd-q" offset layout).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Highest row number a hex label may carry.
pub const MAX_ROW: u16 = 99;

/// Number of addressable columns (`A`..=`Z`).
pub const MAX_COLUMNS: u8 = 26;

/// A single cell of the hex map.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Hex {
    col: u8,
    row: u16,
}

impl PartialOrd for Hex {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hex {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Row-major so iteration over hex sets is stable
        (self.row, self.col).cmp(&(other.row, other.col))
    }
}

impl Hex {
    /// Build a hex from a zero-based column index and a one-based row.
    ///
    /// Returns `None` when either coordinate falls outside the labelled range.
    pub fn new(col: u8, row: u16) -> Option<Self> {
        if col < MAX_COLUMNS && (1..=MAX_ROW).contains(&row) {
            Some(Self { col, row })
        } else {
            None
        }
    }

    /// Zero-based column index (`A` = 0).
    pub fn col(&self) -> u8 {
        self.col
    }

    /// One-based row number.
    pub fn row(&self) -> u16 {
        self.row
    }

    /// Column letter as printed on the map.
    pub fn col_letter(&self) -> char {
        (b'A' + self.col) as char
    }

    fn from_offset(q: i32, r: i32) -> Option<Self> {
        if q < 0 || r < 1 || q >= MAX_COLUMNS as i32 || r > MAX_ROW as i32 {
            return None;
        }
        Some(Self {
            col: q as u8,
            row: r as u16,
        })
    }

    /// Neighbouring hexes that exist on the labelled grid.
    ///
    /// Order is NE, SE, S, SW, NW, N; hexes that would fall off the grid are skipped.
    pub fn neighbors(&self) -> Vec<Hex> {
        let q = self.col as i32;
        let r = self.row as i32;
        let shift = if q & 1 == 0 { 0 } else { 1 };

        [
            (q + 1, r - 1 + shift),
            (q + 1, r + shift),
            (q, r + 1),
            (q - 1, r + shift),
            (q - 1, r - 1 + shift),
            (q, r - 1),
        ]
        .into_iter()
        .filter_map(|(q, r)| Hex::from_offset(q, r))
        .collect()
    }

    fn to_cube(self) -> (i32, i32, i32) {
        let x = self.col as i32;
        let z = self.row as i32 - (x - (x & 1)) / 2;
        (x, -x - z, z)
    }

    /// Distance in hex steps.
    pub fn distance(&self, other: &Hex) -> u32 {
        let (x1, y1, z1) = self.to_cube();
        let (x2, y2, z2) = other.to_cube();
        (x1 - x2).abs().max((y1 - y2).abs()).max((z1 - z2).abs()) as u32
    }

    /// True when `other` shares an edge with this hex.
    pub fn is_adjacent(&self, other: &Hex) -> bool {
        self.distance(other) == 1
    }

    /// All hexes at most `radius` steps away, this hex included.
    pub fn within(&self, radius: u32) -> Vec<Hex> {
        let r = radius as i32;
        let mut result = Vec::new();
        for dq in -r..=r {
            // Offset rows drift by half a column per step, so widen the row window
            for dr in -(2 * r)..=(2 * r) {
                if let Some(candidate) = Hex::from_offset(self.col as i32 + dq, self.row as i32 + dr) {
                    if self.distance(&candidate) <= radius {
                        result.push(candidate);
                    }
                }
            }
        }
        result.sort();
        result
    }
}

impl fmt::Display for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.col_letter(), self.row)
    }
}

/// Error for labels that do not name a hex.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid hex label `{0}`")]
pub struct ParseHexError(pub String);

impl FromStr for Hex {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        let mut chars = label.chars();
        let letter = chars
            .next()
            .filter(|c| c.is_ascii_alphabetic())
            .ok_or_else(|| ParseHexError(s.to_string()))?;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ParseHexError(s.to_string()));
        }
        let row: u16 = digits.parse().map_err(|_| ParseHexError(s.to_string()))?;
        let col = letter.to_ascii_uppercase() as u8 - b'A';
        Hex::new(col, row).ok_or_else(|| ParseHexError(s.to_string()))
    }
}

impl Serialize for Hex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(label: &str) -> Hex {
        label.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let k15 = hex("K15");
        assert_eq!(k15.col(), 10);
        assert_eq!(k15.row(), 15);
        assert_eq!(k15.to_string(), "K15");
        assert_eq!(hex("a1").to_string(), "A1");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Hex>().is_err());
        assert!("K".parse::<Hex>().is_err());
        assert!("15".parse::<Hex>().is_err());
        assert!("K0".parse::<Hex>().is_err());
        assert!("K100".parse::<Hex>().is_err());
        assert!("K1a".parse::<Hex>().is_err());
    }

    #[test]
    fn test_vertical_neighbors() {
        assert_eq!(hex("K15").distance(&hex("K16")), 1);
        assert_eq!(hex("K15").distance(&hex("K17")), 2);
    }

    #[test]
    fn test_neighbors_are_adjacent() {
        let center = hex("K15");
        let neighbors = center.neighbors();
        assert_eq!(neighbors.len(), 6);
        for n in neighbors {
            assert!(center.is_adjacent(&n), "{} should touch {}", n, center);
        }
    }

    #[test]
    fn test_edge_hex_has_fewer_neighbors() {
        assert!(hex("A1").neighbors().len() < 6);
    }

    #[test]
    fn test_within_radius() {
        let center = hex("K15");
        assert_eq!(center.within(0), vec![center]);
        assert_eq!(center.within(1).len(), 7);
        assert_eq!(center.within(2).len(), 19);
    }

    #[test]
    fn test_serde_as_label() {
        let json = serde_json::to_string(&hex("C7")).unwrap();
        assert_eq!(json, "\"C7\"");
        let back: Hex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hex("C7"));
    }
}
