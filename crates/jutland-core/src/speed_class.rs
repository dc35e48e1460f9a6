//! Speed-class movement rules.
//!
//! Every ship belongs to one of four speed classes. The class decides how far
//! the ship may steam in a turn, whether it must rest after moving, and how
//! much fuel a move burns. These functions are pure and must reproduce the
//! rulebook tables exactly.
//!
//! | class    | max hexes | rest turn | fuel for 1 hex         | fuel for 2 hexes          |
//! |----------|-----------|-----------|------------------------|---------------------------|
//! | Fast     | 2         | no        | 0                      | 1 if last turn ≤ 1, else 2 |
//! | Medium   | 1         | no        | 1 if last turn = 1, else 0 | -                     |
//! | Slow     | 1         | yes       | 0                      | -                         |
//! | VerySlow | 1         | yes       | 0                      | -                         |

use serde::{Deserialize, Serialize};

/// Speed class of a naval unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedClass {
    Fast,
    Medium,
    Slow,
    VerySlow,
}

impl SpeedClass {
    pub const ALL: [SpeedClass; 4] = [
        SpeedClass::Fast,
        SpeedClass::Medium,
        SpeedClass::Slow,
        SpeedClass::VerySlow,
    ];

    /// Maximum hexes a unit of this class may move in one turn.
    pub const fn max_movement_distance(&self) -> u32 {
        match self {
            SpeedClass::Fast => 2,
            SpeedClass::Medium | SpeedClass::Slow | SpeedClass::VerySlow => 1,
        }
    }

    /// Slow ships must rest for a turn after every turn they moved.
    pub const fn can_move_this_turn(&self, hexes_moved_previous_turn: u32) -> bool {
        match self {
            SpeedClass::Fast | SpeedClass::Medium => true,
            SpeedClass::Slow | SpeedClass::VerySlow => hexes_moved_previous_turn == 0,
        }
    }

    /// Fuel points burned by moving `hexes_to_move` hexes this turn.
    pub const fn fuel_cost(&self, hexes_to_move: u32, hexes_moved_previous_turn: u32) -> u32 {
        match self {
            SpeedClass::Fast => match hexes_to_move {
                0 | 1 => 0,
                _ => {
                    if hexes_moved_previous_turn <= 1 {
                        1
                    } else {
                        2
                    }
                }
            },
            SpeedClass::Medium => {
                if hexes_to_move == 1 && hexes_moved_previous_turn == 1 {
                    1
                } else {
                    0
                }
            }
            SpeedClass::Slow | SpeedClass::VerySlow => 0,
        }
    }
}

/// Free-function form of [`SpeedClass::max_movement_distance`].
pub const fn max_movement_distance(class: SpeedClass) -> u32 {
    class.max_movement_distance()
}

/// Free-function form of [`SpeedClass::can_move_this_turn`].
pub const fn can_move_this_turn(class: SpeedClass, hexes_moved_previous_turn: u32) -> bool {
    class.can_move_this_turn(hexes_moved_previous_turn)
}

/// Free-function form of [`SpeedClass::fuel_cost`].
pub const fn fuel_cost(class: SpeedClass, hexes_to_move: u32, hexes_moved_previous_turn: u32) -> u32 {
    class.fuel_cost(hexes_to_move, hexes_moved_previous_turn)
}
