//! A* routing for ships on the hex map.
//!
//! Every sea hex costs one step. Hexes a unit may not enter (land, off-map,
//! boundary lines, convoy lanes for tankers) are impassable for that unit.

use crate::error::RestrictionReason;
use crate::hex::Hex;
use crate::map::TerrainMap;
use crate::unit::NavalUnit;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Node in the A* priority queue.
#[derive(Clone, Eq, PartialEq)]
struct PathNode {
    hex: Hex,
    g_cost: u32,
    f_cost: u32,
}

impl Ord for PathNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap; ties broken on hex for deterministic routes
        other
            .f_cost
            .cmp(&self.f_cost)
            .then_with(|| other.g_cost.cmp(&self.g_cost))
            .then_with(|| other.hex.cmp(&self.hex))
    }
}

impl PartialOrd for PathNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Route `unit` from its position to `goal` in at most `max_steps` hexes.
///
/// The returned path starts at the unit's position and ends at `goal`. When
/// no route exists, the error names the restriction that blocked it.
pub fn find_route(
    map: &TerrainMap,
    unit: &NavalUnit,
    goal: Hex,
    max_steps: u32,
) -> Result<Vec<Hex>, RestrictionReason> {
    let start = unit.position;
    if let Some(reason) = map.restriction_for(unit, &goal) {
        return Err(reason);
    }
    if start == goal {
        return Ok(vec![start]);
    }
    if start.distance(&goal) > max_steps {
        return Err(RestrictionReason::OutOfRange);
    }

    let mut open_set = BinaryHeap::new();
    let mut came_from: HashMap<Hex, Hex> = HashMap::new();
    let mut g_scores: HashMap<Hex, u32> = HashMap::new();
    let mut blocked_by: Option<RestrictionReason> = None;

    g_scores.insert(start, 0);
    open_set.push(PathNode {
        hex: start,
        g_cost: 0,
        f_cost: start.distance(&goal),
    });

    while let Some(current) = open_set.pop() {
        if current.hex == goal {
            return Ok(reconstruct_path(&came_from, start, goal));
        }
        if current.g_cost >= max_steps {
            continue;
        }

        for neighbor in current.hex.neighbors() {
            if let Some(reason) = map.restriction_for(unit, &neighbor) {
                blocked_by.get_or_insert(reason);
                continue;
            }

            let tentative_g = current.g_cost + 1;
            if tentative_g >= *g_scores.get(&neighbor).unwrap_or(&u32::MAX) {
                continue;
            }

            came_from.insert(neighbor, current.hex);
            g_scores.insert(neighbor, tentative_g);
            open_set.push(PathNode {
                hex: neighbor,
                g_cost: tentative_g,
                f_cost: tentative_g + neighbor.distance(&goal),
            });
        }
    }

    Err(blocked_by.unwrap_or(RestrictionReason::OutOfRange))
}

/// Every hex `unit` can reach within `max_steps`, with the steps needed.
///
/// The unit's own hex is not included.
pub fn find_reachable(map: &TerrainMap, unit: &NavalUnit, max_steps: u32) -> HashMap<Hex, u32> {
    let start = unit.position;
    let mut reachable: HashMap<Hex, u32> = HashMap::new();
    let mut frontier = vec![start];
    reachable.insert(start, 0);

    // Uniform step cost, so a breadth-first sweep is exact
    for step in 1..=max_steps {
        let mut next = Vec::new();
        for hex in frontier {
            for neighbor in hex.neighbors() {
                if reachable.contains_key(&neighbor) || map.restriction_for(unit, &neighbor).is_some() {
                    continue;
                }
                reachable.insert(neighbor, step);
                next.push(neighbor);
            }
        }
        frontier = next;
    }

    reachable.remove(&start);
    reachable
}

fn reconstruct_path(came_from: &HashMap<Hex, Hex>, start: Hex, goal: Hex) -> Vec<Hex> {
    let mut path = vec![goal];
    let mut current = goal;
    while current != start {
        match came_from.get(&current) {
            Some(&prev) => {
                path.push(prev);
                current = prev;
            }
            None => break,
        }
    }
    path.reverse();
    path
}
