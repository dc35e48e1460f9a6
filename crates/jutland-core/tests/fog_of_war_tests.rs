//! Fog of war tests.
//!
//! Own units are always visible; enemy units only while sighted or
//! shadowed, and a lost contact leaves its last known hex behind.

use jutland_core::{
    Faction, GameSetup, GameStore, Hex, MemoryStore, MovementService, NullSink, ShipCatalog,
    SpecialRulesEngine, TerrainMap, UnitId, VisibilityLevel,
};
use std::sync::Arc;

fn hex(label: &str) -> Hex {
    label.parse().unwrap()
}

struct Fixture {
    store: Arc<MemoryStore>,
    movement: MovementService,
    bismarck: UnitId,
    hood: UnitId,
    suffolk: UnitId,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let setup = GameSetup::new(store.clone(), Arc::new(ShipCatalog::builtin()));
    setup.create_game("g1", "Denmark Strait").unwrap();
    setup.seat_player("g1", "lutjens", Faction::German).unwrap();
    setup.seat_player("g1", "holland", Faction::British).unwrap();
    setup.seat_player("g1", "wake-walker", Faction::British).unwrap();

    let mut rules = SpecialRulesEngine::new();
    let bismarck = setup.deploy_ship("g1", "Bismarck", hex("F6"), &mut rules).unwrap().id;
    let hood = setup.deploy_ship("g1", "Hood", hex("H9"), &mut rules).unwrap().id;
    let suffolk = setup.deploy_ship("g1", "Suffolk", hex("F8"), &mut rules).unwrap().id;

    let movement = MovementService::new(
        store.clone(),
        Arc::new(TerrainMap::open_sea(26, 30)),
        Arc::new(NullSink),
    );
    Fixture {
        store,
        movement,
        bismarck,
        hood,
        suffolk,
    }
}

#[test]
fn test_every_player_sees_own_side_as_sighted() {
    let fx = fixture();
    let visibility = fx.movement.visibility();

    for (observer, expected) in [
        ("lutjens", vec![fx.bismarck]),
        ("holland", vec![fx.hood, fx.suffolk]),
        ("wake-walker", vec![fx.hood, fx.suffolk]),
    ] {
        let visible = visibility.get_visible_units_for_player("g1", observer).unwrap();
        let ids: Vec<UnitId> = visible.iter().map(|v| v.unit_id).collect();
        assert_eq!(ids, expected, "observer {observer}");
        assert!(visible.iter().all(|v| v.level == VisibilityLevel::Sighted));
        assert!(visible.iter().all(|v| v.hull.is_some()));
    }
}

#[test]
fn test_own_units_stay_sighted_whatever_is_stored() {
    let fx = fixture();
    let visibility = fx.movement.visibility();
    visibility
        .update_visibility(fx.hood, "holland", VisibilityLevel::Unknown)
        .unwrap();

    let visible = visibility.get_visible_units_for_player("g1", "holland").unwrap();
    let hood = visible.iter().find(|v| v.unit_id == fx.hood).unwrap();
    assert_eq!(hood.level, VisibilityLevel::Sighted);
}

#[test]
fn test_shadower_follows_moves_others_do_not() {
    let fx = fixture();
    let visibility = fx.movement.visibility();
    visibility
        .update_visibility(fx.bismarck, "wake-walker", VisibilityLevel::Shadowed)
        .unwrap();

    fx.movement.execute_move(fx.bismarck, hex("F7")).unwrap();

    let shadowing = visibility
        .get_visible_units_for_player("g1", "wake-walker")
        .unwrap();
    let seen = shadowing.iter().find(|v| v.unit_id == fx.bismarck).unwrap();
    assert_eq!(seen.position, hex("F7"));
    assert_eq!(seen.level, VisibilityLevel::Shadowed);
    assert_eq!(seen.fuel, None);

    let blind = visibility.get_visible_units_for_player("g1", "holland").unwrap();
    assert!(blind.iter().all(|v| v.unit_id != fx.bismarck));
    let lost = visibility.get_last_known_positions("g1", "holland").unwrap();
    assert_eq!(lost.len(), 1);
    assert_eq!(lost[0].hex, hex("F6"));

    let record = fx.store.visibility(fx.bismarck, "wake-walker").unwrap().unwrap();
    assert_eq!(record.last_known_hex, Some(hex("F7")));
}

#[test]
fn test_shadow_downgrade_and_loss() {
    let fx = fixture();
    let visibility = fx.movement.visibility();
    visibility
        .update_visibility(fx.bismarck, "wake-walker", VisibilityLevel::Shadowed)
        .unwrap();
    visibility
        .update_visibility(fx.bismarck, "wake-walker", VisibilityLevel::Sighted)
        .unwrap();
    let visible = visibility
        .get_visible_units_for_player("g1", "wake-walker")
        .unwrap();
    assert!(visible
        .iter()
        .any(|v| v.unit_id == fx.bismarck && v.level == VisibilityLevel::Sighted));

    visibility
        .update_visibility(fx.bismarck, "wake-walker", VisibilityLevel::Unknown)
        .unwrap();
    let lost = visibility
        .get_last_known_positions("g1", "wake-walker")
        .unwrap();
    assert_eq!(lost[0].unit_id, fx.bismarck);
    assert_eq!(lost[0].hex, hex("F6"));
    assert!(lost[0].last_seen_at.is_some());
}
