mod common;

use bevy::{math::UVec2, prelude::*};
use foundry_sim::{
    build_headless_app, despawn_unit, production::escalation_rate, remove_block, run_tick,
    FactoryCatalog, FactoryState, ItemKind, ItemLedger, Position, ResourceLedger, TeamId, Unit,
    UnitFactory, Velocity,
};

use common::{ensure_test_config, place_stocked, run, unit_count};

#[test]
fn fixture_catalog_is_loaded() {
    ensure_test_config();
    let app = build_headless_app();
    let catalog = app.world.resource::<FactoryCatalog>();
    assert!(catalog.path().is_some());
    assert_eq!(catalog.len(), 3);
}

#[test]
fn exact_stock_yields_exactly_one_unit() {
    ensure_test_config();
    let mut app = build_headless_app();
    let factory = place_stocked(&mut app, "test-factory", UVec2::new(3, 3), TeamId(1), 10);

    run(&mut app, 1000);

    assert_eq!(unit_count(&mut app), 1);
    let state = app.world.get::<FactoryState>(factory).expect("state");
    assert_eq!(state.outstanding, 1);
    assert_eq!(state.progress, 0.0);
    let ledger = app.world.get::<ItemLedger>(factory).expect("ledger");
    assert_eq!(ledger.get(ItemKind::Silicon), 0);

    // Nothing left to pay for the next cycle beyond its first share.
    run(&mut app, 1000);
    assert_eq!(unit_count(&mut app), 1);
}

#[test]
fn capped_factory_makes_no_progress() {
    ensure_test_config();
    let mut app = build_headless_app();
    let factory = place_stocked(&mut app, "single-factory", UVec2::ZERO, TeamId(1), 2);

    run(&mut app, 100);
    assert_eq!(unit_count(&mut app), 1);

    run(&mut app, 200);
    assert_eq!(unit_count(&mut app), 1);
    let state = app.world.get::<FactoryState>(factory).expect("state");
    assert_eq!(state.outstanding, 1);
    assert_eq!(state.progress, 0.0);
    assert_eq!(
        app.world
            .get::<ItemLedger>(factory)
            .expect("ledger")
            .get(ItemKind::Silicon),
        1
    );
}

#[test]
fn wave_factory_escalates_after_grace() {
    ensure_test_config();
    let mut app = build_headless_app();
    let factory = place_stocked(&mut app, "wave-factory", UVec2::new(10, 10), TeamId(2), 0);
    let config = app
        .world
        .resource::<FactoryCatalog>()
        .get("wave-factory")
        .expect("config");
    assert_eq!(config.grace_threshold(), 1500.0);

    run(&mut app, 1500);
    assert_eq!(
        app.world.get::<FactoryState>(factory).expect("state").progress,
        0.0
    );

    run(&mut app, 100);
    let state = app.world.get::<FactoryState>(factory).expect("state");
    assert_eq!(state.warmup, 1600.0);
    let expected_rate = 0.1 + 100.0 / 1_200_000.0;
    assert!((escalation_rate(&config, state.warmup) - expected_rate).abs() < 1e-6);
    assert!((state.progress - 10.004).abs() < 1e-2);

    run(&mut app, 900);
    assert_eq!(unit_count(&mut app), 1);
    let mut units = app.world.query::<(&Unit, &Position, &Velocity)>();
    let (unit, position, velocity) = units.single(&app.world);
    assert_eq!(unit.team, TeamId(2));
    assert_eq!(velocity.0, Vec2::new(0.0, 0.5));
    let centre = Vec2::new(84.0, 84.0);
    assert!((position.0 - centre).abs().max_element() <= 4.0);
    assert_eq!(
        app.world.get::<ItemLedger>(factory).expect("ledger").total(),
        0
    );
}

#[test]
fn outstanding_never_exceeds_cap_under_constant_supply() {
    ensure_test_config();
    let mut app = build_headless_app();
    let positions = [UVec2::new(0, 0), UVec2::new(5, 0), UVec2::new(10, 0)];
    let factories: Vec<Entity> = positions
        .iter()
        .map(|position| place_stocked(&mut app, "single-factory", *position, TeamId(1), 2))
        .collect();

    for tick in 0..1000u32 {
        for factory in &factories {
            app.world
                .entity_mut(*factory)
                .insert(ItemLedger::with_items([(ItemKind::Silicon, 2)]));
        }
        run_tick(&mut app);

        let mut query = app.world.query::<(&UnitFactory, &FactoryState)>();
        for (factory, state) in query.iter(&app.world) {
            assert!(
                state.outstanding <= factory.config().max_spawn(),
                "cap exceeded at tick {tick}"
            );
        }
    }
    assert_eq!(unit_count(&mut app), factories.len());
}

#[test]
fn identical_seeds_spawn_identical_units() {
    ensure_test_config();
    let spawn_positions = || {
        let mut app = build_headless_app();
        place_stocked(&mut app, "test-factory", UVec2::new(1, 1), TeamId(1), 20);
        run(&mut app, 2000);
        let mut query = app.world.query_filtered::<&Position, With<Unit>>();
        let mut positions: Vec<(f32, f32)> = query
            .iter(&app.world)
            .map(|position| (position.0.x, position.0.y))
            .collect();
        positions.sort_by(|a, b| a.partial_cmp(b).expect("finite"));
        positions
    };

    let first = spawn_positions();
    assert_eq!(first.len(), 2);
    assert_eq!(first, spawn_positions());
}

#[test]
fn replacement_factory_keeps_its_own_slots() {
    ensure_test_config();
    let mut app = build_headless_app();
    let position = UVec2::new(0, 0);
    let first = place_stocked(&mut app, "single-factory", position, TeamId(1), 2);
    run(&mut app, 100);
    let old_unit = {
        let mut units = app.world.query_filtered::<Entity, With<Unit>>();
        units.single(&app.world)
    };

    assert!(remove_block(&mut app.world, position));
    let second = place_stocked(&mut app, "single-factory", position, TeamId(1), 2);
    assert_ne!(first, second);
    run(&mut app, 100);
    assert_eq!(unit_count(&mut app), 2);

    assert!(despawn_unit(&mut app.world, old_unit));
    run(&mut app, 10);

    let state = app.world.get::<FactoryState>(second).expect("state");
    assert_eq!(state.outstanding, 1);
    assert_eq!(state.progress, 0.0);

    let mut units = app.world.query::<&Unit>();
    let credited = units
        .iter(&app.world)
        .filter(|unit| unit.spawner == Some(second))
        .count();
    assert_eq!(credited, 1);
}
