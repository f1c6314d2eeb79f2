#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Once;

use bevy::{math::UVec2, prelude::*};
use foundry_sim::{place_factory, run_tick, ItemKind, ItemLedger, TeamId, Unit};

static INIT: Once = Once::new();

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_factory_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test factory config at {}",
            config_path.display()
        );

        std::env::set_var("FACTORY_CONFIG_PATH", &config_path);
    });
}

pub fn place_stocked(
    app: &mut App,
    factory: &str,
    position: UVec2,
    team: TeamId,
    silicon: u32,
) -> Entity {
    let entity = place_factory(&mut app.world, factory, position, team).expect("place factory");
    app.world
        .entity_mut(entity)
        .insert(ItemLedger::with_items([(ItemKind::Silicon, silicon)]));
    entity
}

pub fn run(app: &mut App, ticks: u32) {
    for _ in 0..ticks {
        run_tick(app);
    }
}

pub fn unit_count(app: &mut App) -> usize {
    let mut query = app.world.query_filtered::<(), With<Unit>>();
    query.iter(&app.world).count()
}
