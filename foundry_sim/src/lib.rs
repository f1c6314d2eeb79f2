//! Headless simulation of resource-gated unit factories.
//!
//! Each [`run_tick`] advances every factory's production timer, settles
//! finished cycles through replicated spawn calls and replicates those calls
//! to observers when running as a server.

mod components;
pub mod factory_config;
pub mod ledger;
pub mod metrics;
pub mod network;
pub mod persistence;
pub mod placement;
pub mod production;
mod resources;
pub mod spawn;
mod systems;

use bevy::prelude::*;

pub use components::{
    BlockFlags, ConsumeStatus, FactoryState, Position, PowerSupply, Team, TeamId, Tile, Unit,
    UnitFactory, Velocity, TILE_SIZE,
};
pub use factory_config::{
    load_factory_catalog_from_env, FactoryCatalog, FactoryConfig, FactoryConfigError, UnitTypeId,
};
pub use ledger::{ItemKind, ItemLedger, ItemStack, ProductionRequirement, ResourceLedger};
pub use metrics::FactoryMetrics;
pub use network::{NetworkRole, ReplicationInbox, ReplicationOutbox};
pub use persistence::{FactoryRecord, PersistError};
pub use placement::{
    load_factory_state, place_factory, remove_block, save_factory_state, spawn_factory,
    PlacementError,
};
pub use production::{ProductionMode, TickOutcome};
pub use resources::{
    ProductionTelemetry, SimulationConfig, SimulationRules, SimulationTick, SpawnRng, TileIndex,
};
pub use spawn::{
    despawn_unit, EffectCue, FactorySpawnCall, RemovalNotice, SpawnGate, UnitRemoved, UnitSpawned,
};
pub use systems::{advance_factories, advance_tick, apply_spawn_calls, release_spawn_slots};

/// Construct a standalone (authoritative, unreplicated) headless app.
pub fn build_headless_app() -> App {
    build_headless_app_with_role(NetworkRole::Standalone)
}

/// Construct a headless app playing `role` in a replicated session.
pub fn build_headless_app_with_role(role: NetworkRole) -> App {
    let mut app = App::new();

    let config = SimulationConfig::default();
    let catalog = load_factory_catalog_from_env();

    app.insert_resource(SpawnRng::from_seed(config.rng_seed))
        .insert_resource(config)
        .insert_resource(catalog)
        .insert_resource(role)
        .insert_resource(SimulationRules::default())
        .insert_resource(SimulationTick::default())
        .init_resource::<TileIndex>()
        .init_resource::<ProductionTelemetry>()
        .init_resource::<ReplicationOutbox>()
        .add_event::<FactorySpawnCall>()
        .add_event::<EffectCue>()
        .add_event::<UnitSpawned>()
        .add_event::<UnitRemoved>()
        .add_event::<RemovalNotice>()
        .add_plugins(MinimalPlugins)
        .add_systems(
            Update,
            (
                network::receive_replicated_calls,
                systems::release_spawn_slots,
                systems::advance_factories,
                systems::apply_spawn_calls,
                network::flush_replication,
                systems::advance_tick,
            )
                .chain(),
        );

    app
}

/// Execute a single simulation tick.
///
/// Calls issued during the tick are applied locally before it returns, so a
/// factory never observes its own completion twice.
pub fn run_tick(app: &mut App) {
    app.update();
}
