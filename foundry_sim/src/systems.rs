use bevy::{ecs::system::SystemParam, prelude::*};
use foundry_proto::EntitySync;

use crate::{
    components::{ConsumeStatus, FactoryState, PowerSupply, Team, Tile, UnitFactory},
    ledger::ItemLedger,
    network::{NetworkRole, ReplicationOutbox},
    production::{advance_production, ProductionInputs, ProductionMode, TickOutcome},
    resources::{
        ProductionTelemetry, SimulationConfig, SimulationRules, SimulationTick, SpawnRng,
        TileIndex,
    },
    spawn::{
        build_unit, issue_spawn_call, record_spawn, spawn_effects, tile_position, tile_ref,
        EffectCue, FactorySpawnCall, RemovalNotice, SpawnGate, UnitRemoved, UnitSpawned,
    },
};

#[derive(SystemParam)]
pub struct ProductionParams<'w, 's> {
    pub config: Res<'w, SimulationConfig>,
    pub rules: Res<'w, SimulationRules>,
    pub role: Res<'w, NetworkRole>,
    pub tick: Res<'w, SimulationTick>,
    pub telemetry: ResMut<'w, ProductionTelemetry>,
    pub outbox: ResMut<'w, ReplicationOutbox>,
    pub calls: EventWriter<'w, FactorySpawnCall>,
    pub factories: Query<
        'w,
        's,
        (
            &'static Tile,
            &'static UnitFactory,
            &'static Team,
            &'static mut FactoryState,
            &'static mut ItemLedger,
            Option<&'static PowerSupply>,
            Option<&'static ConsumeStatus>,
        ),
    >,
}

#[derive(SystemParam)]
pub struct DispatchParams<'w, 's> {
    pub commands: Commands<'w, 's>,
    pub role: Res<'w, NetworkRole>,
    pub index: Res<'w, TileIndex>,
    pub rng: ResMut<'w, SpawnRng>,
    pub telemetry: ResMut<'w, ProductionTelemetry>,
    pub calls: EventReader<'w, 's, FactorySpawnCall>,
    pub effects: EventWriter<'w, EffectCue>,
    pub spawned: EventWriter<'w, UnitSpawned>,
    pub factories: Query<
        'w,
        's,
        (
            &'static Tile,
            &'static UnitFactory,
            &'static Team,
            &'static mut FactoryState,
        ),
    >,
}

#[derive(SystemParam)]
pub struct ReleaseParams<'w, 's> {
    pub role: Res<'w, NetworkRole>,
    pub tick: Res<'w, SimulationTick>,
    pub index: Res<'w, TileIndex>,
    pub outbox: ResMut<'w, ReplicationOutbox>,
    pub removed: EventReader<'w, 's, UnitRemoved>,
    pub notices: EventReader<'w, 's, RemovalNotice>,
    pub factories:
        Query<'w, 's, (&'static Tile, &'static mut FactoryState), With<UnitFactory>>,
}

/// Runs the production timer for every factory and settles finished cycles.
pub fn advance_factories(mut params: ProductionParams) {
    params.telemetry.reset_turn();
    let dt = params.config.tick_delta;
    let role = *params.role;
    let tick = params.tick.0;

    for (tile, factory, team, mut state, mut ledger, power, consume) in params.factories.iter_mut()
    {
        let config = factory.config();
        let mode = ProductionMode::from_untrusted(params.rules.is_untrusted(team.0));
        let inputs = ProductionInputs {
            dt,
            consume_valid: consume.map_or(true, |status| status.valid),
            power_satisfaction: power.map_or(1.0, |supply| supply.satisfaction),
        };

        let outcome = advance_production(&mut state, config, mode, &*ledger, inputs);
        params.telemetry.record(outcome);
        if outcome != TickOutcome::Completed {
            continue;
        }

        let issued = issue_spawn_call(
            role,
            tile.position,
            tick,
            &mut params.calls,
            &mut params.outbox,
        );
        config.requirements().consume(&mut *ledger);
        tracing::debug!(
            target: "foundry::production",
            factory = config.name(),
            x = tile.position.x,
            y = tile.position.y,
            ?mode,
            issued,
            tick,
            "factory.cycle.complete"
        );
    }
}

/// Executes spawn calls on this node, whether issued locally or received.
pub fn apply_spawn_calls(mut params: DispatchParams) {
    let calls: Vec<FactorySpawnCall> = params.calls.read().copied().collect();
    for call in calls {
        let position = tile_position(call.tile);
        let Some(entity) = params.index.get(position) else {
            params.telemetry.spawn_calls_discarded += 1;
            tracing::debug!(
                target: "foundry::spawn",
                x = position.x,
                y = position.y,
                "spawn.call.no_block"
            );
            continue;
        };
        let Ok((tile, factory, team, mut state)) = params.factories.get_mut(entity) else {
            params.telemetry.spawn_calls_discarded += 1;
            tracing::debug!(
                target: "foundry::spawn",
                x = position.x,
                y = position.y,
                "spawn.call.not_a_factory"
            );
            continue;
        };

        record_spawn(&mut state);
        params.telemetry.spawn_calls_applied += 1;
        for cue in spawn_effects(tile.draw_position()) {
            params.effects.send(cue);
        }

        if !params.role.is_authoritative() {
            continue;
        }

        let bundle = build_unit(&mut params.rng.0, entity, tile, factory, *team);
        let unit = params.commands.spawn(bundle).id();
        params.spawned.send(UnitSpawned {
            unit,
            factory: entity,
        });
        params.telemetry.record_unit_spawned();
        tracing::info!(
            target: "foundry::spawn",
            unit_type = %factory.config().unit_type(),
            team = %team.0,
            x = position.x,
            y = position.y,
            outstanding = state.outstanding,
            "unit.spawned"
        );
    }
}

/// Frees a factory slot for every unit reported removed. The authority
/// mirrors each release to observers; observers apply the mirrored notices.
pub fn release_spawn_slots(mut params: ReleaseParams) {
    let authoritative = params.role.is_authoritative();
    let tick = params.tick.0;

    let spawners: Vec<Entity> = params
        .removed
        .read()
        .filter_map(|event| event.spawner)
        .collect();
    for spawner in spawners {
        let Ok((tile, mut state)) = params.factories.get_mut(spawner) else {
            tracing::trace!(target: "foundry::spawn", "unit.release.factory_gone");
            continue;
        };
        SpawnGate::release(&mut state);
        tracing::trace!(
            target: "foundry::spawn",
            x = tile.position.x,
            y = tile.position.y,
            outstanding = state.outstanding,
            "unit.released"
        );
        if !authoritative {
            continue;
        }
        let sync = EntitySync::UnitRemoved {
            spawner: tile_ref(tile.position),
        };
        if let Err(err) = params.outbox.push(sync, tick) {
            tracing::error!(
                target: "foundry::spawn",
                x = tile.position.x,
                y = tile.position.y,
                error = %err,
                "unit.release.encode_failed"
            );
        }
    }

    let notices: Vec<RemovalNotice> = params.notices.read().copied().collect();
    for notice in notices {
        let position = tile_position(notice.spawner);
        let Some(entity) = params.index.get(position) else {
            continue;
        };
        if let Ok((_, mut state)) = params.factories.get_mut(entity) {
            SpawnGate::release(&mut state);
            tracing::trace!(
                target: "foundry::spawn",
                x = position.x,
                y = position.y,
                outstanding = state.outstanding,
                "unit.released.remote"
            );
        }
    }
}

pub fn advance_tick(mut tick: ResMut<SimulationTick>) {
    tick.0 += 1;
}
