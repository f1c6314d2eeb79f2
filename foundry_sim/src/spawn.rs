use bevy::{
    math::{UVec2, Vec2},
    prelude::*,
};
use foundry_proto::{ReplicatedCall, TileRef};
use rand::Rng;

use crate::{
    components::{FactoryState, Position, Team, Tile, Unit, UnitFactory, Velocity},
    factory_config::FactoryConfig,
    network::{NetworkRole, ReplicationOutbox},
};

/// Half-width of the square a new unit is scattered in around the factory.
pub const SPAWN_JITTER: f32 = 4.0;

pub const SPAWN_SHAKE_INTENSITY: f32 = 2.0;
pub const SPAWN_SHAKE_DURATION: f32 = 3.0;

/// Limits how many live units a factory may have at once.
pub struct SpawnGate;

impl SpawnGate {
    pub fn permits(state: &FactoryState, config: &FactoryConfig) -> bool {
        state.outstanding < config.max_spawn()
    }

    /// One of the factory's units left the world.
    pub fn release(state: &mut FactoryState) {
        state.outstanding = state.outstanding.saturating_sub(1);
    }
}

/// A factory finished a cycle. Handled by every participant.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactorySpawnCall {
    pub tile: TileRef,
}

impl From<FactorySpawnCall> for ReplicatedCall {
    fn from(call: FactorySpawnCall) -> Self {
        ReplicatedCall::UnitFactorySpawn { tile: call.tile }
    }
}

/// Visual and audio feedback for renderers.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub enum EffectCue {
    Shake {
        intensity: f32,
        duration: f32,
        at: Vec2,
    },
    Smoke {
        at: Vec2,
    },
}

/// Raised on the authoritative node after a unit entity is created.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitSpawned {
    pub unit: Entity,
    pub factory: Entity,
}

/// Raised by whoever removes a unit from the world.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitRemoved {
    pub unit: Entity,
    pub spawner: Option<Entity>,
}

/// The authoritative node removed a unit credited to the factory at `spawner`.
/// Observers never hold the unit itself, so this is all they learn.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalNotice {
    pub spawner: TileRef,
}

pub fn tile_ref(position: UVec2) -> TileRef {
    TileRef::new(position.x, position.y)
}

pub fn tile_position(tile: TileRef) -> UVec2 {
    UVec2::new(tile.x, tile.y)
}

/// Issues a spawn call for the factory at `position`. Only the authoritative
/// node issues; the call is delivered locally and queued for observers.
/// Returns whether the call went out.
pub fn issue_spawn_call(
    role: NetworkRole,
    position: UVec2,
    tick: u64,
    calls: &mut EventWriter<FactorySpawnCall>,
    outbox: &mut ReplicationOutbox,
) -> bool {
    if !role.is_authoritative() {
        return false;
    }
    let call = FactorySpawnCall {
        tile: tile_ref(position),
    };
    calls.send(call);
    if let Err(err) = outbox.push(ReplicatedCall::from(call), tick) {
        tracing::error!(
            target: "foundry::spawn",
            x = position.x,
            y = position.y,
            error = %err,
            "spawn.call.encode_failed"
        );
    }
    true
}

/// Applies the shared part of a spawn call to the factory's state.
pub fn record_spawn(state: &mut FactoryState) {
    state.progress = 0.0;
    state.outstanding += 1;
}

/// Effects every participant plays for a finished cycle.
pub fn spawn_effects(at: Vec2) -> [EffectCue; 2] {
    [
        EffectCue::Shake {
            intensity: SPAWN_SHAKE_INTENSITY,
            duration: SPAWN_SHAKE_DURATION,
            at,
        },
        EffectCue::Smoke { at },
    ]
}

/// Builds the unit a factory releases. Authoritative nodes only.
pub fn build_unit<R: Rng + ?Sized>(
    rng: &mut R,
    spawner: Entity,
    tile: &Tile,
    factory: &UnitFactory,
    team: Team,
) -> (Unit, Position, Velocity) {
    let origin = tile.draw_position();
    let jitter = Vec2::new(
        rng.gen_range(-SPAWN_JITTER..=SPAWN_JITTER),
        rng.gen_range(-SPAWN_JITTER..=SPAWN_JITTER),
    );
    let config = factory.config();
    (
        Unit {
            unit_type: config.unit_type().clone(),
            team: team.0,
            spawner: Some(spawner),
        },
        Position(origin + jitter),
        Velocity(Vec2::new(0.0, config.launch_velocity())),
    )
}

/// Removes a unit and reports it so its factory frees a slot.
pub fn despawn_unit(world: &mut World, unit: Entity) -> bool {
    let Some(spawner) = world.get::<Unit>(unit).map(|unit| unit.spawner) else {
        return false;
    };
    world.despawn(unit);
    world.send_event(UnitRemoved { unit, spawner });
    true
}
