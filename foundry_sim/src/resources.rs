use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

use bevy::{math::UVec2, prelude::*};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::{components::TeamId, production::TickOutcome};

/// Global configuration parameters for the headless simulation.
#[derive(Resource, Debug, Clone)]
pub struct SimulationConfig {
    /// Time-units elapsed per update.
    pub tick_delta: f32,
    pub rng_seed: u64,
    pub replication_bind: SocketAddr,
    pub command_bind: SocketAddr,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_delta: 1.0,
            rng_seed: 0x5eed_f00d,
            replication_bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 42000),
            command_bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 42001),
        }
    }
}

/// Game rules that decide how producers are treated.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationRules {
    /// Wave-team producers skip item costs after a grace period.
    pub enemy_cheat: bool,
    pub wave_team: TeamId,
}

impl Default for SimulationRules {
    fn default() -> Self {
        Self {
            enemy_cheat: true,
            wave_team: TeamId(2),
        }
    }
}

impl SimulationRules {
    pub fn is_untrusted(&self, team: TeamId) -> bool {
        self.enemy_cheat && team == self.wave_team
    }
}

/// Tracks total simulation ticks elapsed.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationTick(pub u64);

/// Lookup from origin tile to the block entity placed there.
#[derive(Resource, Debug, Clone, Default)]
pub struct TileIndex {
    blocks: HashMap<UVec2, Entity>,
}

impl TileIndex {
    pub fn get(&self, position: UVec2) -> Option<Entity> {
        self.blocks.get(&position).copied()
    }

    pub fn insert(&mut self, position: UVec2, entity: Entity) -> Option<Entity> {
        self.blocks.insert(position, entity)
    }

    pub fn remove(&mut self, position: UVec2) -> Option<Entity> {
        self.blocks.remove(&position)
    }
}

/// Deterministic source for spawn jitter.
#[derive(Resource, Debug, Clone)]
pub struct SpawnRng(pub ChaCha8Rng);

impl SpawnRng {
    pub fn from_seed(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }
}

/// Production counters for the current tick plus running totals.
#[derive(Resource, Debug, Clone, Default)]
pub struct ProductionTelemetry {
    pub gated: u32,
    pub stalled: u32,
    pub advanced: u32,
    pub completed: u32,
    pub spawn_calls_applied: u32,
    pub spawn_calls_discarded: u32,
    pub units_spawned: u32,
    pub completed_total: u64,
    pub units_spawned_total: u64,
}

impl ProductionTelemetry {
    pub fn reset_turn(&mut self) {
        self.gated = 0;
        self.stalled = 0;
        self.advanced = 0;
        self.completed = 0;
        self.spawn_calls_applied = 0;
        self.spawn_calls_discarded = 0;
        self.units_spawned = 0;
    }

    pub fn record(&mut self, outcome: TickOutcome) {
        match outcome {
            TickOutcome::Gated => self.gated += 1,
            TickOutcome::Stalled => self.stalled += 1,
            TickOutcome::Advanced => self.advanced += 1,
            TickOutcome::Completed => {
                self.completed += 1;
                self.completed_total += 1;
            }
        }
    }

    pub fn record_unit_spawned(&mut self) {
        self.units_spawned += 1;
        self.units_spawned_total += 1;
    }
}
