use std::fmt;
use std::sync::Arc;

use bevy::{
    math::{UVec2, Vec2},
    prelude::*,
};
use bitflags::bitflags;

use crate::{
    factory_config::{FactoryConfig, UnitTypeId},
    spawn::SpawnGate,
};

/// World units spanned by one grid tile.
pub const TILE_SIZE: f32 = 8.0;

/// Grid placement of a block. `position` is the block's origin tile.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub position: UVec2,
    pub size: u32,
}

impl Tile {
    pub fn new(position: UVec2, size: u32) -> Self {
        Self { position, size }
    }

    /// Centre of the block in world units. Even-sized blocks sit half a tile
    /// off their origin tile.
    pub fn draw_position(&self) -> Vec2 {
        let offset = ((self.size + 1) % 2) as f32 * TILE_SIZE / 2.0;
        self.position.as_vec2() * TILE_SIZE + Vec2::splat(offset)
    }
}

impl Default for Tile {
    fn default() -> Self {
        Self {
            position: UVec2::ZERO,
            size: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TeamId(pub u8);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owning team of a block or unit.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Team(pub TeamId);

bitflags! {
    /// Roles a block advertises to targeting and logistics queries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BlockFlags: u8 {
        const PRODUCER = 0b0000_0001;
        const TARGET = 0b0000_0010;
    }
}

/// Marks a block as a unit factory and holds its type parameters.
#[derive(Component, Debug, Clone)]
pub struct UnitFactory {
    config: Arc<FactoryConfig>,
}

impl UnitFactory {
    pub fn new(config: Arc<FactoryConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn flags(&self) -> BlockFlags {
        BlockFlags::PRODUCER | BlockFlags::TARGET
    }

    /// Factories never hand items back to conveyors.
    pub fn outputs_items(&self) -> bool {
        false
    }

    pub fn can_produce(&self, state: &FactoryState) -> bool {
        SpawnGate::permits(state, &self.config)
    }
}

/// Per-instance production state.
#[derive(Component, Debug, Clone, Default, PartialEq)]
pub struct FactoryState {
    /// Accumulated work toward the current unit, in time-units.
    pub progress: f32,
    /// Animation phase, advanced by `dt * speed_factor`.
    pub phase: f32,
    /// Smoothed production rate in `[0, 1]`.
    pub speed_factor: f32,
    /// Time spent waiting while untrusted. Never decremented.
    pub warmup: f32,
    /// Units spawned by this factory that are still alive.
    pub outstanding: u32,
}

impl FactoryState {
    pub fn progress_fraction(&self, config: &FactoryConfig) -> f32 {
        self.progress / config.produce_time()
    }
}

/// Fraction of the block's power demand currently met.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct PowerSupply {
    pub satisfaction: f32,
}

impl Default for PowerSupply {
    fn default() -> Self {
        Self { satisfaction: 1.0 }
    }
}

/// Result of the block's non-item consumers (power, liquids) this tick.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeStatus {
    pub valid: bool,
}

impl Default for ConsumeStatus {
    fn default() -> Self {
        Self { valid: true }
    }
}

/// A unit created by a factory.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct Unit {
    pub unit_type: UnitTypeId,
    pub team: TeamId,
    /// Factory block that produced this unit. A block placed later on the
    /// same tile is a different entity and is never credited.
    pub spawner: Option<Entity>,
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub struct Position(pub Vec2);

#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity(pub Vec2);
