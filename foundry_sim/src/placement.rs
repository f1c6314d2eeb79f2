use std::sync::Arc;

use bevy::{math::UVec2, prelude::*};
use thiserror::Error;

use crate::{
    components::{ConsumeStatus, FactoryState, PowerSupply, Team, TeamId, Tile, UnitFactory},
    factory_config::{FactoryCatalog, FactoryConfig, FactoryConfigError},
    ledger::ItemLedger,
    persistence::{read_record, write_record, PersistError},
    resources::TileIndex,
};

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("tile ({x}, {y}) is already occupied")]
    Occupied { x: u32, y: u32 },
    #[error("no unit factory at ({x}, {y})")]
    NotAFactory { x: u32, y: u32 },
    #[error(transparent)]
    Config(#[from] FactoryConfigError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Places a factory of a catalog type at `position`.
pub fn place_factory(
    world: &mut World,
    type_name: &str,
    position: UVec2,
    team: TeamId,
) -> Result<Entity, PlacementError> {
    let config = world.resource::<FactoryCatalog>().get(type_name)?;
    spawn_factory(world, config, position, team)
}

pub fn spawn_factory(
    world: &mut World,
    config: Arc<FactoryConfig>,
    position: UVec2,
    team: TeamId,
) -> Result<Entity, PlacementError> {
    if world.resource::<TileIndex>().get(position).is_some() {
        return Err(PlacementError::Occupied {
            x: position.x,
            y: position.y,
        });
    }
    let name = config.name().to_string();
    let entity = world
        .spawn((
            Tile::new(position, config.size()),
            UnitFactory::new(config),
            FactoryState::default(),
            ItemLedger::default(),
            PowerSupply::default(),
            ConsumeStatus::default(),
            Team(team),
        ))
        .id();
    world.resource_mut::<TileIndex>().insert(position, entity);
    tracing::debug!(
        target: "foundry::placement",
        factory = %name,
        x = position.x,
        y = position.y,
        %team,
        "factory.placed"
    );
    Ok(entity)
}

/// Removes whatever block sits at `position`. Its state goes with it.
pub fn remove_block(world: &mut World, position: UVec2) -> bool {
    let Some(entity) = world.resource_mut::<TileIndex>().remove(position) else {
        return false;
    };
    world.despawn(entity)
}

fn factory_at(world: &World, position: UVec2) -> Result<Entity, PlacementError> {
    world
        .resource::<TileIndex>()
        .get(position)
        .filter(|entity| world.get::<UnitFactory>(*entity).is_some())
        .ok_or(PlacementError::NotAFactory {
            x: position.x,
            y: position.y,
        })
}

/// Encodes the persisted part of the factory at `position`.
pub fn save_factory_state(world: &World, position: UVec2) -> Result<Vec<u8>, PlacementError> {
    let entity = factory_at(world, position)?;
    let state = world
        .get::<FactoryState>(entity)
        .ok_or(PlacementError::NotAFactory {
            x: position.x,
            y: position.y,
        })?;
    Ok(write_record(state)?)
}

/// Replaces the factory's state with a saved record. A malformed record
/// leaves the factory untouched and is returned to the caller.
pub fn load_factory_state(
    world: &mut World,
    position: UVec2,
    bytes: &[u8],
) -> Result<(), PlacementError> {
    let entity = factory_at(world, position)?;
    let state = read_record(bytes)?;
    world.entity_mut(entity).insert(state);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        let mut world = World::new();
        world.insert_resource(FactoryCatalog::builtin());
        world.init_resource::<TileIndex>();
        world
    }

    #[test]
    fn placing_twice_on_a_tile_fails() {
        let mut world = world();
        let position = UVec2::new(4, 4);
        place_factory(&mut world, "dagger-factory", position, TeamId(1)).expect("place");
        assert!(matches!(
            place_factory(&mut world, "dagger-factory", position, TeamId(1)),
            Err(PlacementError::Occupied { x: 4, y: 4 })
        ));
    }

    #[test]
    fn unknown_type_is_a_config_error() {
        let mut world = world();
        assert!(matches!(
            place_factory(&mut world, "nope", UVec2::ZERO, TeamId(1)),
            Err(PlacementError::Config(FactoryConfigError::UnknownType(_)))
        ));
    }

    #[test]
    fn removal_frees_the_tile() {
        let mut world = world();
        let position = UVec2::new(1, 2);
        let entity =
            place_factory(&mut world, "crawler-factory", position, TeamId(1)).expect("place");
        assert!(remove_block(&mut world, position));
        assert!(world.get_entity(entity).is_none());
        assert!(!remove_block(&mut world, position));
        assert!(matches!(
            save_factory_state(&world, position),
            Err(PlacementError::NotAFactory { .. })
        ));
    }

    #[test]
    fn saved_state_loads_into_a_fresh_factory() {
        let mut world = world();
        let from = UVec2::new(0, 0);
        let to = UVec2::new(6, 0);
        let source = place_factory(&mut world, "dagger-factory", from, TeamId(1)).expect("place");
        place_factory(&mut world, "dagger-factory", to, TeamId(1)).expect("place");
        {
            let mut state = world.get_mut::<FactoryState>(source).expect("state");
            state.progress = 420.0;
            state.outstanding = 1;
            state.phase = 9.0;
        }

        let bytes = save_factory_state(&world, from).expect("save");
        load_factory_state(&mut world, to, &bytes).expect("load");

        let target = world.resource::<TileIndex>().get(to).expect("indexed");
        let loaded = world.get::<FactoryState>(target).expect("state");
        assert_eq!(loaded.progress, 420.0);
        assert_eq!(loaded.outstanding, 1);
        assert_eq!(loaded.phase, 0.0);
    }

    #[test]
    fn malformed_record_leaves_state_untouched() {
        let mut world = world();
        let position = UVec2::new(2, 2);
        let entity = place_factory(&mut world, "dagger-factory", position, TeamId(1)).expect("place");
        world.get_mut::<FactoryState>(entity).expect("state").progress = 5.0;

        let err = load_factory_state(&mut world, position, &[0, 1, 2]).unwrap_err();
        assert!(matches!(
            err,
            PlacementError::Persist(PersistError::Truncated { .. })
        ));
        assert_eq!(world.get::<FactoryState>(entity).expect("state").progress, 5.0);
    }
}
