//! Invariant checks applied to topologies before they reach the engine.

use std::collections::BTreeSet;

use territory_defense_core::{MapTopology, StoreError};

/// Verifies the data model invariants of a loaded topology.
pub(crate) fn verify(topology: &MapTopology) -> Result<(), StoreError> {
    let side = topology.map.side;
    let mut coords = BTreeSet::new();
    for tile in &topology.tiles {
        if !tile.coord.within(side) {
            return Err(StoreError::Integrity(format!(
                "tile {} at {} lies outside map {} of side {side}",
                tile.id, tile.coord, topology.map.id
            )));
        }
        if !coords.insert(tile.coord) {
            return Err(StoreError::Integrity(format!(
                "map {} holds more than one tile at {}",
                topology.map.id, tile.coord
            )));
        }
        if tile.destroyed && tile.owner.is_some() {
            return Err(StoreError::Integrity(format!(
                "destroyed tile {} still has an owner",
                tile.id
            )));
        }
    }

    let mut faces = BTreeSet::new();
    for wall in &topology.walls {
        let Some(tile) = topology.tile(wall.tile) else {
            return Err(StoreError::Integrity(format!(
                "wall {} references missing tile {}",
                wall.id, wall.tile
            )));
        };
        if tile.destroyed || tile.owner.is_none() {
            return Err(StoreError::Integrity(format!(
                "wall {} survives on tile {} which is destroyed or unowned",
                wall.id, tile.id
            )));
        }
        if !faces.insert((wall.tile, wall.direction)) {
            return Err(StoreError::Integrity(format!(
                "tile {} has more than one {} wall",
                wall.tile, wall.direction
            )));
        }
        if wall.health > wall.tier.max_health() {
            return Err(StoreError::Integrity(format!(
                "wall {} health {} exceeds its tier maximum",
                wall.id, wall.health
            )));
        }
    }

    for instance in &topology.ammunition {
        if instance.health > instance.max_health {
            return Err(StoreError::Integrity(format!(
                "ammunition {} health {} exceeds its maximum {}",
                instance.id, instance.health, instance.max_health
            )));
        }
    }

    Ok(())
}
