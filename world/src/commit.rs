//! Application of wave resolutions to the world state.

use territory_defense_core::{MapId, StoreError, TileId, WallId, WaveResolution};

use crate::WorldState;

impl WorldState {
    /// Applies `resolution` in place. Callers stage the commit on a copy so a
    /// failure part-way through never reaches the authoritative state.
    pub(crate) fn commit(&mut self, resolution: &WaveResolution) -> Result<(), StoreError> {
        let wave = self
            .waves
            .get_mut(&resolution.wave)
            .ok_or(StoreError::WaveNotFound(resolution.wave))?;
        if wave.map != resolution.map {
            return Err(StoreError::Integrity(format!(
                "wave {} belongs to map {}, not {}",
                wave.id, wave.map, resolution.map
            )));
        }
        if wave.executed {
            return Err(StoreError::WaveAlreadyExecuted(wave.id));
        }
        wave.executed = true;

        for &(id, health) in &resolution.ammunition_health {
            let instance = self
                .ammunition
                .get_mut(&id)
                .ok_or(StoreError::AmmunitionNotFound(id))?;
            if health > instance.max_health {
                return Err(StoreError::Integrity(format!(
                    "ammunition {id} cannot hold {health} health"
                )));
            }
            instance.health = health;
        }

        for &(id, health) in &resolution.wall_health {
            let wall = self.walls.get_mut(&id).ok_or(StoreError::WallNotFound(id))?;
            if health > wall.tier.max_health() {
                return Err(StoreError::Integrity(format!(
                    "wall {id} cannot hold {health} health"
                )));
            }
            wall.health = health;
        }

        for id in &resolution.removed_ammunition {
            if self.ammunition.remove(id).is_none() {
                return Err(StoreError::AmmunitionNotFound(*id));
            }
        }

        for &tile in &resolution.destroyed_tiles {
            self.destroy_tile(resolution.map, tile)?;
        }

        Ok(())
    }

    fn destroy_tile(&mut self, map: MapId, tile: TileId) -> Result<(), StoreError> {
        let record = self
            .tiles
            .get_mut(&tile)
            .ok_or(StoreError::TileNotFound(tile))?;
        if record.map != map {
            return Err(StoreError::Integrity(format!(
                "tile {tile} does not belong to map {map}"
            )));
        }
        if record.destroyed {
            return Err(StoreError::Integrity(format!(
                "tile {tile} is already destroyed"
            )));
        }
        record.owner = None;
        record.destroyed = true;

        let walls: Vec<WallId> = self
            .walls
            .values()
            .filter(|wall| wall.tile == tile)
            .map(|wall| wall.id)
            .collect();
        self.ammunition
            .retain(|_, instance| !walls.contains(&instance.wall));
        self.walls.retain(|_, wall| wall.tile != tile);
        Ok(())
    }
}
