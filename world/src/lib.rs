#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative in-memory store for territory maps.
//!
//! [`World`] owns every map, tile, wall, ammunition instance, wave and group.
//! It implements [`CombatStore`] for the combat engine and exposes the
//! collaborator mutations (tile purchase, wall upgrade, ammunition deployment)
//! that produce the engine's inputs. Every mutation that touches ownership,
//! walls or ammunition passes through the [`gate`] first.

mod commit;
pub mod gate;
mod integrity;
mod mutations;
mod sink;

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use log::{debug, warn};
use territory_defense_core::{
    AmmunitionId, AmmunitionType, AmmunitionTypeId, AttackWave, CombatStore, DeployedAmmunition,
    Group, GroupId, MapId, MapRecord, MapTopology, StoreError, TileId, TileRecord, WallId,
    WallRecord, WaveId, WaveResolution,
};

pub use mutations::{MutationError, NewAmmunitionType};
pub use sink::RecordingSink;

/// Represents the authoritative territory defense state.
#[derive(Debug, Default)]
pub struct World {
    state: RwLock<WorldState>,
    fail_next_commit: AtomicBool,
}

impl World {
    /// Creates an empty world without maps.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next [`CombatStore::apply_wave_result`] call fail with a
    /// persistence error without touching any state.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, WorldState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Persistence("world state lock poisoned".to_owned()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, WorldState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Persistence("world state lock poisoned".to_owned()))
    }
}

impl CombatStore for World {
    fn active_maps(&self) -> Result<Vec<MapId>, StoreError> {
        Ok(self
            .read()?
            .maps
            .values()
            .filter(|map| map.active)
            .map(|map| map.id)
            .collect())
    }

    fn load_map(&self, map: MapId) -> Result<MapRecord, StoreError> {
        self.read()?.map(map).cloned()
    }

    fn load_map_topology(&self, map: MapId) -> Result<MapTopology, StoreError> {
        let topology = self.read()?.topology(map)?;
        integrity::verify(&topology)?;
        Ok(topology)
    }

    fn pending_waves(&self, map: MapId) -> Result<Vec<AttackWave>, StoreError> {
        let state = self.read()?;
        let _ = state.map(map)?;
        let mut waves: Vec<AttackWave> = state
            .waves
            .values()
            .filter(|wave| wave.map == map && !wave.executed)
            .cloned()
            .collect();
        waves.sort_by_key(|wave| (wave.attack_time, wave.id));
        Ok(waves)
    }

    fn load_wave(&self, wave: WaveId) -> Result<AttackWave, StoreError> {
        self.read()?
            .waves
            .get(&wave)
            .cloned()
            .ok_or(StoreError::WaveNotFound(wave))
    }

    fn load_group(&self, group: GroupId) -> Result<Group, StoreError> {
        self.read()?
            .groups
            .get(&group)
            .cloned()
            .ok_or(StoreError::GroupNotFound(group))
    }

    fn set_map_locked(&self, map: MapId, locked: bool) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        let record = state
            .maps
            .get_mut(&map)
            .ok_or(StoreError::MapNotFound(map))?;
        let changed = record.locked != locked;
        record.locked = locked;
        Ok(changed)
    }

    fn apply_wave_result(&self, resolution: &WaveResolution) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            warn!(
                "rejecting commit of wave {} on map {}: injected failure",
                resolution.wave, resolution.map
            );
            return Err(StoreError::Persistence(
                "injected commit failure".to_owned(),
            ));
        }

        let mut staged = state.clone();
        staged.commit(resolution)?;
        *state = staged;
        debug!(
            "committed wave {} on map {}: {} ammunition updates, {} removals, {} wall updates, {} tiles destroyed",
            resolution.wave,
            resolution.map,
            resolution.ammunition_health.len(),
            resolution.removed_ammunition.len(),
            resolution.wall_health.len(),
            resolution.destroyed_tiles.len()
        );
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
struct WorldState {
    maps: BTreeMap<MapId, MapRecord>,
    tiles: BTreeMap<TileId, TileRecord>,
    walls: BTreeMap<WallId, WallRecord>,
    ammunition: BTreeMap<AmmunitionId, DeployedAmmunition>,
    ammunition_types: BTreeMap<AmmunitionTypeId, AmmunitionType>,
    waves: BTreeMap<WaveId, AttackWave>,
    groups: BTreeMap<GroupId, Group>,
    ids: IdAllocator,
}

impl WorldState {
    fn map(&self, map: MapId) -> Result<&MapRecord, StoreError> {
        self.maps.get(&map).ok_or(StoreError::MapNotFound(map))
    }

    fn topology(&self, map: MapId) -> Result<MapTopology, StoreError> {
        let record = self.map(map)?.clone();
        let tiles: Vec<TileRecord> = self
            .tiles
            .values()
            .filter(|tile| tile.map == map)
            .cloned()
            .collect();
        let tile_ids: BTreeSet<TileId> = tiles.iter().map(|tile| tile.id).collect();
        let walls: Vec<WallRecord> = self
            .walls
            .values()
            .filter(|wall| tile_ids.contains(&wall.tile))
            .cloned()
            .collect();
        let wall_ids: BTreeSet<WallId> = walls.iter().map(|wall| wall.id).collect();
        let ammunition: Vec<DeployedAmmunition> = self
            .ammunition
            .values()
            .filter(|instance| wall_ids.contains(&instance.wall))
            .cloned()
            .collect();
        Ok(MapTopology::new(record, tiles, walls, ammunition))
    }

    fn tile_map(&self, tile: TileId) -> Result<MapId, StoreError> {
        self.tiles
            .get(&tile)
            .map(|record| record.map)
            .ok_or(StoreError::TileNotFound(tile))
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct IdAllocator {
    map: u32,
    tile: u32,
    wall: u32,
    ammunition: u32,
    ammunition_type: u32,
    wave: u32,
    group: u32,
}

impl IdAllocator {
    fn next(counter: &mut u32) -> u32 {
        *counter = counter.saturating_add(1);
        *counter
    }

    fn map(&mut self) -> MapId {
        MapId::new(Self::next(&mut self.map))
    }

    fn tile(&mut self) -> TileId {
        TileId::new(Self::next(&mut self.tile))
    }

    fn wall(&mut self) -> WallId {
        WallId::new(Self::next(&mut self.wall))
    }

    fn ammunition(&mut self) -> AmmunitionId {
        AmmunitionId::new(Self::next(&mut self.ammunition))
    }

    fn ammunition_type(&mut self) -> AmmunitionTypeId {
        AmmunitionTypeId::new(Self::next(&mut self.ammunition_type))
    }

    fn wave(&mut self) -> WaveId {
        WaveId::new(Self::next(&mut self.wave))
    }

    fn group(&mut self) -> GroupId {
        GroupId::new(Self::next(&mut self.group))
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use territory_defense_core::{
        AttackWave, CombatStore, DeployedAmmunition, Direction, Group, GroupId, MapId,
        MapRecord, MapSnapshot, StoreError, TileCoord, TileId, TileRecord, WallId, WallRecord,
    };

    use super::World;

    /// Retrieves the record of `map`.
    pub fn map(world: &World, map: MapId) -> Result<MapRecord, StoreError> {
        world.load_map(map)
    }

    /// Captures an observer-facing snapshot of `map`.
    pub fn snapshot(world: &World, map: MapId) -> Result<MapSnapshot, StoreError> {
        Ok(world.read()?.topology(map)?.snapshot())
    }

    /// Retrieves a tile by identifier.
    pub fn tile(world: &World, tile: TileId) -> Result<TileRecord, StoreError> {
        world
            .read()?
            .tiles
            .get(&tile)
            .cloned()
            .ok_or(StoreError::TileNotFound(tile))
    }

    /// Retrieves the tile located at `coord` on `map`.
    pub fn tile_at(world: &World, map: MapId, coord: TileCoord) -> Result<TileRecord, StoreError> {
        world
            .read()?
            .tiles
            .values()
            .find(|tile| tile.map == map && tile.coord == coord)
            .cloned()
            .ok_or(StoreError::TileNotFoundAt { map, coord })
    }

    /// Retrieves a wall by identifier.
    pub fn wall(world: &World, wall: WallId) -> Result<WallRecord, StoreError> {
        world
            .read()?
            .walls
            .get(&wall)
            .cloned()
            .ok_or(StoreError::WallNotFound(wall))
    }

    /// Walls of `tile` ordered by direction.
    pub fn walls_of(world: &World, tile: TileId) -> Result<Vec<WallRecord>, StoreError> {
        let mut walls: Vec<WallRecord> = world
            .read()?
            .walls
            .values()
            .filter(|wall| wall.tile == tile)
            .cloned()
            .collect();
        walls.sort_by_key(|wall| wall.direction);
        Ok(walls)
    }

    /// Wall of `tile` facing `direction`, if the tile has walls.
    pub fn wall_facing(
        world: &World,
        tile: TileId,
        direction: Direction,
    ) -> Result<Option<WallRecord>, StoreError> {
        Ok(world
            .read()?
            .walls
            .values()
            .find(|wall| wall.tile == tile && wall.direction == direction)
            .cloned())
    }

    /// Ammunition deployed on `wall` ordered by identifier.
    pub fn ammunition_on(
        world: &World,
        wall: WallId,
    ) -> Result<Vec<DeployedAmmunition>, StoreError> {
        Ok(world
            .read()?
            .ammunition
            .values()
            .filter(|instance| instance.wall == wall)
            .cloned()
            .collect())
    }

    /// Every wave scheduled against `map`, executed or not, in firing order.
    pub fn waves(world: &World, map: MapId) -> Result<Vec<AttackWave>, StoreError> {
        let mut waves: Vec<AttackWave> = world
            .read()?
            .waves
            .values()
            .filter(|wave| wave.map == map)
            .cloned()
            .collect();
        waves.sort_by_key(|wave| (wave.attack_time, wave.id));
        Ok(waves)
    }

    /// Every group ordered by identifier.
    pub fn groups(world: &World) -> Result<Vec<Group>, StoreError> {
        Ok(world.read()?.groups.values().cloned().collect())
    }

    /// Number of intact tiles `group` owns on `map`.
    pub fn owned_tiles(world: &World, map: MapId, group: GroupId) -> Result<usize, StoreError> {
        Ok(world
            .read()?
            .tiles
            .values()
            .filter(|tile| tile.map == map && tile.owner == Some(group) && !tile.destroyed)
            .count())
    }
}
