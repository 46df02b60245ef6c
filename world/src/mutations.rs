//! Collaborator mutations that build the maps the engine resolves.

use log::{debug, info};
use thiserror::Error;
use territory_defense_core::{
    AmmunitionId, AmmunitionType, AmmunitionTypeId, AttackWave, DeployedAmmunition, Direction,
    Group, GroupId, MapId, MapRecord, StoreError, TileCoord, TileId, TileRecord, Timestamp,
    WallId, WallRecord, WallTier, WaveId,
};

use crate::{gate, World, WorldState};

/// Reasons a collaborator mutation may be rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MutationError {
    /// The map is locked ahead of, or during, an attack.
    #[error("map {0} is locked")]
    MapLocked(MapId),
    /// Maps need at least one tile per side.
    #[error("map side must be positive")]
    EmptyMap,
    /// The coordinate lies outside the map.
    #[error("coordinate {coord} lies outside map {map}")]
    OutOfBounds {
        /// Map the coordinate was checked against.
        map: MapId,
        /// Rejected coordinate.
        coord: TileCoord,
    },
    /// A tile already occupies the coordinate.
    #[error("map {map} already holds a tile at {coord}")]
    DuplicateTile {
        /// Map holding the tile.
        map: MapId,
        /// Occupied coordinate.
        coord: TileCoord,
    },
    /// Destroyed tiles cannot be bought or fortified.
    #[error("tile {0} is destroyed")]
    TileDestroyed(TileId),
    /// The tile already belongs to a group.
    #[error("tile {0} is already owned")]
    TileOwned(TileId),
    /// The acting group does not own the tile.
    #[error("group {group} does not own tile {tile}")]
    NotOwner {
        /// Group attempting the mutation.
        group: GroupId,
        /// Tile the group does not own.
        tile: TileId,
    },
    /// The wall already uses the strongest material.
    #[error("wall {0} is already at the highest tier")]
    TierMaxed(WallId),
    /// The wall already carries the maximum number of instances of the type.
    #[error("wall {wall} already carries {cap} instances of ammunition type {kind}")]
    AmmunitionCapReached {
        /// Wall receiving the deployment.
        wall: WallId,
        /// Ammunition type being deployed.
        kind: AmmunitionTypeId,
        /// Configured cap of the type.
        cap: u32,
    },
    /// Ammunition types need positive health and cap values.
    #[error("ammunition type {0:?} needs a positive max health and cap")]
    InvalidAmmunitionType(String),
    /// Waves must carry positive power.
    #[error("wave power must be positive")]
    NonPositivePower,
    /// The underlying store rejected the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Description of an ammunition type to register.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAmmunitionType {
    /// Display name of the type.
    pub name: String,
    /// Absorption priority; higher lines absorb first.
    pub defense_line: u32,
    /// Health of freshly deployed instances.
    pub max_health: u32,
    /// Maximum number of instances per wall.
    pub cap_per_wall: u32,
}

impl NewAmmunitionType {
    /// Creates a new ammunition type description.
    #[must_use]
    pub fn new(name: &str, defense_line: u32, max_health: u32, cap_per_wall: u32) -> Self {
        Self {
            name: name.to_owned(),
            defense_line,
            max_health,
            cap_per_wall,
        }
    }
}

impl World {
    /// Creates an inactive, unlocked map with `side` tiles per side and no tile records.
    pub fn create_map(&self, side: u32) -> Result<MapId, MutationError> {
        if side == 0 {
            return Err(MutationError::EmptyMap);
        }
        let mut state = self.write()?;
        let id = state.ids.map();
        let _ = state.maps.insert(
            id,
            MapRecord {
                id,
                side,
                active: false,
                locked: false,
            },
        );
        Ok(id)
    }

    /// Adds an unowned tile record at `coord`.
    pub fn add_tile(
        &self,
        map: MapId,
        coord: TileCoord,
        price: u32,
    ) -> Result<TileId, MutationError> {
        let mut state = self.write()?;
        add_tile(&mut state, map, coord, price)
    }

    /// Adds unowned tile records at every coordinate of `map` that lacks one.
    pub fn fill_tiles(&self, map: MapId, price: u32) -> Result<Vec<TileId>, MutationError> {
        let mut state = self.write()?;
        let side = state.map(map)?.side;
        let mut added = Vec::new();
        for y in 0..side {
            for x in 0..side {
                let coord = TileCoord::new(x, y);
                if tile_at(&state, map, coord).is_none() {
                    added.push(add_tile(&mut state, map, coord, price)?);
                }
            }
        }
        Ok(added)
    }

    /// Makes `map` the only active map.
    pub fn activate_map(&self, map: MapId) -> Result<(), MutationError> {
        let mut state = self.write()?;
        let _ = state.map(map)?;
        for record in state.maps.values_mut() {
            record.active = record.id == map;
        }
        info!("map {map} is now the active map");
        Ok(())
    }

    /// Creates a group with a zero score.
    pub fn create_group(&self, name: &str) -> Result<GroupId, MutationError> {
        let mut state = self.write()?;
        let id = state.ids.group();
        let _ = state.groups.insert(
            id,
            Group {
                id,
                name: name.to_owned(),
                score: 0,
            },
        );
        Ok(id)
    }

    /// Registers an ammunition type in the catalogue.
    pub fn register_ammunition_type(
        &self,
        spec: NewAmmunitionType,
    ) -> Result<AmmunitionTypeId, MutationError> {
        if spec.max_health == 0 || spec.cap_per_wall == 0 {
            return Err(MutationError::InvalidAmmunitionType(spec.name));
        }
        let mut state = self.write()?;
        let id = state.ids.ammunition_type();
        let _ = state.ammunition_types.insert(
            id,
            AmmunitionType {
                id,
                name: spec.name,
                defense_line: spec.defense_line,
                max_health: spec.max_health,
                cap_per_wall: spec.cap_per_wall,
            },
        );
        Ok(id)
    }

    /// Transfers the unowned tile at `coord` to `group` and raises its four walls.
    pub fn purchase_tile(
        &self,
        map: MapId,
        coord: TileCoord,
        group: GroupId,
    ) -> Result<TileId, MutationError> {
        let mut state = self.write()?;
        gate::ensure_unlocked(state.map(map)?)?;
        if !state.groups.contains_key(&group) {
            return Err(StoreError::GroupNotFound(group).into());
        }
        let tile = tile_at(&state, map, coord).ok_or(StoreError::TileNotFoundAt { map, coord })?;
        if tile.destroyed {
            return Err(MutationError::TileDestroyed(tile.id));
        }
        if tile.owner.is_some() {
            return Err(MutationError::TileOwned(tile.id));
        }
        let tile_id = tile.id;
        if state.walls.values().any(|wall| wall.tile == tile_id) {
            return Err(StoreError::Integrity(format!(
                "unowned tile {tile_id} already carries walls"
            ))
            .into());
        }

        for direction in Direction::ALL {
            let id = state.ids.wall();
            let tier = WallTier::Tier1;
            let _ = state.walls.insert(
                id,
                WallRecord {
                    id,
                    tile: tile_id,
                    direction,
                    tier,
                    health: tier.max_health(),
                },
            );
        }
        if let Some(record) = state.tiles.get_mut(&tile_id) {
            record.owner = Some(group);
        }
        debug!("group {group} purchased tile {tile_id} at {coord} on map {map}");
        Ok(tile_id)
    }

    /// Raises `wall` to the next tier and restores it to that tier's maximum health.
    pub fn upgrade_wall(&self, wall: WallId, group: GroupId) -> Result<WallTier, MutationError> {
        let mut state = self.write()?;
        let (tile, tier) = {
            let record = state.walls.get(&wall).ok_or(StoreError::WallNotFound(wall))?;
            (record.tile, record.tier)
        };
        authorize(&state, tile, group)?;
        let next = tier.next().ok_or(MutationError::TierMaxed(wall))?;
        if let Some(record) = state.walls.get_mut(&wall) {
            record.tier = next;
            record.health = next.max_health();
        }
        debug!("group {group} upgraded wall {wall} to {next:?}");
        Ok(next)
    }

    /// Deploys a fresh instance of `kind` on `wall`.
    pub fn deploy_ammunition(
        &self,
        wall: WallId,
        kind: AmmunitionTypeId,
        group: GroupId,
    ) -> Result<AmmunitionId, MutationError> {
        let mut state = self.write()?;
        let tile = state
            .walls
            .get(&wall)
            .map(|record| record.tile)
            .ok_or(StoreError::WallNotFound(wall))?;
        authorize(&state, tile, group)?;
        let spec = state
            .ammunition_types
            .get(&kind)
            .cloned()
            .ok_or(StoreError::AmmunitionTypeNotFound(kind))?;
        let deployed = state
            .ammunition
            .values()
            .filter(|instance| instance.wall == wall && instance.kind == kind)
            .count();
        if deployed >= usize::try_from(spec.cap_per_wall).unwrap_or(usize::MAX) {
            return Err(MutationError::AmmunitionCapReached {
                wall,
                kind,
                cap: spec.cap_per_wall,
            });
        }

        let id = state.ids.ammunition();
        let _ = state.ammunition.insert(
            id,
            DeployedAmmunition {
                id,
                wall,
                kind,
                defense_line: spec.defense_line,
                max_health: spec.max_health,
                health: spec.max_health,
            },
        );
        debug!("group {group} deployed {} ({id}) on wall {wall}", spec.name);
        Ok(id)
    }

    /// Schedules a wave of `power` against `map` at `attack_time`.
    pub fn schedule_wave(
        &self,
        map: MapId,
        power: u32,
        attack_time: Timestamp,
        power_visible: bool,
    ) -> Result<WaveId, MutationError> {
        if power == 0 {
            return Err(MutationError::NonPositivePower);
        }
        let mut state = self.write()?;
        let _ = state.map(map)?;
        let id = state.ids.wave();
        let _ = state.waves.insert(
            id,
            AttackWave {
                id,
                map,
                power,
                attack_time,
                executed: false,
                power_visible,
            },
        );
        info!(
            "scheduled wave {id} against map {map} at {}ms",
            attack_time.as_millis()
        );
        Ok(id)
    }

    /// Clears the lock flag of `map` regardless of pending waves.
    ///
    /// Returns whether the map was locked.
    pub fn force_unlock(&self, map: MapId) -> Result<bool, MutationError> {
        let mut state = self.write()?;
        let record = state
            .maps
            .get_mut(&map)
            .ok_or(StoreError::MapNotFound(map))?;
        let was_locked = record.locked;
        record.locked = false;
        info!("map {map} force-unlocked (was locked: {was_locked})");
        Ok(was_locked)
    }

    /// Deletes every tile, wall, ammunition instance and pending wave of `map` and
    /// replaces the tiles with fresh, unowned ones at the same coordinates.
    pub fn reset_map(&self, map: MapId) -> Result<Vec<TileId>, MutationError> {
        let mut state = self.write()?;
        let _ = state.map(map)?;
        let old_tiles: Vec<(TileId, TileCoord, u32)> = state
            .tiles
            .values()
            .filter(|tile| tile.map == map)
            .map(|tile| (tile.id, tile.coord, tile.price))
            .collect();
        let walls: Vec<WallId> = state
            .walls
            .values()
            .filter(|wall| old_tiles.iter().any(|(tile, _, _)| *tile == wall.tile))
            .map(|wall| wall.id)
            .collect();

        state
            .ammunition
            .retain(|_, instance| !walls.contains(&instance.wall));
        state.walls.retain(|id, _| !walls.contains(id));
        state.tiles.retain(|_, tile| tile.map != map);
        state
            .waves
            .retain(|_, wave| wave.map != map || wave.executed);
        if let Some(record) = state.maps.get_mut(&map) {
            record.locked = false;
        }

        let mut fresh = Vec::with_capacity(old_tiles.len());
        for (_, coord, price) in old_tiles {
            fresh.push(add_tile(&mut state, map, coord, price)?);
        }
        info!("map {map} reset with {} fresh tiles", fresh.len());
        Ok(fresh)
    }
}

fn tile_at(state: &WorldState, map: MapId, coord: TileCoord) -> Option<&TileRecord> {
    state
        .tiles
        .values()
        .find(|tile| tile.map == map && tile.coord == coord)
}

fn add_tile(
    state: &mut WorldState,
    map: MapId,
    coord: TileCoord,
    price: u32,
) -> Result<TileId, MutationError> {
    let side = state.map(map)?.side;
    if !coord.within(side) {
        return Err(MutationError::OutOfBounds { map, coord });
    }
    if tile_at(state, map, coord).is_some() {
        return Err(MutationError::DuplicateTile { map, coord });
    }
    let id = state.ids.tile();
    let _ = state.tiles.insert(
        id,
        TileRecord {
            id,
            map,
            coord,
            owner: None,
            destroyed: false,
            price,
        },
    );
    Ok(id)
}

/// Checks the lock gate of the tile's map and that `group` owns the intact tile.
fn authorize(state: &WorldState, tile: TileId, group: GroupId) -> Result<(), MutationError> {
    let map = state.tile_map(tile)?;
    gate::ensure_unlocked(state.map(map)?)?;
    let record = state.tiles.get(&tile).ok_or(StoreError::TileNotFound(tile))?;
    if record.destroyed {
        return Err(MutationError::TileDestroyed(tile));
    }
    if record.owner != Some(group) {
        return Err(MutationError::NotOwner { group, tile });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query;
    use territory_defense_core::{CombatStore, WaveResolution};

    fn setup() -> (World, MapId, GroupId) {
        let world = World::new();
        let map = world.create_map(3).expect("map");
        let _ = world.fill_tiles(map, 10).expect("tiles");
        world.activate_map(map).expect("activate");
        let group = world.create_group("blue").expect("group");
        (world, map, group)
    }

    #[test]
    fn purchase_raises_four_full_health_walls() {
        let (world, map, group) = setup();

        let tile = world
            .purchase_tile(map, TileCoord::new(0, 2), group)
            .expect("purchase");

        let walls = query::walls_of(&world, tile).expect("walls");
        let directions: Vec<_> = walls.iter().map(|wall| wall.direction).collect();
        assert_eq!(directions, Direction::ALL.to_vec());
        assert!(walls
            .iter()
            .all(|wall| wall.tier == WallTier::Tier1 && wall.health == 100));
        assert_eq!(query::tile(&world, tile).expect("tile").owner, Some(group));
    }

    #[test]
    fn purchase_of_owned_tile_is_rejected() {
        let (world, map, group) = setup();
        let rival = world.create_group("green").expect("group");
        let tile = world
            .purchase_tile(map, TileCoord::new(1, 1), group)
            .expect("purchase");

        let error = world
            .purchase_tile(map, TileCoord::new(1, 1), rival)
            .expect_err("owned");

        assert_eq!(error, MutationError::TileOwned(tile));
    }

    #[test]
    fn purchase_of_missing_tile_is_not_found() {
        let world = World::new();
        let map = world.create_map(3).expect("map");
        let group = world.create_group("blue").expect("group");

        let error = world
            .purchase_tile(map, TileCoord::new(2, 2), group)
            .expect_err("missing");

        assert_eq!(
            error,
            MutationError::Store(StoreError::TileNotFoundAt {
                map,
                coord: TileCoord::new(2, 2)
            })
        );
    }

    #[test]
    fn locked_map_rejects_every_gated_mutation() {
        let (world, map, group) = setup();
        let kind = world
            .register_ammunition_type(NewAmmunitionType::new("mine", 1, 10, 2))
            .expect("type");
        let tile = world
            .purchase_tile(map, TileCoord::new(1, 1), group)
            .expect("purchase");
        let wall = query::walls_of(&world, tile).expect("walls")[0].id;
        let _ = world.set_map_locked(map, true).expect("lock");

        assert_eq!(
            world.purchase_tile(map, TileCoord::new(0, 0), group),
            Err(MutationError::MapLocked(map))
        );
        assert_eq!(
            world.upgrade_wall(wall, group),
            Err(MutationError::MapLocked(map))
        );
        assert_eq!(
            world.deploy_ammunition(wall, kind, group),
            Err(MutationError::MapLocked(map))
        );

        assert!(world.force_unlock(map).expect("force unlock"));
        assert_eq!(world.upgrade_wall(wall, group), Ok(WallTier::Tier2));
    }

    #[test]
    fn upgrade_restores_health_and_stops_at_top_tier() {
        let (world, map, group) = setup();
        let tile = world
            .purchase_tile(map, TileCoord::new(1, 1), group)
            .expect("purchase");
        let wall = query::walls_of(&world, tile).expect("walls")[2].id;

        assert_eq!(world.upgrade_wall(wall, group), Ok(WallTier::Tier2));
        assert_eq!(world.upgrade_wall(wall, group), Ok(WallTier::Tier3));
        assert_eq!(
            world.upgrade_wall(wall, group),
            Err(MutationError::TierMaxed(wall))
        );
        assert_eq!(
            query::wall(&world, wall).expect("wall").health,
            WallTier::Tier3.max_health()
        );
    }

    #[test]
    fn upgrade_by_other_group_is_rejected() {
        let (world, map, group) = setup();
        let rival = world.create_group("green").expect("group");
        let tile = world
            .purchase_tile(map, TileCoord::new(1, 1), group)
            .expect("purchase");
        let wall = query::walls_of(&world, tile).expect("walls")[0].id;

        assert_eq!(
            world.upgrade_wall(wall, rival),
            Err(MutationError::NotOwner { group: rival, tile })
        );
    }

    #[test]
    fn deployment_respects_cap_per_type() {
        let (world, map, group) = setup();
        let mine = world
            .register_ammunition_type(NewAmmunitionType::new("mine", 1, 10, 2))
            .expect("type");
        let shield = world
            .register_ammunition_type(NewAmmunitionType::new("shield", 4, 60, 1))
            .expect("type");
        let tile = world
            .purchase_tile(map, TileCoord::new(1, 1), group)
            .expect("purchase");
        let wall = query::walls_of(&world, tile).expect("walls")[0].id;

        let _ = world.deploy_ammunition(wall, mine, group).expect("first");
        let _ = world.deploy_ammunition(wall, mine, group).expect("second");
        assert_eq!(
            world.deploy_ammunition(wall, mine, group),
            Err(MutationError::AmmunitionCapReached {
                wall,
                kind: mine,
                cap: 2
            })
        );
        let shield_id = world.deploy_ammunition(wall, shield, group).expect("shield");

        let deployed = query::ammunition_on(&world, wall).expect("ammunition");
        assert_eq!(deployed.len(), 3);
        let shield_instance = deployed
            .iter()
            .find(|instance| instance.id == shield_id)
            .expect("shield instance");
        assert_eq!(shield_instance.defense_line, 4);
        assert_eq!(shield_instance.health, 60);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let (world, map, _) = setup();

        assert_eq!(world.create_map(0), Err(MutationError::EmptyMap));
        assert_eq!(
            world.add_tile(map, TileCoord::new(3, 0), 1),
            Err(MutationError::OutOfBounds {
                map,
                coord: TileCoord::new(3, 0)
            })
        );
        assert_eq!(
            world.add_tile(map, TileCoord::new(0, 0), 1),
            Err(MutationError::DuplicateTile {
                map,
                coord: TileCoord::new(0, 0)
            })
        );
        assert_eq!(
            world.schedule_wave(map, 0, Timestamp::from_millis(5), true),
            Err(MutationError::NonPositivePower)
        );
        assert!(matches!(
            world.register_ammunition_type(NewAmmunitionType::new("dud", 1, 0, 1)),
            Err(MutationError::InvalidAmmunitionType(_))
        ));
    }

    #[test]
    fn reset_replaces_tiles_and_drops_pending_waves() {
        let (world, map, group) = setup();
        let tile = world
            .purchase_tile(map, TileCoord::new(1, 1), group)
            .expect("purchase");
        let fired = world
            .schedule_wave(map, 10, Timestamp::from_millis(5), true)
            .expect("wave");
        let _ = world
            .schedule_wave(map, 20, Timestamp::from_millis(9), true)
            .expect("wave");
        world
            .apply_wave_result(&WaveResolution::new(map, fired))
            .expect("commit");

        let fresh = world.reset_map(map).expect("reset");

        assert_eq!(fresh.len(), 9);
        assert!(!fresh.contains(&tile));
        let kept = query::waves(&world, map).expect("waves");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, fired);
        assert!(kept[0].executed);
        assert!(world.pending_waves(map).expect("pending").is_empty());
        let topology = world.load_map_topology(map).expect("topology");
        assert!(topology.walls.is_empty());
        assert!(topology.tiles.iter().all(|tile| tile.owner.is_none()));
    }
}
