#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that distributes wave damage through defensive layers.
//!
//! Every external wall receives the full power of the wave. Deployed
//! ammunition absorbs first, highest defense line first, with ties broken by
//! deployment order. Whatever is left strikes the wall itself, and anything
//! beyond the wall's health is discarded. A wall reaching zero health
//! destroys its tile, which removes every wall and ammunition instance of
//! that tile and may eliminate the tile's previous owner.
//!
//! The resolver mutates a working copy of the map and records the changes as
//! a [`WaveResolution`] that the store commits atomically.

mod cascade;

use std::{collections::BTreeSet, fmt};

use log::{debug, info};
use territory_defense_core::{
    AmmunitionId, Direction, Exposure, ExternalWall, GroupId, MapTopology, TileCoord, TileId,
    WallId, WaveId, WaveResolution,
};

pub use cascade::DestroyedTile;

/// Damage absorbed by a single ammunition instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AmmunitionHit {
    /// Instance that absorbed the damage.
    pub ammunition: AmmunitionId,
    /// Defense line of the instance.
    pub defense_line: u32,
    /// Health before the hit.
    pub before: u32,
    /// Health after the hit.
    pub after: u32,
}

/// Per-wall record of how one wave's power was spent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WallDamageLog {
    /// Wall that was struck.
    pub wall: WallId,
    /// Tile owning the wall.
    pub tile: TileId,
    /// Position of the tile.
    pub coord: TileCoord,
    /// Side of the tile the wall guards.
    pub direction: Direction,
    /// Why the wall was exposed.
    pub exposure: Exposure,
    /// Power the wall received.
    pub power: u32,
    /// Ammunition hits in absorption order.
    pub hits: Vec<AmmunitionHit>,
    /// Wall health before the strike.
    pub wall_before: u32,
    /// Wall health after the strike.
    pub wall_after: u32,
    /// Power left over after the wall reached zero.
    pub discarded: u32,
}

impl WallDamageLog {
    /// Reports whether the strike brought the wall down.
    #[must_use]
    pub const fn breached(&self) -> bool {
        self.wall_after == 0
    }
}

impl fmt::Display for WallDamageLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wall {} ({} side of tile {} at {}, {}): power {}",
            self.wall, self.direction, self.tile, self.coord, self.exposure, self.power
        )?;
        for hit in &self.hits {
            write!(
                f,
                "; ammunition {} [line {}] {} -> {}",
                hit.ammunition, hit.defense_line, hit.before, hit.after
            )?;
        }
        write!(f, "; wall {} -> {}", self.wall_before, self.wall_after)?;
        if self.discarded > 0 {
            write!(f, "; {} discarded", self.discarded)?;
        }
        if self.breached() {
            f.write_str("; tile destroyed")?;
        }
        Ok(())
    }
}

/// Everything one wave did to a map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaveDamage {
    /// Unit of work to commit.
    pub resolution: WaveResolution,
    /// Per-wall damage in strike order.
    pub walls: Vec<WallDamageLog>,
    /// Targets skipped because their tile fell earlier in the same wave.
    pub skipped: Vec<WallId>,
    /// Tiles destroyed by the wave in destruction order.
    pub destroyed: Vec<DestroyedTile>,
    /// Groups left without intact tiles on the map.
    pub eliminated: Vec<GroupId>,
}

/// Damage resolver that reuses its scratch buffers between waves.
#[derive(Debug, Default)]
pub struct DamageResolver {
    order: Vec<usize>,
    touched_ammunition: BTreeSet<AmmunitionId>,
    touched_walls: BTreeSet<WallId>,
}

impl DamageResolver {
    /// Creates a new resolver with empty scratch buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a wave of `power` to every wall in `targets`.
    ///
    /// `topology` is the working copy of the map and is left in the state the
    /// returned [`WaveResolution`] describes.
    pub fn resolve(
        &mut self,
        topology: &mut MapTopology,
        wave: WaveId,
        power: u32,
        targets: &[ExternalWall],
    ) -> WaveDamage {
        self.touched_ammunition.clear();
        self.touched_walls.clear();
        let mut damage = WaveDamage {
            resolution: WaveResolution::new(topology.map.id, wave),
            walls: Vec::with_capacity(targets.len()),
            skipped: Vec::new(),
            destroyed: Vec::new(),
            eliminated: Vec::new(),
        };

        for target in targets {
            let Some(log) = self.strike(topology, power, target) else {
                debug!(
                    "wave {wave}: skipping wall {}, its tile already fell",
                    target.wall.id
                );
                damage.skipped.push(target.wall.id);
                continue;
            };
            debug!("wave {wave}: {log}");
            let breached = log.breached();
            let tile = log.tile;
            damage.walls.push(log);
            if breached {
                self.collapse(topology, wave, tile, &mut damage);
            }
        }

        damage.resolution.removed_ammunition = topology
            .ammunition
            .iter()
            .filter(|instance| instance.health == 0)
            .map(|instance| instance.id)
            .collect();
        topology.ammunition.retain(|instance| instance.health > 0);

        damage.resolution.ammunition_health = topology
            .ammunition
            .iter()
            .filter(|instance| self.touched_ammunition.contains(&instance.id))
            .map(|instance| (instance.id, instance.health))
            .collect();
        damage.resolution.wall_health = topology
            .walls
            .iter()
            .filter(|wall| self.touched_walls.contains(&wall.id))
            .map(|wall| (wall.id, wall.health))
            .collect();
        damage.resolution.destroyed_tiles = damage.destroyed.iter().map(|tile| tile.tile).collect();
        damage
    }

    fn strike(
        &mut self,
        topology: &mut MapTopology,
        power: u32,
        target: &ExternalWall,
    ) -> Option<WallDamageLog> {
        let wall_id = target.wall.id;
        let wall_index = topology.walls.iter().position(|wall| wall.id == wall_id)?;

        self.order.clear();
        self.order.extend(
            topology
                .ammunition
                .iter()
                .enumerate()
                .filter(|(_, instance)| instance.wall == wall_id)
                .map(|(index, _)| index),
        );
        let ammunition = &topology.ammunition;
        self.order.sort_by(|&left, &right| {
            let (left, right) = (&ammunition[left], &ammunition[right]);
            right
                .defense_line
                .cmp(&left.defense_line)
                .then_with(|| left.id.cmp(&right.id))
        });

        let mut remaining = power;
        let mut hits = Vec::new();
        for &index in &self.order {
            if remaining == 0 {
                break;
            }
            let instance = &mut topology.ammunition[index];
            if instance.health == 0 {
                continue;
            }
            let before = instance.health;
            let dealt = remaining.min(before);
            instance.health -= dealt;
            remaining -= dealt;
            let _ = self.touched_ammunition.insert(instance.id);
            hits.push(AmmunitionHit {
                ammunition: instance.id,
                defense_line: instance.defense_line,
                before,
                after: instance.health,
            });
        }

        let wall = &mut topology.walls[wall_index];
        let wall_before = wall.health;
        if remaining > 0 && wall.health > 0 {
            let dealt = remaining.min(wall.health);
            wall.health -= dealt;
            remaining -= dealt;
            let _ = self.touched_walls.insert(wall.id);
        }

        Some(WallDamageLog {
            wall: wall.id,
            tile: wall.tile,
            coord: target.tile.coord,
            direction: wall.direction,
            exposure: target.exposure,
            power,
            hits,
            wall_before,
            wall_after: wall.health,
            discarded: remaining,
        })
    }

    fn collapse(
        &mut self,
        topology: &mut MapTopology,
        wave: WaveId,
        tile: TileId,
        damage: &mut WaveDamage,
    ) {
        let Some(destroyed) = cascade::destroy_tile(topology, tile) else {
            return;
        };
        info!(
            "wave {wave}: tile {} at {} destroyed ({} walls, {} ammunition removed)",
            destroyed.tile, destroyed.coord, destroyed.walls_removed, destroyed.ammunition_removed
        );
        if let Some(owner) = destroyed.previous_owner {
            if cascade::is_eliminated(topology, owner) && !damage.eliminated.contains(&owner) {
                info!(
                    "wave {wave}: group {owner} lost its last tile on map {}",
                    topology.map.id
                );
                damage.eliminated.push(owner);
            }
        }
        damage.destroyed.push(destroyed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use territory_defense_core::{
        AmmunitionTypeId, DeployedAmmunition, MapId, MapRecord, TileRecord, WallRecord, WallTier,
    };

    struct Board {
        topology: MapTopology,
        next_id: u32,
    }

    impl Board {
        fn new(side: u32) -> Self {
            Self {
                topology: MapTopology::new(
                    MapRecord {
                        id: MapId::new(1),
                        side,
                        active: true,
                        locked: false,
                    },
                    Vec::new(),
                    Vec::new(),
                    Vec::new(),
                ),
                next_id: 0,
            }
        }

        fn id(&mut self) -> u32 {
            self.next_id += 1;
            self.next_id
        }

        fn owned_tile(&mut self, x: u32, y: u32, owner: u32) -> TileId {
            let tile = TileId::new(self.id());
            self.topology.tiles.push(TileRecord {
                id: tile,
                map: MapId::new(1),
                coord: TileCoord::new(x, y),
                owner: Some(GroupId::new(owner)),
                destroyed: false,
                price: 0,
            });
            for direction in Direction::ALL {
                let id = WallId::new(self.id());
                self.topology.walls.push(WallRecord {
                    id,
                    tile,
                    direction,
                    tier: WallTier::Tier1,
                    health: WallTier::Tier1.max_health(),
                });
            }
            tile
        }

        fn wall(&self, tile: TileId, direction: Direction) -> WallRecord {
            self.topology
                .walls
                .iter()
                .find(|wall| wall.tile == tile && wall.direction == direction)
                .cloned()
                .expect("wall")
        }

        fn arm(&mut self, wall: WallId, defense_line: u32, health: u32) -> AmmunitionId {
            let id = AmmunitionId::new(self.id());
            self.topology.ammunition.push(DeployedAmmunition {
                id,
                wall,
                kind: AmmunitionTypeId::new(defense_line),
                defense_line,
                max_health: health,
                health,
            });
            id
        }

        fn target(&self, tile: TileId, direction: Direction) -> ExternalWall {
            ExternalWall {
                wall: self.wall(tile, direction),
                tile: self.topology.tile(tile).cloned().expect("tile"),
                exposure: Exposure::Boundary,
            }
        }

        fn health_of(&self, ammunition: AmmunitionId) -> Option<u32> {
            self.topology
                .ammunition
                .iter()
                .find(|instance| instance.id == ammunition)
                .map(|instance| instance.health)
        }
    }

    #[test]
    fn highest_defense_line_absorbs_first() {
        let mut board = Board::new(3);
        let tile = board.owned_tile(0, 0, 1);
        let wall = board.wall(tile, Direction::North).id;
        let rear = board.arm(wall, 3, 30);
        let front = board.arm(wall, 5, 20);
        let targets = vec![board.target(tile, Direction::North)];

        let damage =
            DamageResolver::new().resolve(&mut board.topology, WaveId::new(1), 25, &targets);

        assert_eq!(board.health_of(front), None, "depleted instance is removed");
        assert_eq!(board.health_of(rear), Some(25));
        assert_eq!(board.wall(tile, Direction::North).health, 100);
        assert_eq!(damage.resolution.removed_ammunition, vec![front]);
        assert_eq!(damage.resolution.ammunition_health, vec![(rear, 25)]);
        assert!(damage.resolution.wall_health.is_empty());
        let hits: Vec<_> = damage.walls[0]
            .hits
            .iter()
            .map(|hit| (hit.ammunition, hit.before, hit.after))
            .collect();
        assert_eq!(hits, vec![(front, 20, 0), (rear, 30, 25)]);
    }

    #[test]
    fn equal_lines_absorb_in_deployment_order() {
        let mut board = Board::new(3);
        let tile = board.owned_tile(0, 0, 1);
        let wall = board.wall(tile, Direction::West).id;
        let first = board.arm(wall, 2, 10);
        let second = board.arm(wall, 2, 10);
        let targets = vec![board.target(tile, Direction::West)];

        let _ = DamageResolver::new().resolve(&mut board.topology, WaveId::new(1), 15, &targets);

        assert_eq!(board.health_of(first), None);
        assert_eq!(board.health_of(second), Some(5));
    }

    #[test]
    fn every_target_receives_full_power() {
        let mut board = Board::new(3);
        let tile = board.owned_tile(0, 0, 1);
        let targets = vec![
            board.target(tile, Direction::North),
            board.target(tile, Direction::West),
        ];

        let damage =
            DamageResolver::new().resolve(&mut board.topology, WaveId::new(1), 40, &targets);

        assert_eq!(board.wall(tile, Direction::North).health, 60);
        assert_eq!(board.wall(tile, Direction::West).health, 60);
        assert_eq!(damage.resolution.wall_health.len(), 2);
        assert!(damage.walls.iter().all(|log| log.power == 40));
    }

    #[test]
    fn excess_power_is_discarded_not_spread() {
        let mut board = Board::new(3);
        let tile = board.owned_tile(0, 0, 1);
        let neighbour = board.owned_tile(1, 0, 2);
        let targets = vec![board.target(tile, Direction::North)];

        let damage =
            DamageResolver::new().resolve(&mut board.topology, WaveId::new(1), 250, &targets);

        assert_eq!(damage.walls[0].discarded, 150);
        assert!(board
            .topology
            .walls_of(neighbour)
            .all(|wall| wall.health == 100));
    }

    #[test]
    fn wall_reaching_exactly_zero_destroys_its_tile() {
        let mut board = Board::new(3);
        let tile = board.owned_tile(0, 0, 1);
        let _keep = board.owned_tile(2, 2, 1);
        let north = board.wall(tile, Direction::North).id;
        let east = board.wall(tile, Direction::East).id;
        let guard = board.arm(east, 1, 50);
        let _ = board.arm(north, 4, 40);
        let targets = vec![board.target(tile, Direction::North)];

        let damage =
            DamageResolver::new().resolve(&mut board.topology, WaveId::new(1), 140, &targets);

        let record = board.topology.tile(tile).expect("tile");
        assert!(record.destroyed);
        assert_eq!(record.owner, None);
        assert_eq!(board.topology.walls_of(tile).count(), 0);
        assert_eq!(board.health_of(guard), None);
        assert_eq!(damage.resolution.destroyed_tiles, vec![tile]);
        assert!(damage.resolution.wall_health.is_empty());
        assert!(damage.resolution.ammunition_health.is_empty());
        assert!(damage.resolution.removed_ammunition.is_empty());
        assert_eq!(damage.walls[0].discarded, 0);
        assert!(damage.eliminated.is_empty(), "group still holds a tile");
        assert_eq!(damage.destroyed[0].previous_owner, Some(GroupId::new(1)));
        assert_eq!(damage.destroyed[0].walls_removed, 4);
        assert_eq!(damage.destroyed[0].ammunition_removed, 2);
    }

    #[test]
    fn losing_the_only_tile_eliminates_the_group() {
        let mut board = Board::new(3);
        let lone = board.owned_tile(0, 0, 1);
        let first = board.owned_tile(2, 0, 2);
        let _second = board.owned_tile(2, 2, 2);
        let targets = vec![
            board.target(lone, Direction::North),
            board.target(first, Direction::North),
        ];

        let damage =
            DamageResolver::new().resolve(&mut board.topology, WaveId::new(1), 100, &targets);

        assert_eq!(damage.destroyed.len(), 2);
        assert_eq!(damage.eliminated, vec![GroupId::new(1)]);
    }

    #[test]
    fn walls_of_a_fallen_tile_are_skipped() {
        let mut board = Board::new(3);
        let tile = board.owned_tile(0, 0, 1);
        let targets = vec![
            board.target(tile, Direction::North),
            board.target(tile, Direction::West),
        ];

        let damage =
            DamageResolver::new().resolve(&mut board.topology, WaveId::new(1), 100, &targets);

        assert_eq!(damage.walls.len(), 1);
        assert_eq!(damage.skipped, vec![targets[1].wall.id]);
        assert_eq!(damage.destroyed.len(), 1);
    }

    #[test]
    fn depleted_instances_left_from_earlier_waves_are_removed() {
        let mut board = Board::new(3);
        let tile = board.owned_tile(1, 1, 1);
        let south = board.wall(tile, Direction::South).id;
        let husk = board.arm(south, 1, 10);
        if let Some(instance) = board
            .topology
            .ammunition
            .iter_mut()
            .find(|instance| instance.id == husk)
        {
            instance.health = 0;
        }

        let damage = DamageResolver::new().resolve(&mut board.topology, WaveId::new(2), 10, &[]);

        assert_eq!(damage.resolution.removed_ammunition, vec![husk]);
        assert!(board.topology.ammunition.is_empty());
    }

    #[test]
    fn log_line_describes_each_step() {
        let mut board = Board::new(3);
        let tile = board.owned_tile(0, 0, 1);
        let wall = board.wall(tile, Direction::North).id;
        let _ = board.arm(wall, 5, 20);
        let targets = vec![board.target(tile, Direction::North)];

        let damage =
            DamageResolver::new().resolve(&mut board.topology, WaveId::new(1), 30, &targets);

        let line = damage.walls[0].to_string();
        assert!(line.contains("power 30"), "{line}");
        assert!(line.contains("[line 5] 20 -> 0"), "{line}");
        assert!(line.contains("wall 100 -> 90"), "{line}");
        assert!(!line.contains("tile destroyed"), "{line}");
    }
}
