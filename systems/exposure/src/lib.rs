#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that classifies which walls of a map are exposed to attack.
//!
//! A wall is external when the neighbouring coordinate in its direction lies
//! outside the map, holds no tile record, or holds a destroyed tile. An intact
//! neighbour shields the wall whether or not anybody owns it, so walls only
//! become external through neighbour destruction.

use std::collections::HashMap;

use thiserror::Error;
use territory_defense_core::{
    CombatStore, Direction, Exposure, ExternalWall, MapId, MapTopology, StoreError, TileCoord,
    TileId,
};

/// Failures raised while classifying walls.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ExposureError {
    /// A tile in the topology belongs to a different map than the one loaded.
    #[error("tile {tile} references map {referenced}, which is not the loaded map {loaded}")]
    ForeignTile {
        /// Offending tile.
        tile: TileId,
        /// Map the tile claims to belong to.
        referenced: MapId,
        /// Map the topology was loaded for.
        loaded: MapId,
    },
    /// Two tiles claim the same coordinate.
    #[error("tiles {first} and {second} both occupy {coord}")]
    DuplicateCoordinate {
        /// Coordinate claimed twice.
        coord: TileCoord,
        /// Tile indexed first.
        first: TileId,
        /// Tile indexed second.
        second: TileId,
    },
    /// The topology could not be loaded.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Exposure detector that reuses its coordinate index between calls.
#[derive(Debug, Default)]
pub struct ExposureDetector {
    index: HashMap<TileCoord, (TileId, bool)>,
}

impl ExposureDetector {
    /// Creates a new detector with an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every external wall of the owned, intact tiles in `topology`.
    ///
    /// Results are ordered row-major by tile coordinate, then by direction.
    pub fn find_external_walls(
        &mut self,
        topology: &MapTopology,
    ) -> Result<Vec<ExternalWall>, ExposureError> {
        self.index.clear();
        let loaded = topology.map.id;
        for tile in &topology.tiles {
            if tile.map != loaded {
                return Err(ExposureError::ForeignTile {
                    tile: tile.id,
                    referenced: tile.map,
                    loaded,
                });
            }
            if let Some((first, _)) = self.index.insert(tile.coord, (tile.id, tile.destroyed)) {
                return Err(ExposureError::DuplicateCoordinate {
                    coord: tile.coord,
                    first,
                    second: tile.id,
                });
            }
        }

        let side = topology.map.side;
        let mut external: Vec<ExternalWall> = topology
            .candidate_walls()
            .into_iter()
            .filter_map(|candidate| {
                let exposure = self.classify(candidate.tile.coord, candidate.wall.direction, side)?;
                Some(ExternalWall {
                    wall: candidate.wall,
                    tile: candidate.tile,
                    exposure,
                })
            })
            .collect();
        external.sort_by_key(|wall| {
            (
                wall.tile.coord.y(),
                wall.tile.coord.x(),
                wall.wall.direction,
            )
        });
        Ok(external)
    }

    fn classify(
        &self,
        coord: TileCoord,
        direction: Direction,
        side: u32,
    ) -> Option<Exposure> {
        let Some(neighbor) = coord.neighbor(direction, side) else {
            return Some(Exposure::Boundary);
        };
        match self.index.get(&neighbor) {
            None => Some(Exposure::MissingNeighbor),
            Some((_, true)) => Some(Exposure::DestroyedNeighbor),
            Some((_, false)) => None,
        }
    }
}

/// Loads the topology of `map` from `store` and returns its external walls.
pub fn find_external_walls<S>(store: &S, map: MapId) -> Result<Vec<ExternalWall>, ExposureError>
where
    S: CombatStore + ?Sized,
{
    let topology = store.load_map_topology(map)?;
    ExposureDetector::new().find_external_walls(&topology)
}

#[cfg(test)]
mod tests {
    use super::*;
    use territory_defense_core::{GroupId, MapRecord, TileRecord, WallId, WallRecord, WallTier};

    struct Fixture {
        side: u32,
        tiles: Vec<TileRecord>,
        walls: Vec<WallRecord>,
    }

    impl Fixture {
        fn new(side: u32) -> Self {
            Self {
                side,
                tiles: Vec::new(),
                walls: Vec::new(),
            }
        }

        fn tile(&mut self, x: u32, y: u32, owner: Option<u32>, destroyed: bool) -> TileId {
            let id = TileId::new(self.tiles.len() as u32 + 1);
            self.tiles.push(TileRecord {
                id,
                map: MapId::new(1),
                coord: TileCoord::new(x, y),
                owner: owner.map(GroupId::new),
                destroyed,
                price: 0,
            });
            if owner.is_some() && !destroyed {
                for direction in Direction::ALL {
                    let wall = WallId::new(self.walls.len() as u32 + 1);
                    self.walls.push(WallRecord {
                        id: wall,
                        tile: id,
                        direction,
                        tier: WallTier::Tier1,
                        health: 100,
                    });
                }
            }
            id
        }

        fn topology(&self) -> MapTopology {
            MapTopology::new(
                MapRecord {
                    id: MapId::new(1),
                    side: self.side,
                    active: true,
                    locked: false,
                },
                self.tiles.clone(),
                self.walls.clone(),
                Vec::new(),
            )
        }
    }

    fn directions_of(external: &[ExternalWall], tile: TileId) -> Vec<Direction> {
        external
            .iter()
            .filter(|wall| wall.tile.id == tile)
            .map(|wall| wall.wall.direction)
            .collect()
    }

    #[test]
    fn corner_tile_exposes_two_boundary_walls() {
        let mut fixture = Fixture::new(3);
        for y in 0..3 {
            for x in 0..3 {
                let owner = if x == 0 && y == 0 { Some(1) } else { None };
                let _ = fixture.tile(x, y, owner, false);
            }
        }
        let corner = fixture.tiles[0].id;

        let external = ExposureDetector::new()
            .find_external_walls(&fixture.topology())
            .expect("external walls");

        assert_eq!(
            directions_of(&external, corner),
            vec![Direction::North, Direction::West]
        );
        assert!(external
            .iter()
            .all(|wall| wall.exposure == Exposure::Boundary));
    }

    #[test]
    fn corner_tile_reports_each_exposure_reason() {
        let mut fixture = Fixture::new(3);
        let corner = fixture.tile(2, 2, Some(1), false);
        let _ = fixture.tile(1, 2, None, true);

        let external = ExposureDetector::new()
            .find_external_walls(&fixture.topology())
            .expect("external walls");

        let exposures: Vec<_> = external
            .iter()
            .filter(|wall| wall.tile.id == corner)
            .map(|wall| (wall.wall.direction, wall.exposure))
            .collect();
        assert_eq!(
            exposures,
            vec![
                (Direction::North, Exposure::MissingNeighbor),
                (Direction::East, Exposure::Boundary),
                (Direction::South, Exposure::Boundary),
                (Direction::West, Exposure::DestroyedNeighbor),
            ]
        );
    }

    #[test]
    fn surrounded_interior_tile_is_fully_shielded() {
        let mut fixture = Fixture::new(3);
        let centre = fixture.tile(1, 1, Some(1), false);
        let _ = fixture.tile(0, 1, None, false);
        let _ = fixture.tile(1, 0, Some(2), false);
        let _ = fixture.tile(1, 2, None, false);
        let _ = fixture.tile(2, 1, Some(1), false);

        let external = ExposureDetector::new()
            .find_external_walls(&fixture.topology())
            .expect("external walls");

        assert!(directions_of(&external, centre).is_empty());
    }

    #[test]
    fn destroyed_neighbour_exposes_adjacent_wall_only() {
        let mut fixture = Fixture::new(3);
        let centre = fixture.tile(1, 1, Some(1), false);
        let _ = fixture.tile(0, 1, None, true);
        let _ = fixture.tile(1, 0, None, false);
        let _ = fixture.tile(1, 2, None, false);
        let _ = fixture.tile(2, 1, None, false);

        let external = ExposureDetector::new()
            .find_external_walls(&fixture.topology())
            .expect("external walls");

        assert_eq!(directions_of(&external, centre), vec![Direction::West]);
        assert_eq!(external[0].exposure, Exposure::DestroyedNeighbor);
    }

    #[test]
    fn unowned_tiles_contribute_no_walls() {
        let mut fixture = Fixture::new(2);
        let _ = fixture.tile(0, 0, None, false);

        let external = ExposureDetector::new()
            .find_external_walls(&fixture.topology())
            .expect("external walls");

        assert!(external.is_empty());
    }

    #[test]
    fn empty_map_yields_empty_list() {
        let fixture = Fixture::new(4);

        let external = ExposureDetector::new()
            .find_external_walls(&fixture.topology())
            .expect("external walls");

        assert!(external.is_empty());
    }

    #[test]
    fn foreign_tile_is_an_integrity_error() {
        let mut fixture = Fixture::new(3);
        let _ = fixture.tile(0, 0, Some(1), false);
        fixture.tiles[0].map = MapId::new(9);

        let error = ExposureDetector::new()
            .find_external_walls(&fixture.topology())
            .expect_err("foreign tile");

        assert_eq!(
            error,
            ExposureError::ForeignTile {
                tile: TileId::new(1),
                referenced: MapId::new(9),
                loaded: MapId::new(1),
            }
        );
    }

    #[test]
    fn duplicate_coordinates_are_rejected() {
        let mut fixture = Fixture::new(3);
        let first = fixture.tile(1, 1, None, false);
        let second = fixture.tile(1, 1, None, false);

        let error = ExposureDetector::new()
            .find_external_walls(&fixture.topology())
            .expect_err("duplicate");

        assert_eq!(
            error,
            ExposureError::DuplicateCoordinate {
                coord: TileCoord::new(1, 1),
                first,
                second,
            }
        );
    }

    #[test]
    fn store_backed_lookup_classifies_the_loaded_map() {
        let world = territory_defense_world::World::new();
        let map = world.create_map(2).expect("map");
        let _ = world.fill_tiles(map, 1).expect("tiles");
        let group = world.create_group("solo").expect("group");
        let tile = world
            .purchase_tile(map, TileCoord::new(1, 1), group)
            .expect("purchase");

        let external = find_external_walls(&world, map).expect("external walls");

        assert_eq!(
            directions_of(&external, tile),
            vec![Direction::East, Direction::South]
        );
        assert_eq!(
            find_external_walls(&world, MapId::new(99)),
            Err(ExposureError::Store(StoreError::MapNotFound(MapId::new(99))))
        );
    }
}
