use territory_defense_core::{GroupId, MapTopology, TileCoord, TileId, WallId};

/// Tile removed from play by a wave.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestroyedTile {
    /// Destroyed tile.
    pub tile: TileId,
    /// Position of the destroyed tile.
    pub coord: TileCoord,
    /// Group that owned the tile before it fell.
    pub previous_owner: Option<GroupId>,
    /// Number of walls removed with the tile.
    pub walls_removed: usize,
    /// Number of ammunition instances removed with the tile.
    pub ammunition_removed: usize,
}

/// Marks `tile` destroyed and strips its walls and their ammunition.
///
/// Returns `None` when the tile is unknown or already destroyed.
pub(crate) fn destroy_tile(topology: &mut MapTopology, tile: TileId) -> Option<DestroyedTile> {
    let record = topology
        .tiles
        .iter_mut()
        .find(|record| record.id == tile && !record.destroyed)?;
    let previous_owner = record.owner.take();
    record.destroyed = true;
    let coord = record.coord;

    let walls: Vec<WallId> = topology.walls_of(tile).map(|wall| wall.id).collect();
    let ammunition_before = topology.ammunition.len();
    topology
        .ammunition
        .retain(|instance| !walls.contains(&instance.wall));
    topology.walls.retain(|wall| wall.tile != tile);

    Some(DestroyedTile {
        tile,
        coord,
        previous_owner,
        walls_removed: walls.len(),
        ammunition_removed: ammunition_before - topology.ammunition.len(),
    })
}

/// A group is eliminated once it owns no intact tile on the map.
pub(crate) fn is_eliminated(topology: &MapTopology, group: GroupId) -> bool {
    topology.owned_tile_count(group) == 0
}
