#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the territory defense engine.
//!
//! This crate defines the grid model and the message surface that connects
//! the authoritative store, the pure combat systems and the host adapters.
//! Stores implement [`CombatStore`] and hand out [`MapTopology`] values, the
//! exposure and damage systems turn a topology into a [`WaveResolution`]
//! unit of work, and the store commits that unit atomically. Observers learn
//! about the outcome through [`Notification`] values pushed into a
//! [`NotificationSink`].

mod error;
mod store;

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

pub use error::{ErrorClass, NotifyError, StoreError};
pub use store::{Clock, CombatStore, NotificationSink};

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(u32);

        impl $name {
            /// Creates a new identifier with the provided numeric value.
            #[must_use]
            pub const fn new(value: u32) -> Self {
                Self(value)
            }

            /// Retrieves the numeric representation of the identifier.
            #[must_use]
            pub const fn get(&self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "#{}", self.0)
            }
        }
    };
}

identifier!(
    /// Unique identifier assigned to a territory map.
    MapId
);
identifier!(
    /// Unique identifier assigned to a tile.
    TileId
);
identifier!(
    /// Unique identifier assigned to a wall.
    WallId
);
identifier!(
    /// Unique identifier assigned to a deployed ammunition instance.
    ///
    /// Identifiers grow with deployment order, so they double as the creation
    /// order used to break defense line ties.
    AmmunitionId
);
identifier!(
    /// Unique identifier assigned to an ammunition type.
    AmmunitionTypeId
);
identifier!(
    /// Unique identifier assigned to an attack wave.
    WaveId
);
identifier!(
    /// Unique identifier assigned to a group of players.
    GroupId
);

/// Wall-clock instant measured in milliseconds since the Unix epoch.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp from milliseconds since the Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the Unix epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Returns the timestamp shifted forward by `delta`, saturating at the maximum.
    #[must_use]
    pub fn saturating_add(self, delta: Duration) -> Self {
        let millis = u64::try_from(delta.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// Time elapsed from `earlier` to `self`, or zero when `earlier` is later.
    #[must_use]
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

/// Cardinal directions a wall can face.
///
/// The grid grows eastwards along `x` and southwards along `y`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Faces decreasing `y`.
    North,
    /// Faces increasing `x`.
    East,
    /// Faces increasing `y`.
    South,
    /// Faces decreasing `x`.
    West,
}

impl Direction {
    /// Every direction in the order walls are created for a tile.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Lowercase label used in logs and scenario files.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::East => "east",
            Self::South => "south",
            Self::West => "west",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Location of a tile expressed as `x` (column) and `y` (row) coordinates.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TileCoord {
    x: u32,
    y: u32,
}

impl TileCoord {
    /// Creates a new tile coordinate.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Zero-based column of the tile.
    #[must_use]
    pub const fn x(&self) -> u32 {
        self.x
    }

    /// Zero-based row of the tile.
    #[must_use]
    pub const fn y(&self) -> u32 {
        self.y
    }

    /// Reports whether the coordinate lies inside a square grid of `side` tiles.
    #[must_use]
    pub const fn within(&self, side: u32) -> bool {
        self.x < side && self.y < side
    }

    /// Coordinate of the neighbouring tile in `direction` on a grid of `side` tiles.
    ///
    /// Returns `None` when the neighbour would fall outside `[0, side)` on either axis.
    #[must_use]
    pub fn neighbor(self, direction: Direction, side: u32) -> Option<TileCoord> {
        let neighbor = match direction {
            Direction::North => TileCoord::new(self.x, self.y.checked_sub(1)?),
            Direction::South => TileCoord::new(self.x, self.y.checked_add(1)?),
            Direction::East => TileCoord::new(self.x.checked_add(1)?, self.y),
            Direction::West => TileCoord::new(self.x.checked_sub(1)?, self.y),
        };
        neighbor.within(side).then_some(neighbor)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Material tier of a wall. Tiers are ordered and each carries a fixed maximum health.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum WallTier {
    /// Material assigned when a tile is purchased.
    Tier1,
    /// First upgrade.
    Tier2,
    /// Strongest material.
    Tier3,
}

impl WallTier {
    /// Maximum health a wall of this tier reaches when built or upgraded.
    #[must_use]
    pub const fn max_health(self) -> u32 {
        match self {
            Self::Tier1 => 100,
            Self::Tier2 => 250,
            Self::Tier3 => 500,
        }
    }

    /// Tier reached by upgrading, or `None` at the top tier.
    #[must_use]
    pub const fn next(self) -> Option<WallTier> {
        match self {
            Self::Tier1 => Some(Self::Tier2),
            Self::Tier2 => Some(Self::Tier3),
            Self::Tier3 => None,
        }
    }
}

/// Persistent state of a territory map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapRecord {
    /// Identifier of the map.
    pub id: MapId,
    /// Number of tiles along each side of the square grid.
    pub side: u32,
    /// Indicates whether the map is the current map processed by the scheduler.
    pub active: bool,
    /// Indicates whether ownership, wall and ammunition mutations are blocked.
    pub locked: bool,
}

/// Persistent state of a single tile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRecord {
    /// Identifier of the tile.
    pub id: TileId,
    /// Map the tile belongs to.
    pub map: MapId,
    /// Position of the tile on its map.
    pub coord: TileCoord,
    /// Group owning the tile, if any.
    pub owner: Option<GroupId>,
    /// Set once the tile has been destroyed. Never reverts.
    pub destroyed: bool,
    /// Purchase price maintained by pricing collaborators.
    pub price: u32,
}

/// Persistent state of a wall guarding one side of a tile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallRecord {
    /// Identifier of the wall.
    pub id: WallId,
    /// Tile the wall belongs to.
    pub tile: TileId,
    /// Side of the tile the wall guards.
    pub direction: Direction,
    /// Material tier of the wall.
    pub tier: WallTier,
    /// Remaining health, bounded by the tier's maximum.
    pub health: u32,
}

/// Catalogue entry describing a kind of ammunition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmmunitionType {
    /// Identifier of the ammunition type.
    pub id: AmmunitionTypeId,
    /// Display name of the ammunition type.
    pub name: String,
    /// Absorption priority; higher lines absorb damage first.
    pub defense_line: u32,
    /// Health assigned to freshly deployed instances.
    pub max_health: u32,
    /// Maximum number of instances of this type on a single wall.
    pub cap_per_wall: u32,
}

/// Ammunition instance deployed on a wall.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedAmmunition {
    /// Identifier of the instance, increasing with deployment order.
    pub id: AmmunitionId,
    /// Wall the instance is deployed on.
    pub wall: WallId,
    /// Ammunition type of the instance.
    pub kind: AmmunitionTypeId,
    /// Absorption priority copied from the type at deployment time.
    pub defense_line: u32,
    /// Health assigned at deployment time.
    pub max_health: u32,
    /// Remaining health.
    pub health: u32,
}

/// Scheduled attack against a map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackWave {
    /// Identifier of the wave.
    pub id: WaveId,
    /// Map the wave strikes.
    pub map: MapId,
    /// Damage dealt to every external wall.
    pub power: u32,
    /// Instant the wave fires.
    pub attack_time: Timestamp,
    /// Set exactly once, when the wave's damage is committed.
    pub executed: bool,
    /// Indicates whether players may see the wave's power before it fires.
    pub power_visible: bool,
}

/// Group of players owning tiles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Identifier of the group.
    pub id: GroupId,
    /// Display name of the group.
    pub name: String,
    /// Score maintained by economic collaborators.
    pub score: i64,
}

/// Wall considered by the exposure detector together with its owning tile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateWall {
    /// Wall under consideration.
    pub wall: WallRecord,
    /// Tile the wall belongs to.
    pub tile: TileRecord,
}

/// Reason a wall is exposed to attack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Exposure {
    /// The wall faces the edge of the map.
    Boundary,
    /// No tile record exists on the neighbouring side.
    MissingNeighbor,
    /// The neighbouring tile has been destroyed.
    DestroyedNeighbor,
}

impl fmt::Display for Exposure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Boundary => "map boundary",
            Self::MissingNeighbor => "missing neighbour",
            Self::DestroyedNeighbor => "destroyed neighbour",
        })
    }
}

/// Wall classified as attackable by the exposure detector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalWall {
    /// Exposed wall.
    pub wall: WallRecord,
    /// Tile owning the wall.
    pub tile: TileRecord,
    /// Why the wall is exposed.
    pub exposure: Exposure,
}

/// Complete state of a map loaded for resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapTopology {
    /// Map being resolved.
    pub map: MapRecord,
    /// Every tile record belonging to the map.
    pub tiles: Vec<TileRecord>,
    /// Every wall of the map's tiles.
    pub walls: Vec<WallRecord>,
    /// Every ammunition instance deployed on the map's walls.
    pub ammunition: Vec<DeployedAmmunition>,
}

impl MapTopology {
    /// Creates a topology containing the provided records.
    #[must_use]
    pub fn new(
        map: MapRecord,
        tiles: Vec<TileRecord>,
        walls: Vec<WallRecord>,
        ammunition: Vec<DeployedAmmunition>,
    ) -> Self {
        Self {
            map,
            tiles,
            walls,
            ammunition,
        }
    }

    /// Looks up a tile by identifier.
    #[must_use]
    pub fn tile(&self, id: TileId) -> Option<&TileRecord> {
        self.tiles.iter().find(|tile| tile.id == id)
    }

    /// Looks up the tile located at `coord`.
    #[must_use]
    pub fn tile_at(&self, coord: TileCoord) -> Option<&TileRecord> {
        self.tiles.iter().find(|tile| tile.coord == coord)
    }

    /// Iterator over the walls of `tile`.
    pub fn walls_of(&self, tile: TileId) -> impl Iterator<Item = &WallRecord> {
        self.walls.iter().filter(move |wall| wall.tile == tile)
    }

    /// Iterator over the ammunition deployed on `wall`.
    pub fn ammunition_on(&self, wall: WallId) -> impl Iterator<Item = &DeployedAmmunition> {
        self.ammunition
            .iter()
            .filter(move |instance| instance.wall == wall)
    }

    /// Counts the intact tiles `group` owns on the map.
    #[must_use]
    pub fn owned_tile_count(&self, group: GroupId) -> usize {
        self.tiles
            .iter()
            .filter(|tile| tile.owner == Some(group) && !tile.destroyed)
            .count()
    }

    /// Walls of owned, intact tiles, ordered by tile identifier then direction.
    #[must_use]
    pub fn candidate_walls(&self) -> Vec<CandidateWall> {
        let mut candidates: Vec<CandidateWall> = self
            .walls
            .iter()
            .filter_map(|wall| {
                let tile = self.tile(wall.tile)?;
                (tile.owner.is_some() && !tile.destroyed).then(|| CandidateWall {
                    wall: wall.clone(),
                    tile: tile.clone(),
                })
            })
            .collect();
        candidates.sort_by_key(|candidate| (candidate.tile.id, candidate.wall.direction));
        candidates
    }

    /// Captures an observer-facing snapshot of the map.
    #[must_use]
    pub fn snapshot(&self) -> MapSnapshot {
        let mut tiles: Vec<TileSnapshot> = self
            .tiles
            .iter()
            .map(|tile| {
                let mut walls: Vec<WallSnapshot> = self
                    .walls_of(tile.id)
                    .map(|wall| {
                        let mut ammunition: Vec<AmmunitionSnapshot> = self
                            .ammunition_on(wall.id)
                            .map(|instance| AmmunitionSnapshot {
                                id: instance.id,
                                kind: instance.kind,
                                defense_line: instance.defense_line,
                                health: instance.health,
                                max_health: instance.max_health,
                            })
                            .collect();
                        ammunition.sort_by_key(|instance| instance.id);
                        WallSnapshot {
                            id: wall.id,
                            direction: wall.direction,
                            tier: wall.tier,
                            health: wall.health,
                            ammunition,
                        }
                    })
                    .collect();
                walls.sort_by_key(|wall| wall.direction);
                TileSnapshot {
                    id: tile.id,
                    coord: tile.coord,
                    owner: tile.owner,
                    destroyed: tile.destroyed,
                    walls,
                }
            })
            .collect();
        tiles.sort_by_key(|tile| (tile.coord.y(), tile.coord.x()));
        MapSnapshot {
            map: self.map.id,
            side: self.map.side,
            active: self.map.active,
            locked: self.map.locked,
            tiles,
        }
    }
}

/// All-or-nothing unit of work produced by resolving one wave.
///
/// Stores commit the unit together with the wave's `executed` flag. Walls of
/// destroyed tiles and the ammunition deployed on them are removed by the
/// commit itself and therefore never appear in the health lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaveResolution {
    /// Map the wave struck.
    pub map: MapId,
    /// Wave being marked as executed.
    pub wave: WaveId,
    /// New health of surviving ammunition instances that absorbed damage.
    pub ammunition_health: Vec<(AmmunitionId, u32)>,
    /// Ammunition instances depleted on walls that survived.
    pub removed_ammunition: Vec<AmmunitionId>,
    /// New health of surviving walls that took damage.
    pub wall_health: Vec<(WallId, u32)>,
    /// Tiles destroyed by the wave.
    pub destroyed_tiles: Vec<TileId>,
}

impl WaveResolution {
    /// Creates an empty unit of work for `wave` on `map`.
    #[must_use]
    pub fn new(map: MapId, wave: WaveId) -> Self {
        Self {
            map,
            wave,
            ammunition_health: Vec::new(),
            removed_ammunition: Vec::new(),
            wall_health: Vec::new(),
            destroyed_tiles: Vec::new(),
        }
    }
}

/// Observer-facing snapshot of a map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSnapshot {
    /// Identifier of the map.
    pub map: MapId,
    /// Number of tiles along each side.
    pub side: u32,
    /// Indicates whether the map is active.
    pub active: bool,
    /// Indicates whether the map is locked.
    pub locked: bool,
    /// Tiles in row-major order.
    pub tiles: Vec<TileSnapshot>,
}

/// Observer-facing snapshot of a tile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSnapshot {
    /// Identifier of the tile.
    pub id: TileId,
    /// Position of the tile.
    pub coord: TileCoord,
    /// Owning group, if any.
    pub owner: Option<GroupId>,
    /// Indicates whether the tile was destroyed.
    pub destroyed: bool,
    /// Walls ordered by direction.
    pub walls: Vec<WallSnapshot>,
}

/// Observer-facing snapshot of a wall.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallSnapshot {
    /// Identifier of the wall.
    pub id: WallId,
    /// Side of the tile the wall guards.
    pub direction: Direction,
    /// Material tier of the wall.
    pub tier: WallTier,
    /// Remaining health.
    pub health: u32,
    /// Deployed ammunition ordered by identifier.
    pub ammunition: Vec<AmmunitionSnapshot>,
}

/// Observer-facing snapshot of a deployed ammunition instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmmunitionSnapshot {
    /// Identifier of the instance.
    pub id: AmmunitionId,
    /// Ammunition type of the instance.
    pub kind: AmmunitionTypeId,
    /// Absorption priority.
    pub defense_line: u32,
    /// Remaining health.
    pub health: u32,
    /// Health assigned at deployment.
    pub max_health: u32,
}

/// Notifications published to observers once game state has been committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Full snapshot of a map after its state changed.
    MapStateChanged {
        /// Map whose state changed.
        map: MapId,
        /// Snapshot captured after the change was committed.
        snapshot: MapSnapshot,
    },
    /// A tile was destroyed and lost its owner.
    TileDestroyed {
        /// Map containing the tile.
        map: MapId,
        /// Destroyed tile.
        tile: TileId,
        /// Position of the destroyed tile.
        coord: TileCoord,
    },
    /// A group lost its last intact tile on a map.
    GroupEliminated {
        /// Map the group was eliminated from.
        map: MapId,
        /// Eliminated group.
        group: GroupId,
        /// Display name of the eliminated group.
        name: String,
    },
    /// The lock flag of a map changed.
    MapLockChanged {
        /// Map whose lock flag changed.
        map: MapId,
        /// New value of the lock flag.
        locked: bool,
    },
}

impl Notification {
    /// Map the notification refers to.
    #[must_use]
    pub const fn map(&self) -> MapId {
        match self {
            Self::MapStateChanged { map, .. }
            | Self::TileDestroyed { map, .. }
            | Self::GroupEliminated { map, .. }
            | Self::MapLockChanged { map, .. } => *map,
        }
    }
}
