//! Error types shared by stores, systems and adapters.

use thiserror::Error;

use crate::{AmmunitionId, AmmunitionTypeId, GroupId, MapId, TileCoord, TileId, WallId, WaveId};

/// Broad category of a failure, used to decide how callers react to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// A referenced record does not exist.
    NotFound,
    /// The requested work has already been done or cannot start.
    Precondition,
    /// Stored records violate a data model invariant.
    Integrity,
    /// The store failed to read or commit.
    Persistence,
}

/// Failures reported by a [`crate::CombatStore`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No map with the provided identifier exists.
    #[error("map {0} not found")]
    MapNotFound(MapId),
    /// No tile with the provided identifier exists.
    #[error("tile {0} not found")]
    TileNotFound(TileId),
    /// No tile record exists at the provided coordinate.
    #[error("no tile at {coord} on map {map}")]
    TileNotFoundAt {
        /// Map that was searched.
        map: MapId,
        /// Coordinate that holds no tile.
        coord: TileCoord,
    },
    /// No wall with the provided identifier exists.
    #[error("wall {0} not found")]
    WallNotFound(WallId),
    /// No deployed ammunition with the provided identifier exists.
    #[error("ammunition {0} not found")]
    AmmunitionNotFound(AmmunitionId),
    /// No ammunition type with the provided identifier exists.
    #[error("ammunition type {0} not found")]
    AmmunitionTypeNotFound(AmmunitionTypeId),
    /// No wave with the provided identifier exists.
    #[error("wave {0} not found")]
    WaveNotFound(WaveId),
    /// No group with the provided identifier exists.
    #[error("group {0} not found")]
    GroupNotFound(GroupId),
    /// The wave's damage has already been committed.
    #[error("wave {0} was already executed")]
    WaveAlreadyExecuted(WaveId),
    /// Stored records violate a data model invariant.
    #[error("integrity violation: {0}")]
    Integrity(String),
    /// The store could not complete a read or commit.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl StoreError {
    /// Category the error belongs to.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::MapNotFound(_)
            | Self::TileNotFound(_)
            | Self::TileNotFoundAt { .. }
            | Self::WallNotFound(_)
            | Self::AmmunitionNotFound(_)
            | Self::AmmunitionTypeNotFound(_)
            | Self::WaveNotFound(_)
            | Self::GroupNotFound(_) => ErrorClass::NotFound,
            Self::WaveAlreadyExecuted(_) => ErrorClass::Precondition,
            Self::Integrity(_) => ErrorClass::Integrity,
            Self::Persistence(_) => ErrorClass::Persistence,
        }
    }
}

/// Failures reported by a [`crate::NotificationSink`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// The sink could not accept the notification.
    #[error("notification sink unavailable: {0}")]
    Unavailable(String),
}
