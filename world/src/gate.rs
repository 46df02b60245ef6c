//! Map lock gate consulted before ownership, wall and ammunition mutations.
//!
//! The combat scheduler is the only writer of the lock flag during automated
//! play. [`crate::World::force_unlock`] is the administrative override.

use log::debug;
use territory_defense_core::MapRecord;

use crate::MutationError;

/// Rejects the mutation with [`MutationError::MapLocked`] while `map` is locked.
pub fn ensure_unlocked(map: &MapRecord) -> Result<(), MutationError> {
    if map.locked {
        debug!("rejecting mutation on locked map {}", map.id);
        return Err(MutationError::MapLocked(map.id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use territory_defense_core::MapId;

    fn map(locked: bool) -> MapRecord {
        MapRecord {
            id: MapId::new(4),
            side: 3,
            active: true,
            locked,
        }
    }

    #[test]
    fn open_map_passes() {
        assert_eq!(ensure_unlocked(&map(false)), Ok(()));
    }

    #[test]
    fn locked_map_is_rejected() {
        assert_eq!(
            ensure_unlocked(&map(true)),
            Err(MutationError::MapLocked(MapId::new(4)))
        );
    }
}
