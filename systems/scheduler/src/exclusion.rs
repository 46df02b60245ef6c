use std::{
    collections::BTreeSet,
    sync::{Mutex, MutexGuard, PoisonError},
};

use territory_defense_core::MapId;

/// Set of maps currently being worked on inside this process.
#[derive(Debug, Default)]
pub(crate) struct MapExclusion {
    busy: Mutex<BTreeSet<MapId>>,
}

impl MapExclusion {
    /// Claims `map`, or returns `None` when another worker already holds it.
    pub(crate) fn try_acquire(&self, map: MapId) -> Option<MapGuard<'_>> {
        let claimed = self.busy().insert(map);
        claimed.then(|| MapGuard { owner: self, map })
    }

    fn busy(&self) -> MutexGuard<'_, BTreeSet<MapId>> {
        // Single insert/remove calls cannot leave the set half-updated.
        self.busy.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases its map when dropped.
#[derive(Debug)]
pub(crate) struct MapGuard<'a> {
    owner: &'a MapExclusion,
    map: MapId,
}

impl Drop for MapGuard<'_> {
    fn drop(&mut self) {
        let _ = self.owner.busy().remove(&self.map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_on_the_same_map_is_rejected() {
        let exclusion = MapExclusion::default();
        let _held = exclusion.try_acquire(MapId::new(1)).expect("first claim");

        assert!(exclusion.try_acquire(MapId::new(1)).is_none());
        assert!(exclusion.try_acquire(MapId::new(2)).is_some());
    }

    #[test]
    fn dropping_the_guard_releases_the_map() {
        let exclusion = MapExclusion::default();
        {
            let _held = exclusion.try_acquire(MapId::new(1)).expect("first claim");
        }

        assert!(exclusion.try_acquire(MapId::new(1)).is_some());
    }
}
