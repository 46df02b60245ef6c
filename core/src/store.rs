//! Seams between the combat systems and their collaborators.

use crate::{
    AttackWave, CandidateWall, Group, GroupId, MapId, MapRecord, MapTopology, Notification,
    NotifyError, StoreError, Timestamp, WaveId, WaveResolution,
};

/// Repository consulted and mutated by the combat engine.
///
/// Implementations must make [`CombatStore::apply_wave_result`] all-or-nothing
/// and must reject a resolution whose wave is already executed, so that a
/// wave is committed at most once even when several workers race on it.
pub trait CombatStore: Send + Sync {
    /// Identifiers of every active map.
    fn active_maps(&self) -> Result<Vec<MapId>, StoreError>;

    /// Loads the record of `map`.
    fn load_map(&self, map: MapId) -> Result<MapRecord, StoreError>;

    /// Loads the tiles, walls and ammunition of `map`.
    fn load_map_topology(&self, map: MapId) -> Result<MapTopology, StoreError>;

    /// Loads the walls of the owned, intact tiles of `map`.
    fn load_external_candidate_walls(&self, map: MapId) -> Result<Vec<CandidateWall>, StoreError> {
        Ok(self.load_map_topology(map)?.candidate_walls())
    }

    /// Waves of `map` that have not been executed, oldest first with ties
    /// broken by identifier.
    fn pending_waves(&self, map: MapId) -> Result<Vec<AttackWave>, StoreError>;

    /// Loads a single wave.
    fn load_wave(&self, wave: WaveId) -> Result<AttackWave, StoreError>;

    /// Loads a single group.
    fn load_group(&self, group: GroupId) -> Result<Group, StoreError>;

    /// Sets the lock flag of `map`, returning whether the stored value changed.
    fn set_map_locked(&self, map: MapId, locked: bool) -> Result<bool, StoreError>;

    /// Commits a wave's damage together with its `executed` flag.
    fn apply_wave_result(&self, resolution: &WaveResolution) -> Result<(), StoreError>;
}

/// Receiver of best-effort notifications published after commits.
pub trait NotificationSink: Send + Sync {
    /// Delivers a notification to observers.
    fn publish(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Timestamp;
}
