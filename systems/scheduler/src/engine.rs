use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use log::{debug, error, info, warn};
use thiserror::Error;
use territory_defense_core::{
    AttackWave, Clock, CombatStore, ErrorClass, ExternalWall, GroupId, MapId, MapTopology,
    Notification, NotificationSink, StoreError, Timestamp, WaveId,
};
use territory_defense_system_damage::{DamageResolver, WaveDamage};
use territory_defense_system_exposure::{ExposureDetector, ExposureError};

use crate::{
    exclusion::{MapExclusion, MapGuard},
    SchedulerConfig,
};

/// Where a map stands in the attack cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MapPhase {
    /// No wave is imminent; collaborators may mutate the map.
    #[default]
    Open,
    /// The scheduler locked the map ahead of an upcoming wave.
    PreLocked {
        /// Earliest wave inside the lock window.
        wave: WaveId,
    },
    /// Due waves are being resolved.
    LockedExecuting,
}

/// Failures raised while resolving waves.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Another worker in this process is already processing the map.
    #[error("map {0} is already being processed")]
    Busy(MapId),
    /// The store rejected a read or a commit.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The map's topology could not be classified.
    #[error(transparent)]
    Exposure(#[from] ExposureError),
}

impl EngineError {
    /// Category the error belongs to.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Busy(_) => ErrorClass::Precondition,
            Self::Store(error) | Self::Exposure(ExposureError::Store(error)) => error.class(),
            Self::Exposure(_) => ErrorClass::Integrity,
        }
    }
}

/// Outcome of an execution request that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Every selected wave was resolved and committed.
    Resolved,
    /// No wave was due.
    NothingDue,
    /// The map is not active, so its waves are not fired.
    MapInactive,
    /// The requested wave had already been executed.
    AlreadyExecuted(WaveId),
}

/// Resolution of a single wave.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaveReport {
    /// Resolved wave.
    pub wave: WaveId,
    /// Power of the wave.
    pub power: u32,
    /// Time the wave was scheduled for.
    pub attack_time: Timestamp,
    /// Number of walls the wave struck.
    pub external_walls: usize,
    /// Committed damage.
    pub damage: WaveDamage,
}

/// Result of executing the waves of a map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DueWavesReport {
    /// Map the waves struck.
    pub map: MapId,
    /// Non-fatal outcome of the request.
    pub status: ExecutionStatus,
    /// Waves resolved, in firing order.
    pub resolved: Vec<WaveReport>,
    /// Human-readable audit trail of every step.
    pub log: Vec<String>,
}

/// Change applied by a lock window recomputation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockTransition {
    /// The map was locked ahead of `wave`.
    PreLocked {
        /// Earliest wave inside the lock window.
        wave: WaveId,
    },
    /// The scheduler's pre-lock was released.
    Released,
    /// Nothing changed.
    Unchanged,
}

/// What a tick did to a single map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Due waves were looked up and executed.
    Executed(DueWavesReport),
    /// Nothing was due, so the lock window was recomputed.
    LockWindow(LockTransition),
}

/// Per-map entry of a [`TickSummary`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapTick {
    /// Map the entry refers to.
    pub map: MapId,
    /// Outcome for the map.
    pub outcome: Result<TickOutcome, EngineError>,
}

/// Outcome of one scheduler tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Per-map outcomes in the order the maps were processed.
    pub maps: Vec<MapTick>,
    /// Failure that prevented the tick from listing active maps.
    pub failure: Option<EngineError>,
}

impl TickSummary {
    /// Number of waves resolved during the tick.
    #[must_use]
    pub fn resolved_waves(&self) -> usize {
        self.maps
            .iter()
            .map(|entry| match &entry.outcome {
                Ok(TickOutcome::Executed(report)) => report.resolved.len(),
                _ => 0,
            })
            .sum()
    }

    /// Maps whose processing failed during the tick.
    pub fn failures(&self) -> impl Iterator<Item = (MapId, &EngineError)> {
        self.maps
            .iter()
            .filter_map(|entry| entry.outcome.as_ref().err().map(|error| (entry.map, error)))
    }
}

/// Work accumulated while processing one map.
struct Run {
    map: MapId,
    resolved: Vec<WaveReport>,
    raced: Vec<WaveId>,
    log: Vec<String>,
    outbox: Vec<Notification>,
}

impl Run {
    fn new(map: MapId) -> Self {
        Self {
            map,
            resolved: Vec::new(),
            raced: Vec::new(),
            log: Vec::new(),
            outbox: Vec::new(),
        }
    }

    fn note(&mut self, line: String) {
        self.log.push(line);
    }

    fn into_report(self, status: ExecutionStatus) -> DueWavesReport {
        DueWavesReport {
            map: self.map,
            status,
            resolved: self.resolved,
            log: self.log,
        }
    }
}

/// Scratch state reused by every wave the engine resolves.
#[derive(Debug, Default)]
struct Scratch {
    detector: ExposureDetector,
    resolver: DamageResolver,
}

/// Resolves attack waves against the maps held by a [`CombatStore`].
///
/// Every public operation claims the map for the duration of the call, so
/// scheduler ticks and manual executions never overlap on the same map within
/// a process. Across processes the store's commit rejects a wave that was
/// already executed.
pub struct CombatEngine<S: ?Sized, N: ?Sized, C: ?Sized> {
    store: Arc<S>,
    sink: Arc<N>,
    clock: Arc<C>,
    lock_window: Duration,
    phases: Mutex<BTreeMap<MapId, MapPhase>>,
    exclusion: MapExclusion,
    scratch: Mutex<Scratch>,
}

impl<S, N, C> CombatEngine<S, N, C>
where
    S: CombatStore + ?Sized,
    N: NotificationSink + ?Sized,
    C: Clock + ?Sized,
{
    /// Creates an engine over the provided collaborators.
    pub fn new(store: Arc<S>, sink: Arc<N>, clock: Arc<C>, config: &SchedulerConfig) -> Self {
        Self {
            store,
            sink,
            clock,
            lock_window: config.lock_window,
            phases: Mutex::new(BTreeMap::new()),
            exclusion: MapExclusion::default(),
            scratch: Mutex::new(Scratch::default()),
        }
    }

    /// Store the engine resolves against.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Current phase of `map`.
    #[must_use]
    pub fn phase(&self, map: MapId) -> MapPhase {
        self.phases().get(&map).copied().unwrap_or_default()
    }

    /// Resolves every wave of `map` whose attack time has passed, oldest first.
    pub fn execute_due_waves(&self, map: MapId) -> Result<DueWavesReport, EngineError> {
        let _guard = self.claim(map)?;
        self.run_due_waves(map)
    }

    /// Resolves `wave` immediately, regardless of its attack time.
    pub fn execute_wave(&self, map: MapId, wave: WaveId) -> Result<DueWavesReport, EngineError> {
        let _guard = self.claim(map)?;
        let record = self.store.load_wave(wave)?;
        if record.map != map {
            return Err(StoreError::WaveNotFound(wave).into());
        }
        let mut run = Run::new(map);
        if record.executed {
            run.note(format!("wave {wave} was already executed"));
            return Ok(run.into_report(ExecutionStatus::AlreadyExecuted(wave)));
        }
        info!("force-executing wave {wave} on map {map}");
        let outcome = self.execute_locked(&mut run, std::slice::from_ref(&record));
        self.finish(run, outcome)
    }

    /// Locks `map` when a wave falls inside the lock window, or releases the
    /// stored lock once no wave does.
    pub fn recompute_lock_window(&self, map: MapId) -> Result<LockTransition, EngineError> {
        let _guard = self.claim(map)?;
        self.refresh_lock_window(map)
    }

    /// Processes every active map once.
    ///
    /// A failing map is logged and reported in the summary without affecting
    /// the other maps.
    pub fn tick(&self) -> TickSummary {
        let maps = match self.store.active_maps() {
            Ok(maps) => maps,
            Err(error) => {
                error!("could not list active maps: {error}");
                return TickSummary {
                    maps: Vec::new(),
                    failure: Some(error.into()),
                };
            }
        };

        let maps = maps
            .into_iter()
            .map(|map| {
                let outcome = self.tick_map(map);
                if let Err(error) = &outcome {
                    report_failure(map, error);
                }
                MapTick { map, outcome }
            })
            .collect();
        TickSummary {
            maps,
            failure: None,
        }
    }

    fn tick_map(&self, map: MapId) -> Result<TickOutcome, EngineError> {
        let _guard = self.claim(map)?;
        let report = self.run_due_waves(map)?;
        if report.status == ExecutionStatus::NothingDue {
            return Ok(TickOutcome::LockWindow(self.refresh_lock_window(map)?));
        }
        Ok(TickOutcome::Executed(report))
    }

    fn run_due_waves(&self, map: MapId) -> Result<DueWavesReport, EngineError> {
        let record = self.store.load_map(map)?;
        let mut run = Run::new(map);
        if !record.active {
            run.note(format!("map {map} is not active"));
            return Ok(run.into_report(ExecutionStatus::MapInactive));
        }

        let now = self.clock.now();
        let due: Vec<AttackWave> = self
            .store
            .pending_waves(map)?
            .into_iter()
            .filter(|wave| wave.attack_time <= now)
            .collect();
        if due.is_empty() {
            run.note(format!("no waves due on map {map}"));
            return Ok(run.into_report(ExecutionStatus::NothingDue));
        }

        info!("map {map}: {} waves due", due.len());
        let outcome = self.execute_locked(&mut run, &due);
        self.finish(run, outcome)
    }

    fn execute_locked(&self, run: &mut Run, waves: &[AttackWave]) -> Result<(), EngineError> {
        let Some((first, rest)) = waves.split_first() else {
            return Ok(());
        };
        // A map that cannot be surveyed is skipped without touching its lock.
        let survey = self.survey(run.map)?;
        self.lock(run)?;
        let outcome = self.resolve_wave(run, first, survey).and_then(|()| {
            rest.iter().try_for_each(|wave| {
                let survey = self.survey(run.map)?;
                self.resolve_wave(run, wave, survey)
            })
        });
        let released = self.release(run);
        outcome.and(released)
    }

    fn survey(&self, map: MapId) -> Result<(MapTopology, Vec<ExternalWall>), EngineError> {
        let topology = self.store.load_map_topology(map)?;
        let targets = self.scratch().detector.find_external_walls(&topology)?;
        Ok((topology, targets))
    }

    fn resolve_wave(
        &self,
        run: &mut Run,
        wave: &AttackWave,
        (mut topology, targets): (MapTopology, Vec<ExternalWall>),
    ) -> Result<(), EngineError> {
        let map = run.map;
        let damage = self
            .scratch()
            .resolver
            .resolve(&mut topology, wave.id, wave.power, &targets);

        match self.store.apply_wave_result(&damage.resolution) {
            Ok(()) => {}
            Err(StoreError::WaveAlreadyExecuted(id)) => {
                warn!("wave {id} on map {map} was committed by another worker");
                run.note(format!("wave {id} was already executed by another worker"));
                run.raced.push(id);
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        }

        info!(
            "wave {} resolved on map {map}: {} walls struck, {} tiles destroyed, {} groups eliminated",
            wave.id,
            damage.walls.len(),
            damage.destroyed.len(),
            damage.eliminated.len()
        );
        run.note(format!(
            "wave {} (power {}) struck {} external walls",
            wave.id,
            wave.power,
            targets.len()
        ));
        for log in &damage.walls {
            run.note(log.to_string());
        }
        for wall in &damage.skipped {
            run.note(format!("wall {wall} skipped, its tile had already fallen"));
        }
        for tile in &damage.destroyed {
            run.note(format!("tile {} at {} destroyed", tile.tile, tile.coord));
            run.outbox.push(Notification::TileDestroyed {
                map,
                tile: tile.tile,
                coord: tile.coord,
            });
        }
        for &group in &damage.eliminated {
            let name = self.group_name(group);
            run.note(format!("group {group} ({name}) eliminated from map {map}"));
            run.outbox
                .push(Notification::GroupEliminated { map, group, name });
        }

        run.resolved.push(WaveReport {
            wave: wave.id,
            power: wave.power,
            attack_time: wave.attack_time,
            external_walls: targets.len(),
            damage,
        });
        Ok(())
    }

    fn lock(&self, run: &mut Run) -> Result<(), EngineError> {
        let map = run.map;
        let changed = self.store.set_map_locked(map, true)?;
        self.set_phase(map, MapPhase::LockedExecuting);
        run.note(format!("map {map} locked"));
        if changed {
            info!("map {map} locked for wave resolution");
            run.outbox
                .push(Notification::MapLockChanged { map, locked: true });
        }
        Ok(())
    }

    fn release(&self, run: &mut Run) -> Result<(), EngineError> {
        let map = run.map;
        self.set_phase(map, MapPhase::Open);
        let changed = self.store.set_map_locked(map, false)?;
        run.note(format!("map {map} unlocked"));
        if changed {
            info!("map {map} unlocked");
            run.outbox
                .push(Notification::MapLockChanged { map, locked: false });
        }
        Ok(())
    }

    fn finish(
        &self,
        mut run: Run,
        outcome: Result<(), EngineError>,
    ) -> Result<DueWavesReport, EngineError> {
        let map = run.map;
        if !run.resolved.is_empty() {
            match self.store.load_map_topology(map) {
                Ok(topology) => run.outbox.push(Notification::MapStateChanged {
                    map,
                    snapshot: topology.snapshot(),
                }),
                Err(error) => warn!("could not capture the state of map {map}: {error}"),
            }
        }
        for notification in std::mem::take(&mut run.outbox) {
            self.publish(notification);
        }

        outcome?;
        let status = match run.raced.first() {
            Some(&wave) if run.resolved.is_empty() => ExecutionStatus::AlreadyExecuted(wave),
            _ => ExecutionStatus::Resolved,
        };
        Ok(run.into_report(status))
    }

    fn refresh_lock_window(&self, map: MapId) -> Result<LockTransition, EngineError> {
        let record = self.store.load_map(map)?;
        let upcoming = if record.active {
            let horizon = self.clock.now().saturating_add(self.lock_window);
            self.store
                .pending_waves(map)?
                .into_iter()
                .next()
                .filter(|wave| wave.attack_time <= horizon)
        } else {
            None
        };

        match (self.phase(map), upcoming) {
            (MapPhase::PreLocked { .. }, Some(wave)) => {
                self.set_phase(map, MapPhase::PreLocked { wave: wave.id });
                Ok(LockTransition::Unchanged)
            }
            (_, Some(wave)) => {
                self.set_phase(map, MapPhase::PreLocked { wave: wave.id });
                if !self.store.set_map_locked(map, true)? {
                    debug!("map {map} was already locked, holding it for wave {}", wave.id);
                    return Ok(LockTransition::Unchanged);
                }
                info!(
                    "map {map} pre-locked ahead of wave {} at {}ms",
                    wave.id,
                    wave.attack_time.as_millis()
                );
                self.publish(Notification::MapLockChanged { map, locked: true });
                Ok(LockTransition::PreLocked { wave: wave.id })
            }
            (phase, None) => {
                self.set_phase(map, MapPhase::Open);
                if !record.locked || !self.store.set_map_locked(map, false)? {
                    return Ok(LockTransition::Unchanged);
                }
                if phase == MapPhase::Open {
                    warn!("map {map} was left locked with no wave in the window, releasing it");
                } else {
                    info!("map {map} pre-lock released, no wave inside the window");
                }
                self.publish(Notification::MapLockChanged { map, locked: false });
                Ok(LockTransition::Released)
            }
        }
    }

    fn group_name(&self, group: GroupId) -> String {
        match self.store.load_group(group) {
            Ok(record) => record.name,
            Err(error) => {
                warn!("could not load eliminated group {group}: {error}");
                group.to_string()
            }
        }
    }

    fn publish(&self, notification: Notification) {
        let map = notification.map();
        if let Err(error) = self.sink.publish(notification) {
            warn!("dropped notification for map {map}: {error}");
        }
    }

    fn claim(&self, map: MapId) -> Result<MapGuard<'_>, EngineError> {
        self.exclusion
            .try_acquire(map)
            .ok_or(EngineError::Busy(map))
    }

    fn scratch(&self) -> MutexGuard<'_, Scratch> {
        self.scratch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn phases(&self) -> MutexGuard<'_, BTreeMap<MapId, MapPhase>> {
        self.phases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, map: MapId, phase: MapPhase) {
        let _ = self.phases().insert(map, phase);
    }
}

fn report_failure(map: MapId, error: &EngineError) {
    match error.class() {
        ErrorClass::Integrity | ErrorClass::Persistence => {
            error!("map {map} failed this tick and will be retried: {error}");
        }
        ErrorClass::Precondition if matches!(error, EngineError::Busy(_)) => {
            warn!("map {map} skipped this tick: {error}");
        }
        ErrorClass::NotFound | ErrorClass::Precondition => {
            warn!("map {map} failed this tick: {error}");
        }
    }
}
