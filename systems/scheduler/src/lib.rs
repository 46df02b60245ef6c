#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Time-driven attack scheduler.
//!
//! [`CombatEngine`] fires due waves against active maps: it locks the map,
//! runs exposure detection and damage resolution for each wave in order,
//! commits every wave as one atomic unit, unlocks the map and publishes
//! notifications. Maps are pre-locked once a wave enters the configured lock
//! window. [`AttackScheduler`] drives the engine from a timer thread.

mod clock;
mod config;
mod engine;
mod exclusion;
mod service;

pub use clock::{ManualClock, SystemClock};
pub use config::SchedulerConfig;
pub use engine::{
    CombatEngine, DueWavesReport, EngineError, ExecutionStatus, LockTransition, MapPhase,
    MapTick, TickOutcome, TickSummary, WaveReport,
};
pub use service::AttackScheduler;
