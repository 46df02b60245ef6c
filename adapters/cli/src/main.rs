#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line host that seeds a territory map and fires its attack waves.

mod config;
mod demo;
mod logging;
mod render;
mod scenario;
mod sink;

use std::{
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use territory_defense_core::{Clock, CombatStore, MapId, Timestamp};
use territory_defense_system_scheduler::{
    AttackScheduler, CombatEngine, ManualClock, SchedulerConfig, SystemClock,
};
use territory_defense_world::{query, World};

use crate::{config::Settings, scenario::Scenario, sink::LogSink};

/// Resolve attack waves against a territory map.
#[derive(Debug, Parser)]
#[command(name = "territory-defense", version, about)]
struct Cli {
    /// Log debug output, including per-wall damage.
    #[arg(short, long, global = true)]
    verbose: bool,
    /// TOML file with an `[engine]` table.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Interval between scheduler ticks, overriding the configuration.
    #[arg(long, global = true)]
    tick_period_ms: Option<u64>,
    /// Pre-lock window, overriding the configuration.
    #[arg(long, global = true)]
    lock_window_secs: Option<u64>,
    /// Print the final map snapshot as JSON instead of a drawing.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the scheduler in real time until every wave has fired.
    Run {
        /// Scenario file to load.
        scenario: PathBuf,
        /// Give up after this many seconds.
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },
    /// Replay every wave of a scenario immediately on a simulated clock.
    Resolve {
        /// Scenario file to load.
        scenario: PathBuf,
    },
    /// Generate a random scenario and replay it.
    Demo {
        /// Seed for the scenario generator.
        #[arg(long, default_value_t = 7)]
        seed: u64,
        /// Tiles per side of the generated map.
        #[arg(long, default_value_t = 5)]
        side: u32,
        /// Print the generated scenario as TOML instead of replaying it.
        #[arg(long)]
        emit_scenario: bool,
    },
}

/// Entry point for the territory defense command-line interface.
fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let settings = Settings::load(cli.config.as_deref())?;
    let config = settings.scheduler_config(cli.tick_period_ms, cli.lock_window_secs)?;

    match cli.command {
        Command::Run { scenario, timeout } => run(
            &Scenario::load(&scenario)?,
            &config,
            Duration::from_secs(timeout),
            cli.json,
        ),
        Command::Resolve { scenario } => resolve(&Scenario::load(&scenario)?, &config, cli.json),
        Command::Demo {
            seed,
            side,
            emit_scenario,
        } => {
            let scenario = demo::generate(seed, side)?;
            if emit_scenario {
                print!(
                    "{}",
                    toml::to_string(&scenario).context("encoding the scenario")?
                );
                return Ok(());
            }
            resolve(&scenario, &config, cli.json)
        }
    }
}

fn run(scenario: &Scenario, config: &SchedulerConfig, timeout: Duration, json: bool) -> Result<()> {
    let world = Arc::new(World::new());
    let clock = Arc::new(SystemClock);
    let map = scenario.seed(&world, clock.now())?;
    let engine = Arc::new(CombatEngine::new(
        Arc::clone(&world),
        Arc::new(LogSink),
        clock,
        config,
    ));
    let scheduler =
        AttackScheduler::start(engine, config).context("starting the attack scheduler")?;

    let deadline = Instant::now() + timeout;
    let poll = config.tick_period.min(Duration::from_millis(100));
    loop {
        let pending = world.pending_waves(map)?.len();
        if pending == 0 {
            info!("every wave on map {map} has fired");
            break;
        }
        if Instant::now() >= deadline {
            warn!("gave up with {pending} waves still pending on map {map}");
            break;
        }
        thread::sleep(poll);
    }
    scheduler.shutdown();
    print_outcome(&world, map, json)
}

fn resolve(scenario: &Scenario, config: &SchedulerConfig, json: bool) -> Result<()> {
    let world = Arc::new(World::new());
    let clock = Arc::new(ManualClock::new(Timestamp::from_millis(0)));
    let map = scenario.seed(&world, clock.now())?;
    let engine = CombatEngine::new(
        Arc::clone(&world),
        Arc::new(LogSink),
        Arc::clone(&clock),
        config,
    );

    for wave in query::waves(&world, map)? {
        clock.set(wave.attack_time);
        let report = engine
            .execute_wave(map, wave.id)
            .with_context(|| format!("resolving wave {}", wave.id))?;
        if !json {
            println!(
                "-- wave {} at +{}s",
                wave.id,
                wave.attack_time.as_millis() / 1_000
            );
            for line in &report.log {
                println!("{line}");
            }
        }
    }
    print_outcome(&world, map, json)
}

fn print_outcome(world: &World, map: MapId, json: bool) -> Result<()> {
    let snapshot = query::snapshot(world, map)?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&snapshot).context("encoding the snapshot")?
        );
    } else {
        print!("{}", render::render(&snapshot));
    }
    Ok(())
}
