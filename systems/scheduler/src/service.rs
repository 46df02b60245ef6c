use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{bounded, select, tick, Sender};
use log::{debug, error, info};
use territory_defense_core::{Clock, CombatStore, NotificationSink};

use crate::{CombatEngine, SchedulerConfig};

/// Handle to the timer thread that drives a [`CombatEngine`].
///
/// The thread stops when [`AttackScheduler::shutdown`] is called or the
/// handle is dropped.
#[derive(Debug)]
pub struct AttackScheduler {
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl AttackScheduler {
    /// Spawns the timer thread, ticking `engine` every `config.tick_period`.
    pub fn start<S, N, C>(
        engine: Arc<CombatEngine<S, N, C>>,
        config: &SchedulerConfig,
    ) -> io::Result<Self>
    where
        S: CombatStore + ?Sized + 'static,
        N: NotificationSink + ?Sized + 'static,
        C: Clock + ?Sized + 'static,
    {
        let (stop, stopped) = bounded::<()>(1);
        let ticker = tick(config.tick_period);
        let period = config.tick_period;
        let worker = thread::Builder::new()
            .name("attack-scheduler".to_owned())
            .spawn(move || {
                info!("attack scheduler started, ticking every {period:?}");
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            let summary = engine.tick();
                            let resolved = summary.resolved_waves();
                            if resolved > 0 {
                                debug!("tick resolved {resolved} waves");
                            }
                        }
                        recv(stopped) -> _ => break,
                    }
                }
                info!("attack scheduler stopped");
            })?;
        Ok(Self {
            stop: Some(stop),
            worker: Some(worker),
        })
    }

    /// Stops the timer thread and waits for the current tick to finish.
    pub fn shutdown(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("attack scheduler thread panicked");
            }
        }
    }
}

impl Drop for AttackScheduler {
    fn drop(&mut self) {
        self.halt();
    }
}
