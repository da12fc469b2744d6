//! Threaded host simulation

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info};

use ofsm_core::Event;
use ofsm_sched::Orchestrator;

use crate::platform::HostPlatform;
use crate::time::Ticker;

/// A scheduler thread plus an optional heartbeat ticker.
///
/// Producers reach the scheduler through [`orchestrator`](Self::orchestrator);
/// every operation on it is safe to call from any thread.
pub struct HostSimulation {
    orchestrator: Arc<Orchestrator<HostPlatform>>,
    scheduler: Option<JoinHandle<()>>,
    ticker: Option<Ticker>,
}

impl HostSimulation {
    /// Run the initialization handlers, queue `startup` into every group,
    /// then start the scheduler thread.
    ///
    /// A startup timeout must go through `startup`: the scheduler's first
    /// sleep ends the startup override, so a timeout queued after `spawn`
    /// returns may be ignored by FSMs still in their initial sleep.
    ///
    /// With `tick_period` set, a [`Ticker`] calls
    /// [`heartbeat`](Orchestrator::heartbeat) once per period; otherwise time
    /// only advances when the caller drives it.
    pub fn spawn(
        orchestrator: Orchestrator<HostPlatform>,
        startup: &[Event],
        tick_period: Option<Duration>,
    ) -> io::Result<Self> {
        let orchestrator = Arc::new(orchestrator);
        orchestrator.start();
        for event in startup {
            orchestrator.enqueue_global_event(false, event.code, event.data);
        }

        let runner = Arc::clone(&orchestrator);
        let scheduler = thread::Builder::new()
            .name("ofsm-scheduler".into())
            .spawn(move || runner.run())?;

        let mut simulation = Self {
            orchestrator,
            scheduler: Some(scheduler),
            ticker: None,
        };

        if let Some(period) = tick_period {
            let clock = Arc::clone(&simulation.orchestrator);
            // dropping the simulation on error joins the scheduler thread
            simulation.ticker = Some(Ticker::spawn(period, move || clock.heartbeat())?);
        }

        info!(
            "{}: Host simulation running, heartbeat {:?}",
            simulation.orchestrator.config().name,
            tick_period
        );
        Ok(simulation)
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator<HostPlatform>> {
        &self.orchestrator
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Stop the ticker, request exit and join the scheduler thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
        if let Some(scheduler) = self.scheduler.take() {
            self.orchestrator.request_exit();
            if scheduler.join().is_err() {
                error!("O: Scheduler thread panicked");
            }
            info!("O: Host simulation stopped");
        }
    }
}

impl Drop for HostSimulation {
    fn drop(&mut self) {
        self.stop();
    }
}
