//! Executes simulation scripts against a scheduler

use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use clap::ValueEnum;
use log::debug;
use thiserror::Error;

use ofsm_core::{Enqueued, Event, EventCode, EventData, OResult, Tick};
use ofsm_posix::{HostPlatform, HostSimulation};
use ofsm_sched::{LatchPlatform, Orchestrator, Platform, StatusReport};

use crate::command::{parse_line, Command, Line, ScriptError};

/// When a synchronously driven scheduler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum WakeMode {
    /// Run until idle after every command that woke the scheduler
    #[default]
    Auto,
    /// Run until idle on `wakeup` only
    Manual,
    /// One loop pass per `wakeup`
    Step,
}

/// Whether the script goes on after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Scheduler operations used by scripts, independent of the platform.
trait Control {
    fn group_count(&self) -> u8;
    fn enqueue_group_event(
        &self,
        group: u8,
        force_new: bool,
        code: EventCode,
        data: EventData,
    ) -> OResult<Enqueued>;
    fn enqueue_global_event(&self, force_new: bool, code: EventCode, data: EventData);
    fn advance_time(&self, ticks: Tick);
    fn heartbeat(&self);
    fn status(&self, group: u8, fsm: u8) -> OResult<StatusReport>;
    fn reset(&self);
}

impl<P: Platform> Control for Orchestrator<P> {
    fn group_count(&self) -> u8 {
        Orchestrator::group_count(self)
    }

    fn enqueue_group_event(
        &self,
        group: u8,
        force_new: bool,
        code: EventCode,
        data: EventData,
    ) -> OResult<Enqueued> {
        Orchestrator::enqueue_group_event(self, group, force_new, code, data)
    }

    fn enqueue_global_event(&self, force_new: bool, code: EventCode, data: EventData) {
        Orchestrator::enqueue_global_event(self, force_new, code, data)
    }

    fn advance_time(&self, ticks: Tick) {
        Orchestrator::advance_time(self, ticks)
    }

    fn heartbeat(&self) {
        Orchestrator::heartbeat(self)
    }

    fn status(&self, group: u8, fsm: u8) -> OResult<StatusReport> {
        Orchestrator::status(self, group, fsm)
    }

    fn reset(&self) {
        Orchestrator::reset(self)
    }
}

enum Engine {
    /// Driven from the script thread
    Script {
        orchestrator: Orchestrator<LatchPlatform>,
        mode: WakeMode,
    },
    /// Scheduler thread plus heartbeat ticker
    Threaded(HostSimulation),
}

impl Engine {
    fn control(&self) -> &dyn Control {
        match self {
            Engine::Script { orchestrator, .. } => orchestrator,
            Engine::Threaded(simulation) => &**simulation.orchestrator(),
        }
    }
}

/// Script interpreter.
///
/// Output (status reports, prints and assertion failures) goes to `out`;
/// diagnostics go through `log`.
pub struct Simulator<W> {
    engine: Engine,
    startup: Option<EventCode>,
    out: W,
    last_output: String,
    failures: usize,
}

impl<W: Write> Simulator<W> {
    /// Drive `orchestrator` synchronously.
    ///
    /// Runs the initialization handlers and the first loop passes, with
    /// `startup` queued globally beforehand.
    pub fn script(
        orchestrator: Orchestrator<LatchPlatform>,
        mode: WakeMode,
        startup: Option<EventCode>,
        out: W,
    ) -> Self {
        orchestrator.start();
        let simulator = Self {
            engine: Engine::Script { orchestrator, mode },
            startup,
            out,
            last_output: String::new(),
            failures: 0,
        };
        simulator.boot();
        simulator
    }

    /// Run `orchestrator` on its own thread with a heartbeat every `tick`.
    pub fn threaded(
        orchestrator: Orchestrator<HostPlatform>,
        tick: Duration,
        startup: Option<EventCode>,
        out: W,
    ) -> io::Result<Self> {
        let events: Vec<Event> = startup
            .map(|code| Event::new(code, EventData::default()))
            .into_iter()
            .collect();
        let simulation = HostSimulation::spawn(orchestrator, &events, Some(tick))?;
        Ok(Self {
            engine: Engine::Threaded(simulation),
            startup,
            out,
            last_output: String::new(),
            failures: 0,
        })
    }

    /// Failed assertions so far.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Last status or print output.
    pub fn last_output(&self) -> &str {
        &self.last_output
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Execute every line of `input` until `exit` or end of input.
    ///
    /// Returns the number of failed assertions.
    pub fn run_script<R: BufRead>(&mut self, input: R) -> io::Result<usize> {
        for (index, raw) in input.lines().enumerate() {
            if self.execute_line(index + 1, &raw?)? == Flow::Exit {
                debug!("G: Exiting...");
                break;
            }
        }
        Ok(self.failures)
    }

    /// Execute one script line. Script errors are reported to the output
    /// and do not stop the script.
    pub fn execute_line(&mut self, number: usize, raw: &str) -> io::Result<Flow> {
        let result = parse_line(number, raw)
            .map_err(SimError::from)
            .and_then(|line| match line {
                Some(line) => self.execute(&line),
                None => Ok(Flow::Continue),
            });

        match result {
            Ok(flow) => Ok(flow),
            Err(SimError::Script(err)) => {
                writeln!(self.out, "ASSERT at line: {number}: {err}")?;
                Ok(Flow::Continue)
            }
            Err(SimError::Io(err)) => Err(err),
        }
    }

    fn execute(&mut self, line: &Line) -> Result<Flow, SimError> {
        match &line.command {
            Command::Exit => return Ok(Flow::Exit),
            Command::Wakeup => self.wakeup()?,
            Command::Delay(period) => {
                debug!("G: Entering sleep for {} milliseconds...", period.as_millis());
                thread::sleep(*period);
                return Ok(Flow::Continue);
            }
            Command::Print(text) => {
                self.emit(text)?;
                return Ok(Flow::Continue);
            }
            Command::Queue {
                global,
                force_new,
                code,
                data,
                group,
            } => {
                let control = self.engine.control();
                if *global {
                    control.enqueue_global_event(*force_new, *code, *data);
                } else if *group >= control.group_count() {
                    return Err(ScriptError::InvalidGroup(*group).into());
                } else {
                    // a full queue is reported by the scheduler itself
                    let _ = control.enqueue_group_event(*group, *force_new, *code, *data);
                }
            }
            Command::Heartbeat(time) => match time {
                Some(ticks) => self.engine.control().advance_time(*ticks),
                None => self.engine.control().heartbeat(),
            },
            Command::Status { group, fsm } => {
                let report = self
                    .engine
                    .control()
                    .status(*group, *fsm)
                    .map_err(ScriptError::from)?;
                self.emit(&report.to_string())?;
            }
            Command::Reset => {
                debug!("Reseting...");
                self.engine.control().reset();
                self.boot();
            }
        }

        self.settle();
        if let Some(expected) = &line.expected {
            self.check(line.number, expected)?;
        }
        Ok(Flow::Continue)
    }

    /// Queue the startup event and, when driven synchronously, run the
    /// first passes.
    fn boot(&self) {
        if let Some(code) = self.startup {
            self.engine
                .control()
                .enqueue_global_event(false, code, EventData::default());
        }
        if let Engine::Script { orchestrator, .. } = &self.engine {
            orchestrator.run_until_idle();
            orchestrator.platform().take_wake();
        }
    }

    fn wakeup(&self) -> Result<(), ScriptError> {
        match &self.engine {
            Engine::Script { orchestrator, mode } => match mode {
                WakeMode::Auto => return Err(ScriptError::WakeupIgnored),
                WakeMode::Manual => {
                    orchestrator.platform().take_wake();
                    orchestrator.run_until_idle();
                }
                WakeMode::Step => {
                    orchestrator.platform().take_wake();
                    orchestrator.dispatch_once();
                }
            },
            Engine::Threaded(simulation) => simulation.orchestrator().platform().wake(),
        }
        Ok(())
    }

    /// In auto mode, run whatever the last command woke up.
    fn settle(&self) {
        if let Engine::Script {
            orchestrator,
            mode: WakeMode::Auto,
        } = &self.engine
        {
            if orchestrator.platform().take_wake() {
                orchestrator.run_until_idle();
                orchestrator.platform().take_wake();
            }
        }
    }

    fn emit(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")?;
        self.last_output = text.to_string();
        Ok(())
    }

    fn check(&mut self, number: usize, expected: &str) -> io::Result<()> {
        let produced = self.last_output.trim();
        if expected != produced {
            writeln!(self.out, "ASSERT at line: {number}")?;
            writeln!(self.out, "\tExpected: {expected}")?;
            writeln!(self.out, "\tProduced: {produced}")?;
            self.failures += 1;
        }
        Ok(())
    }
}
