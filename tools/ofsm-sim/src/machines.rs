//! Built-in machines the simulator can drive

use std::sync::Arc;

use clap::ValueEnum;
use log::info;

use ofsm_core::{EventCode, OResult, StateId, Tick, TraceSink};
use ofsm_fsm::{Fsm, FsmContext, Transition, TransitionTable};
use ofsm_sched::{Orchestrator, OrchestratorBuilder, Platform, SchedulerConfig};

const S0: StateId = StateId(0);
const S1: StateId = StateId(1);

fn dummy(_: &mut FsmContext<'_>) {}

fn prevent(ctx: &mut FsmContext<'_>) {
    ctx.prevent_transition();
}

fn infinite_delay(ctx: &mut FsmContext<'_>) {
    ctx.set_infinite_delay();
}

/// Events: Timeout, NormalTransition, PreventTransition, InfiniteDelay.
/// S1 has no timeout handler.
static TEST: [[Transition; 4]; 2] = [
    [
        Transition::new(dummy, S1),
        Transition::new(dummy, S1),
        Transition::new(prevent, S1),
        Transition::new(infinite_delay, S1),
    ],
    [
        Transition::EMPTY,
        Transition::new(dummy, S0),
        Transition::new(prevent, S0),
        Transition::new(infinite_delay, S0),
    ],
];

const LED_ON: StateId = StateId(0);
const LED_OFF: StateId = StateId(1);
const TICKS_ON: Tick = 2;
const TICKS_OFF: Tick = 1;

fn led_on(ctx: &mut FsmContext<'_>) {
    info!("{}: Turning Led ON for {TICKS_ON} ticks.", ctx.coords());
    ctx.set_delay(TICKS_ON);
}

fn led_off(ctx: &mut FsmContext<'_>) {
    info!("{}: Turning Led OFF for {TICKS_OFF} ticks.", ctx.coords());
    ctx.set_delay(TICKS_OFF);
}

static BLINK: [[Transition; 1]; 2] = [
    [Transition::new(led_on, LED_OFF)],
    [Transition::new(led_off, LED_ON)],
];

/// S0 moves to S1 on event 1; S1 ignores it.
static E2E: [[Transition; 2]; 2] = [
    [Transition::new(dummy, S0), Transition::new(dummy, S1)],
    [Transition::new(dummy, S1), Transition::EMPTY],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Machine {
    /// Two states exercising veto and infinite delay
    #[default]
    Test,
    /// LED toggling on timeouts
    Blink,
    /// Two states, one transition
    E2e,
}

impl Machine {
    pub fn table(self) -> OResult<TransitionTable> {
        match self {
            Machine::Test => TransitionTable::from_rows(&TEST),
            Machine::Blink => TransitionTable::from_rows(&BLINK),
            Machine::E2e => TransitionTable::from_rows(&E2E),
        }
    }

    pub fn default_queue_size(self) -> usize {
        match self {
            Machine::Blink => 1,
            Machine::Test | Machine::E2e => 3,
        }
    }

    pub fn default_delay(self) -> Tick {
        match self {
            Machine::Blink => 0,
            Machine::Test | Machine::E2e => 1,
        }
    }

    /// Timeout to queue before the first run, so the machine starts on its own.
    pub fn startup_event(self) -> Option<EventCode> {
        match self {
            Machine::Blink => Some(EventCode::TIMEOUT),
            Machine::Test | Machine::E2e => None,
        }
    }

    /// One group holding one instance of the machine.
    pub fn build<P: Platform>(
        self,
        config: SchedulerConfig,
        queue_size: usize,
        trace: Option<Arc<dyn TraceSink>>,
        platform: P,
    ) -> OResult<Orchestrator<P>> {
        let mut builder = OrchestratorBuilder::new(config);
        let fsm = builder.add_fsm(Fsm::new(self.table()?));
        builder.add_group(queue_size, &[fsm])?;
        if let Some(trace) = trace {
            builder.with_trace(trace);
        }
        builder.build(platform)
    }
}
