//! Blinking LED on the host port
//!
//! One FSM toggles a simulated LED, two ticks on and one tick off. The
//! heartbeat runs at 10 Hz and the demo stops after five seconds.

use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ofsm_core::{Event, StateId, Tick};
use ofsm_fsm::{Fsm, FsmContext, Transition, TransitionTable};
use ofsm_posix::{ClockTick, HostPlatform, HostSimulation};
use ofsm_sched::{OrchestratorBuilder, SchedulerConfig};

const OFF: StateId = StateId(0);
const ON: StateId = StateId(1);

/// Number of ticks to be in the On state
const TICKS_ON: Tick = 2;
/// Number of ticks to be in the Off state
const TICKS_OFF: Tick = 1;

const TICK_RATE_HZ: u32 = 10;
const RUN_FOR: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Led {
    lit: AtomicBool,
    toggles: AtomicU32,
}

impl Led {
    fn set(&self, lit: bool) {
        self.lit.store(lit, Ordering::Relaxed);
        self.toggles.fetch_add(1, Ordering::Relaxed);
    }
}

fn turn_on(ctx: &mut FsmContext<'_>) {
    if let Some(led) = ctx.private_data::<Arc<Led>>() {
        led.set(true);
    }
    println!("[{}] LED on for {TICKS_ON} ticks", ctx.now());
    ctx.set_delay(TICKS_ON);
}

fn turn_off(ctx: &mut FsmContext<'_>) {
    if let Some(led) = ctx.private_data::<Arc<Led>>() {
        led.set(false);
    }
    println!("[{}] LED off for {TICKS_OFF} ticks", ctx.now());
    ctx.set_delay(TICKS_OFF);
}

/// Each state handles only the timeout
static BLINK: [[Transition; 1]; 2] = [
    [Transition::new(turn_on, ON)],
    [Transition::new(turn_off, OFF)],
];

fn main() -> Result<(), Box<dyn Error>> {
    let led = Arc::new(Led::default());

    let mut builder = OrchestratorBuilder::new(SchedulerConfig::builder().name("blink").build());
    let fsm = builder.add_fsm(
        Fsm::new(TransitionTable::from_rows(&BLINK)?).with_private_data(Arc::clone(&led)),
    );
    builder.add_group(1, &[fsm])?;
    let orchestrator = builder.build(HostPlatform::new())?;

    let tick = ClockTick::new(TICK_RATE_HZ)?;
    // the startup timeout switches the LED on
    let simulation =
        HostSimulation::spawn(orchestrator, &[Event::TIMEOUT], Some(tick.period()))?;
    thread::sleep(RUN_FOR);
    simulation.shutdown();

    println!(
        "LED toggled {} times, last {}",
        led.toggles.load(Ordering::Relaxed),
        if led.lit.load(Ordering::Relaxed) { "on" } else { "off" }
    );
    Ok(())
}
