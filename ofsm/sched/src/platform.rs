//! Sleep/wake adapters

use core::cell::Cell;

use critical_section::Mutex;

use ofsm_core::Timestamp;

/// Platform suspend/resume primitive used by the scheduler loop.
pub trait Platform: Send + Sync {
    /// Suspend until [`wake`](Self::wake) is called.
    ///
    /// `until` is the next scheduled wakeup (`None` for infinite sleep), for
    /// platforms that program a timer. Time still only advances through the
    /// heartbeat, which wakes the scheduler once the wakeup is reached.
    fn sleep(&self, until: Option<Timestamp>);

    /// Interrupt an ongoing or imminent sleep.
    fn wake(&self);
}

/// Non-blocking platform for synchronous drivers.
///
/// Wakes are latched; `sleep` consumes the latch and returns at once.
/// Script drivers poll [`take_wake`](Self::take_wake) to decide when to run
/// the scheduler.
pub struct LatchPlatform {
    woken: Mutex<Cell<bool>>,
}

impl LatchPlatform {
    pub const fn new() -> Self {
        Self {
            woken: Mutex::new(Cell::new(false)),
        }
    }

    /// Whether a wake arrived since the last call, clearing the latch.
    pub fn take_wake(&self) -> bool {
        critical_section::with(|cs| self.woken.borrow(cs).replace(false))
    }

    pub fn is_woken(&self) -> bool {
        critical_section::with(|cs| self.woken.borrow(cs).get())
    }
}

impl Default for LatchPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for LatchPlatform {
    fn sleep(&self, _until: Option<Timestamp>) {
        self.take_wake();
    }

    fn wake(&self) {
        critical_section::with(|cs| self.woken.borrow(cs).set(true));
    }
}

/// Wait-for-interrupt sleep on Cortex-M.
///
/// Wakes are latched. `sleep` checks the latch with interrupts masked and
/// only then executes `wfi`, so an event queued by an interrupt after the
/// scheduler decided to sleep either skips the `wfi` or ends it at once.
#[cfg(target_arch = "arm")]
#[derive(Default)]
pub struct WfiPlatform {
    latch: LatchPlatform,
}

#[cfg(target_arch = "arm")]
impl WfiPlatform {
    pub const fn new() -> Self {
        Self {
            latch: LatchPlatform::new(),
        }
    }
}

#[cfg(target_arch = "arm")]
impl Platform for WfiPlatform {
    fn sleep(&self, _until: Option<Timestamp>) {
        // a masked interrupt still ends wfi and runs once `free` returns
        cortex_m::interrupt::free(|_| {
            if !self.latch.take_wake() {
                cortex_m::asm::wfi();
            }
        });
    }

    fn wake(&self) {
        self.latch.wake();
    }
}
