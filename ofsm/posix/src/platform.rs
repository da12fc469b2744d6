//! Blocking sleep/wake for hosted builds

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::trace;

use ofsm_core::Timestamp;
use ofsm_sched::Platform;

/// Sleeps on a condition variable until woken.
///
/// Wakes are latched: one that arrives between the scheduler's decision to
/// sleep and the actual wait makes the next `sleep` return at once.
#[derive(Debug, Default)]
pub struct HostPlatform {
    woken: Mutex<bool>,
    signal: Condvar,
}

impl HostPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Like [`Platform::sleep`], giving up after `timeout`.
    ///
    /// Returns whether a wake was consumed.
    pub fn sleep_timeout(&self, timeout: Duration) -> bool {
        let guard = self.latch();
        let (mut woken, _) = self
            .signal
            .wait_timeout_while(guard, timeout, |woken| !*woken)
            .unwrap_or_else(PoisonError::into_inner);
        core::mem::replace(&mut *woken, false)
    }

    /// Whether a wake is latched and not yet consumed.
    pub fn is_woken(&self) -> bool {
        *self.latch()
    }

    fn latch(&self) -> MutexGuard<'_, bool> {
        self.woken.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Platform for HostPlatform {
    fn sleep(&self, until: Option<Timestamp>) {
        trace!("O: Sleeping until {until:?}");
        let guard = self.latch();
        let mut woken = self
            .signal
            .wait_while(guard, |woken| !*woken)
            .unwrap_or_else(PoisonError::into_inner);
        *woken = false;
    }

    fn wake(&self) {
        *self.latch() = true;
        self.signal.notify_all();
    }
}
