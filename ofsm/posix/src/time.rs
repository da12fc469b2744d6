//! Clock tick service for POSIX
//!
//! Generates the scheduler heartbeat from a dedicated thread. Ticks are
//! scheduled against absolute deadlines on the monotonic clock, so sleep
//! overshoot never accumulates into drift.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error};

/// Nanoseconds per second
const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Highest supported tick rate in Hz
pub const MAX_TICKS_PER_SEC: u32 = 10_000;

/// Clock tick configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    rate_hz: u32,
}

impl ClockTick {
    /// Tick rate in Hz, between 1 and [`MAX_TICKS_PER_SEC`].
    pub fn new(rate_hz: u32) -> io::Result<Self> {
        if rate_hz == 0 || rate_hz > MAX_TICKS_PER_SEC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("tick rate {rate_hz} Hz out of range 1..={MAX_TICKS_PER_SEC}"),
            ));
        }
        Ok(Self { rate_hz })
    }

    pub fn rate_hz(&self) -> u32 {
        self.rate_hz
    }

    /// Get the tick period as a Duration
    pub fn period(&self) -> Duration {
        Duration::from_nanos(NSEC_PER_SEC / u64::from(self.rate_hz))
    }
}

/// Periodic heartbeat thread.
///
/// Stops on [`stop`](Self::stop) or when dropped.
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Spawn a thread calling `on_tick` once per `period`.
    pub fn spawn<F>(period: Duration, on_tick: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "tick period must not be zero",
            ));
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("ofsm-ticker".into())
            .spawn(move || ticker_thread(period, &flag, on_tick))?;

        debug!("Ticker started, period {period:?}");
        Ok(Self {
            period,
            running,
            handle: Some(handle),
        })
    }

    /// Spawn a ticker running at `tick`'s rate.
    pub fn with_rate<F>(tick: ClockTick, on_tick: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        Self::spawn(tick.period(), on_tick)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the thread and wait for it to finish.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                error!("Ticker thread panicked");
            }
            debug!("Ticker stopped");
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleeps until the next absolute tick time rather than for a relative
/// duration. Parking lets `stop` cut a long period short.
fn ticker_thread<F: FnMut()>(period: Duration, running: &AtomicBool, mut on_tick: F) {
    let mut next_tick = Instant::now();

    loop {
        next_tick += period;

        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            let now = Instant::now();
            if now >= next_tick {
                break;
            }
            thread::park_timeout(next_tick - now);
        }

        on_tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_tick_period() {
        assert_eq!(ClockTick::new(100).unwrap().period(), Duration::from_millis(10));
        assert_eq!(ClockTick::new(1000).unwrap().period(), Duration::from_micros(1000));
    }

    #[test]
    fn clock_tick_rate_bounds() {
        assert!(ClockTick::new(0).is_err());
        assert!(ClockTick::new(MAX_TICKS_PER_SEC + 1).is_err());
        assert_eq!(ClockTick::new(1).unwrap().rate_hz(), 1);
    }

    #[test]
    fn zero_period_is_rejected() {
        let err = Ticker::spawn(Duration::ZERO, || {}).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn stop_interrupts_long_period() {
        let mut ticker = Ticker::spawn(Duration::from_secs(3600), || {}).unwrap();
        let started = Instant::now();
        ticker.stop();

        assert!(!ticker.is_running());
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
