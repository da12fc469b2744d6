//! Tick arithmetic with explicit wrap tracking.
//!
//! The heartbeat counter is a fixed-width [`Tick`] that wraps around. Every
//! stored time is therefore paired with an overflow flag saying whether the
//! value lives in the wrap that follows the one currently being observed.
//! [`Timestamp`] orders values by `(overflow, ticks)`, so a time scheduled
//! past the wrap compares later than any time before it.

use core::cmp::Ordering;
use core::fmt;

/// Raw heartbeat counter
pub type Tick = u32;

/// Delay value reported for FSMs in infinite sleep
pub const INFINITE_TICKS: Tick = Tick::MAX;

/// A tick value tagged with its overflow flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timestamp {
    ticks: Tick,
    overflow: bool,
}

impl Timestamp {
    /// Time zero in the current wrap
    pub const ZERO: Self = Self::new(0);

    /// Latest representable time
    pub const MAX: Self = Self::with_overflow(Tick::MAX, true);

    /// Create a timestamp in the current wrap
    pub const fn new(ticks: Tick) -> Self {
        Self {
            ticks,
            overflow: false,
        }
    }

    /// Create a timestamp with an explicit overflow flag
    pub const fn with_overflow(ticks: Tick, overflow: bool) -> Self {
        Self { ticks, overflow }
    }

    /// Raw counter value
    pub const fn ticks(self) -> Tick {
        self.ticks
    }

    /// Whether the value was scheduled past the counter wrap
    pub const fn overflowed(self) -> bool {
        self.overflow
    }

    /// `self >= other` under the overflow-aware ordering.
    pub const fn is_at_or_after(self, other: Self) -> bool {
        if self.overflow != other.overflow {
            self.overflow
        } else {
            self.ticks >= other.ticks
        }
    }

    /// `self > other` under the overflow-aware ordering.
    pub const fn is_after(self, other: Self) -> bool {
        if self.overflow != other.overflow {
            self.overflow
        } else {
            self.ticks > other.ticks
        }
    }

    /// Schedule `delta` ticks after `self`.
    ///
    /// The result inherits the overflow flag and raises it when the addition
    /// wraps. A second wrap cannot be represented and saturates to [`Self::MAX`].
    pub const fn offset(self, delta: Tick) -> Self {
        let (ticks, wrapped) = self.ticks.overflowing_add(delta);
        match (self.overflow, wrapped) {
            (_, false) => Self::with_overflow(ticks, self.overflow),
            (false, true) => Self::with_overflow(ticks, true),
            (true, true) => Self::MAX,
        }
    }

    /// Ticks from `self` until `later`, or 0 if `later` is not in the future.
    pub const fn ticks_until(self, later: Self) -> Tick {
        if later.is_after(self) {
            later.ticks.wrapping_sub(self.ticks)
        } else {
            0
        }
    }

    /// Move the counter to `ticks`, raising the overflow flag if it went backwards.
    pub const fn advance_to(self, ticks: Tick) -> Self {
        Self::with_overflow(ticks, self.overflow || ticks < self.ticks)
    }

    /// Drop the overflow flag once the observer has entered the new wrap.
    pub const fn rebased(self) -> Self {
        Self::new(self.ticks)
    }

    fn key(self) -> (bool, Tick) {
        (self.overflow, self.ticks)
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<Tick> for Timestamp {
    fn from(ticks: Tick) -> Self {
        Self::new(ticks)
    }
}

/// Ten zero-padded digits followed by `!` when overflowed, `.` otherwise.
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010}{}", self.ticks, if self.overflow { '!' } else { '.' })
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Timestamp {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}{}", self.ticks, if self.overflow { "!" } else { "." });
    }
}
