//! Events carried through group queues

use core::fmt;

/// Event payload
#[cfg(not(feature = "wide-event-data"))]
pub type EventData = u8;

/// Event payload
#[cfg(feature = "wide-event-data")]
pub type EventData = u32;

/// Event code, the column index into a transition table.
///
/// Code 0 is reserved for the timeout event that enters a state and drives
/// scheduled wakeups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EventCode(pub u8);

impl EventCode {
    /// Timeout / state-entry event
    pub const TIMEOUT: Self = Self(0);

    /// Create a new event code
    pub const fn new(code: u8) -> Self {
        Self(code)
    }

    /// Get the raw code value
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Check if this is the timeout event
    pub const fn is_timeout(self) -> bool {
        self.0 == 0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u8> for EventCode {
    fn from(code: u8) -> Self {
        Self(code)
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for EventCode {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "E{}", self.0);
    }
}

/// A queued event: code plus a small payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Event {
    pub code: EventCode,
    pub data: EventData,
}

impl Event {
    /// Timeout event with an empty payload
    pub const TIMEOUT: Self = Self::new(EventCode::TIMEOUT, 0);

    pub const fn new(code: EventCode, data: EventData) -> Self {
        Self { code, data }
    }

    pub const fn is_timeout(&self) -> bool {
        self.code.is_timeout()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eventCode {} eventData {}", self.code, self.data)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Event {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}({})", self.code, self.data);
    }
}

/// How an accepted event landed in its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// A fresh slot was filled
    Appended,
    /// The newest pending event had the same code; its data was replaced
    Coalesced,
}
