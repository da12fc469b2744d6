#![no_std]
#![forbid(unsafe_code)]

//! # OFSM Core
//!
//! Value types shared by every layer of the OFSM scheduler: overflow-aware
//! timestamps, events, identifiers, flag sets, the error type and the
//! structured trace records emitted while the scheduler runs.

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

use core::fmt;

pub mod events;
pub mod flags;
pub mod ids;
pub mod time;
pub mod trace;

pub use events::*;
pub use flags::*;
pub use ids::*;
pub use time::*;
pub use trace::{LogSink, NullSink, RecordingSink, Suppression, TraceRecord, TraceSink};

/// OFSM framework version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upper bound on states per table.
pub const MAX_STATES: usize = 255;
/// Upper bound on event codes per table.
pub const MAX_EVENTS: usize = 255;
/// Upper bound on FSMs in one group.
pub const MAX_GROUP_FSMS: usize = 255;
/// Upper bound on groups per scheduler.
pub const MAX_GROUPS: usize = 255;

/// Result type used throughout OFSM
pub type OResult<T> = Result<T, OfsmError>;

/// Error types for OFSM operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfsmError {
    /// Group index does not name a configured group
    InvalidGroup(u8),
    /// FSM index does not name an FSM of the group
    InvalidFsm(u8),
    /// State is outside the transition table
    InvalidState(u8),
    /// Event code is outside the transition table
    EventOutOfRange(u8),
    /// Event queue is full, the event was dropped
    QueueFull,
    /// Queue capacity must be between 1 and 255
    QueueCapacity(usize),
    /// Transition table has zero or too many rows or columns
    TableShape,
    /// More than 255 groups were declared
    TooManyGroups,
    /// More than 255 FSMs were placed in one group
    TooManyFsms,
    /// No group was declared
    EmptyTopology,
}

impl fmt::Display for OfsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfsmError::InvalidGroup(idx) => write!(f, "Invalid group index {idx}"),
            OfsmError::InvalidFsm(idx) => write!(f, "Invalid FSM index {idx}"),
            OfsmError::InvalidState(state) => write!(f, "Invalid state {state}"),
            OfsmError::EventOutOfRange(code) => write!(f, "Event code {code} is out of range"),
            OfsmError::QueueFull => write!(f, "Event queue is full"),
            OfsmError::QueueCapacity(size) => write!(f, "Invalid event queue capacity {size}"),
            OfsmError::TableShape => write!(f, "Invalid transition table shape"),
            OfsmError::TooManyGroups => write!(f, "Too many groups"),
            OfsmError::TooManyFsms => write!(f, "Too many FSMs in group"),
            OfsmError::EmptyTopology => write!(f, "No groups declared"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for OfsmError {}

#[cfg(feature = "defmt")]
impl defmt::Format for OfsmError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            OfsmError::InvalidGroup(idx) => defmt::write!(fmt, "InvalidGroup({})", idx),
            OfsmError::InvalidFsm(idx) => defmt::write!(fmt, "InvalidFsm({})", idx),
            OfsmError::InvalidState(state) => defmt::write!(fmt, "InvalidState({})", state),
            OfsmError::EventOutOfRange(code) => defmt::write!(fmt, "EventOutOfRange({})", code),
            OfsmError::QueueFull => defmt::write!(fmt, "QueueFull"),
            OfsmError::QueueCapacity(size) => defmt::write!(fmt, "QueueCapacity({})", size),
            OfsmError::TableShape => defmt::write!(fmt, "TableShape"),
            OfsmError::TooManyGroups => defmt::write!(fmt, "TooManyGroups"),
            OfsmError::TooManyFsms => defmt::write!(fmt, "TooManyFsms"),
            OfsmError::EmptyTopology => defmt::write!(fmt, "EmptyTopology"),
        }
    }
}
