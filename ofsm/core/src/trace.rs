//! Structured trace records
//!
//! The scheduler reports what it does as [`TraceRecord`] values handed to a
//! [`TraceSink`]. The default [`LogSink`] renders them through the `log`
//! facade at levels matching their severity; tests install a
//! [`RecordingSink`] and inspect the sequence.

use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;
use log::Level;

use crate::{Enqueued, Event, FsmCoords, StateId, Tick, Timestamp};

/// Why an event did not reach a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// Timeout arrived before the FSM's wakeup time or during infinite sleep
    Asleep,
    /// The table has no handler for this state and event
    NoHandler,
}

/// One observable scheduler step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceRecord {
    /// A handler ran and the FSM moved to `to`.
    ///
    /// `delay` is `None` when the FSM entered infinite sleep.
    Transition {
        fsm: FsmCoords,
        from: StateId,
        event: Event,
        to: StateId,
        overridden: bool,
        delay: Option<Tick>,
        at: Timestamp,
    },
    /// The handler prevented the transition; the FSM was restored.
    Vetoed {
        fsm: FsmCoords,
        state: StateId,
        event: Event,
    },
    /// The event was not delivered.
    Suppressed {
        fsm: FsmCoords,
        state: StateId,
        event: Event,
        reason: Suppression,
    },
    /// An event entered a group queue.
    Enqueued {
        group: u8,
        event: Event,
        outcome: Enqueued,
    },
    /// An event was dropped because the queue was full.
    Dropped { group: u8, event: Event },
    /// The scheduler is about to sleep; `None` means until woken.
    Sleep { wakeup: Option<Timestamp> },
}

impl TraceRecord {
    /// `log` level used when rendering the record.
    pub fn level(&self) -> Level {
        match self {
            TraceRecord::Dropped { .. } => Level::Warn,
            TraceRecord::Transition { .. } => Level::Info,
            TraceRecord::Vetoed { .. } | TraceRecord::Enqueued { .. } => Level::Debug,
            TraceRecord::Suppressed { .. } | TraceRecord::Sleep { .. } => Level::Trace,
        }
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceRecord::Transition {
                fsm,
                from,
                to,
                overridden,
                delay,
                ..
            } => {
                write!(
                    f,
                    "{fsm}: Transitioning from state {from} ==> {}{to}. Transition delay: ",
                    if *overridden { "!" } else { "" }
                )?;
                match delay {
                    Some(ticks) => write!(f, "{ticks}"),
                    None => write!(f, "-1"),
                }
            }
            TraceRecord::Vetoed { fsm, state, .. } => write!(
                f,
                "{fsm}: Handler requested no transition. FSM state {state} was restored."
            ),
            TraceRecord::Suppressed {
                fsm,
                state,
                event,
                reason: Suppression::NoHandler,
            } => write!(
                f,
                "{fsm}: Handler is not specified, state {state} event code {}. Assuming infinite sleep.",
                event.code
            ),
            TraceRecord::Suppressed {
                fsm,
                reason: Suppression::Asleep,
                ..
            } => write!(f, "{fsm}: State Machine is asleep."),
            TraceRecord::Enqueued {
                group,
                event,
                outcome,
            } => write!(
                f,
                "G({group}): Queued {event} (Updated {}).",
                u8::from(*outcome == Enqueued::Coalesced)
            ),
            TraceRecord::Dropped { group, event } => {
                write!(f, "G({group}): Buffer overflow. {event} dropped.")
            }
            TraceRecord::Sleep { wakeup: Some(at) } => {
                write!(f, "O: Entering sleep... Wakeup Time {}.", at.ticks())
            }
            TraceRecord::Sleep { wakeup: None } => write!(f, "O: Entering sleep... Wakeup Time -1."),
        }
    }
}

/// Destination for trace records.
pub trait TraceSink: Send + Sync {
    fn record(&self, record: &TraceRecord);
}

impl<F> TraceSink for F
where
    F: Fn(&TraceRecord) + Send + Sync,
{
    fn record(&self, record: &TraceRecord) {
        self(record)
    }
}

/// Renders records through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn record(&self, record: &TraceRecord) {
        log::log!(record.level(), "{record}");
    }
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn record(&self, _record: &TraceRecord) {}
}

/// Keeps every record in memory.
pub struct RecordingSink {
    records: Mutex<RefCell<Vec<TraceRecord>>>,
}

impl RecordingSink {
    pub const fn new() -> Self {
        Self {
            records: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Copy of everything recorded so far
    pub fn records(&self) -> Vec<TraceRecord> {
        critical_section::with(|cs| self.records.borrow_ref(cs).clone())
    }

    /// Drain the recorded sequence
    pub fn take(&self) -> Vec<TraceRecord> {
        critical_section::with(|cs| core::mem::take(&mut *self.records.borrow_ref_mut(cs)))
    }

    /// Transition records only, in order
    pub fn transitions(&self) -> Vec<TraceRecord> {
        critical_section::with(|cs| {
            self.records
                .borrow_ref(cs)
                .iter()
                .filter(|record| matches!(record, TraceRecord::Transition { .. }))
                .copied()
                .collect()
        })
    }

    pub fn clear(&self) {
        critical_section::with(|cs| self.records.borrow_ref_mut(cs).clear());
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceSink for RecordingSink {
    fn record(&self, record: &TraceRecord) {
        critical_section::with(|cs| self.records.borrow_ref_mut(cs).push(*record));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventCode;
    use std::string::ToString;

    fn transition(overridden: bool, delay: Option<Tick>) -> TraceRecord {
        TraceRecord::Transition {
            fsm: FsmCoords::new(1, 0),
            from: StateId(0),
            event: Event::new(EventCode(2), 7),
            to: StateId(1),
            overridden,
            delay,
            at: Timestamp::new(3),
        }
    }

    #[test]
    fn transition_text() {
        assert_eq!(
            transition(false, Some(5)).to_string(),
            "F(0)G(1): Transitioning from state 0 ==> 1. Transition delay: 5"
        );
        assert_eq!(
            transition(true, None).to_string(),
            "F(0)G(1): Transitioning from state 0 ==> !1. Transition delay: -1"
        );
    }

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.record(&TraceRecord::Sleep { wakeup: None });
        sink.record(&transition(false, Some(1)));
        sink.record(&TraceRecord::Dropped {
            group: 0,
            event: Event::TIMEOUT,
        });

        assert_eq!(sink.records().len(), 3);
        assert_eq!(sink.transitions(), [transition(false, Some(1))]);
        assert_eq!(sink.take().len(), 3);
        assert!(sink.records().is_empty());
    }

    #[test]
    fn closures_are_sinks() {
        use core::sync::atomic::{AtomicUsize, Ordering};

        let seen = AtomicUsize::new(0);
        let sink = |_: &TraceRecord| {
            seen.fetch_add(1, Ordering::Relaxed);
        };
        sink.record(&TraceRecord::Sleep { wakeup: None });
        sink.record(&TraceRecord::Sleep { wakeup: None });
        assert_eq!(seen.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn dropped_events_log_as_warnings() {
        let record = TraceRecord::Dropped {
            group: 2,
            event: Event::new(EventCode(4), 0),
        };
        assert_eq!(record.level(), Level::Warn);
        assert_eq!(
            record.to_string(),
            "G(2): Buffer overflow. eventCode 4 eventData 0 dropped."
        );
    }
}
