//! Groups: FSMs sharing one event queue

use alloc::vec::Vec;
use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};
use log::trace;

use ofsm_core::{FsmCoords, Timestamp};
use ofsm_fsm::{Dispatch, Fsm, FsmStatus};

use crate::queue::EventQueue;

/// Arena index of an FSM owned by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FsmId(pub(crate) usize);

impl FsmId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Sleep requirement aggregated over a set of FSMs.
///
/// `earliest` is the soonest scheduled wakeup; `None` means every FSM is in
/// infinite sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Consensus {
    pub earliest: Option<Timestamp>,
}

impl Consensus {
    /// Nothing scheduled
    pub const IDLE: Self = Self { earliest: None };

    pub fn is_infinite_sleep(&self) -> bool {
        self.earliest.is_none()
    }

    pub fn include(&mut self, status: &FsmStatus) {
        self.include_wakeup(status.scheduled_wakeup());
    }

    pub fn merge(&mut self, other: Consensus) {
        self.include_wakeup(other.earliest);
    }

    fn include_wakeup(&mut self, wakeup: Option<Timestamp>) {
        self.earliest = match (self.earliest, wakeup) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Result of one dispatch pass over a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupReport {
    pub consensus: Consensus,
    /// Events remain queued after the one just dispatched
    pub backlog: bool,
}

pub struct Group {
    index: u8,
    members: Vec<FsmId>,
    queue: Mutex<RefCell<EventQueue>>,
}

impl Group {
    pub(crate) fn new(index: u8, members: Vec<FsmId>, queue: EventQueue) -> Self {
        Self {
            index,
            members,
            queue: Mutex::new(RefCell::new(queue)),
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn members(&self) -> &[FsmId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Run `f` on the queue inside a caller-held critical section.
    pub fn with_queue<R>(&self, cs: CriticalSection<'_>, f: impl FnOnce(&mut EventQueue) -> R) -> R {
        f(&mut self.queue.borrow_ref_mut(cs))
    }

    /// Deliver at most one pending event to every member, then collect
    /// their sleep requirements. Members are polled even when the queue was
    /// empty.
    pub(crate) fn dispatch_pending(&self, fsms: &[Fsm], base: &Dispatch<'_>) -> GroupReport {
        let pending = critical_section::with(|cs| self.with_queue(cs, EventQueue::pop));
        if pending.is_none() {
            trace!("G({}): Event queue is empty.", self.index);
        }

        let mut consensus = Consensus::IDLE;
        for (position, id) in self.members.iter().enumerate() {
            let Some(fsm) = fsms.get(id.0) else {
                continue;
            };
            if let Some((event, _)) = pending {
                let dispatch = Dispatch {
                    coords: FsmCoords::new(self.index, position as u8),
                    ..*base
                };
                fsm.process_event(&event, &dispatch);
            }
            consensus.include(&fsm.status());
        }

        GroupReport {
            consensus,
            backlog: pending.is_some_and(|(_, more)| more),
        }
    }
}
