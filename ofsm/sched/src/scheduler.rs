//! The orchestrator: queues, time and the cooperative main loop.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::Cell;

use critical_section::{CriticalSection, Mutex};
use log::{debug, error, info, trace};

use ofsm_core::{
    Enqueued, Event, EventCode, EventData, FsmCoords, LogSink, OResult, OfsmError, SchedulerFlags,
    Tick, Timestamp, TraceRecord, TraceSink, MAX_GROUPS, MAX_GROUP_FSMS,
};
use ofsm_fsm::{Dispatch, Fsm, Runtime};

use crate::config::SchedulerConfig;
use crate::group::{Consensus, FsmId, Group};
use crate::platform::Platform;
use crate::queue::EventQueue;
use crate::status::StatusReport;

/// Outcome of one pass of the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Work remains; run another pass right away
    Again,
    /// Nothing to do until the given wakeup (`None`: until an event arrives)
    Sleep(Option<Timestamp>),
    /// Exit was requested
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Shared {
    flags: SchedulerFlags,
    wakeup: Timestamp,
    now: Timestamp,
}

impl Shared {
    const STARTUP: Self = Self {
        flags: SchedulerFlags::STARTUP,
        wakeup: Timestamp::ZERO,
        now: Timestamp::ZERO,
    };
}

enum Commit {
    Due,
    Sleep(Option<Timestamp>),
}

/// Declares FSMs and groups, then produces an [`Orchestrator`].
pub struct OrchestratorBuilder {
    config: SchedulerConfig,
    fsms: Vec<Fsm>,
    groups: Vec<Group>,
    trace: Option<Arc<dyn TraceSink>>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl OrchestratorBuilder {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            fsms: Vec::new(),
            groups: Vec::new(),
            trace: None,
        }
    }

    /// Hand an FSM to the scheduler; the id places it into groups.
    pub fn add_fsm(&mut self, fsm: Fsm) -> FsmId {
        self.fsms.push(fsm);
        FsmId(self.fsms.len() - 1)
    }

    /// Declare a group with its own queue of `capacity` slots.
    ///
    /// An FSM may be a member of several groups. Returns the group index.
    pub fn add_group(&mut self, capacity: usize, members: &[FsmId]) -> OResult<u8> {
        if self.groups.len() >= MAX_GROUPS {
            return Err(OfsmError::TooManyGroups);
        }
        if members.len() > MAX_GROUP_FSMS {
            return Err(OfsmError::TooManyFsms);
        }
        if let Some(position) = members.iter().position(|id| id.0 >= self.fsms.len()) {
            return Err(OfsmError::InvalidFsm(position as u8));
        }

        let index = self.groups.len() as u8;
        let queue = EventQueue::new(capacity)?;
        self.groups.push(Group::new(index, members.to_vec(), queue));
        Ok(index)
    }

    /// Install a trace sink; [`LogSink`] is used otherwise.
    pub fn with_trace(&mut self, sink: Arc<dyn TraceSink>) -> &mut Self {
        self.trace = Some(sink);
        self
    }

    pub fn build<P: Platform>(self, platform: P) -> OResult<Orchestrator<P>> {
        if self.groups.is_empty() {
            return Err(OfsmError::EmptyTopology);
        }
        info!(
            "{}: {} group(s), {} FSM(s)",
            self.config.name,
            self.groups.len(),
            self.fsms.len()
        );
        Ok(Orchestrator {
            config: self.config,
            fsms: self.fsms,
            groups: self.groups,
            platform,
            trace: self.trace.unwrap_or_else(|| Arc::new(LogSink)),
            shared: Mutex::new(Cell::new(Shared::STARTUP)),
        })
    }
}

/// Scheduler context owning every group and FSM.
///
/// All methods take `&self`; state shared with producers lives behind
/// critical sections so an `Arc<Orchestrator<_>>` can be driven from a
/// scheduler thread while other threads or interrupts queue events and
/// advance time.
pub struct Orchestrator<P> {
    config: SchedulerConfig,
    fsms: Vec<Fsm>,
    groups: Vec<Group>,
    platform: P,
    trace: Arc<dyn TraceSink>,
    shared: Mutex<Cell<Shared>>,
}

impl<P: Platform> Orchestrator<P> {
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn group_count(&self) -> u8 {
        self.groups.len() as u8
    }

    /// Number of FSMs in `group`.
    pub fn group_size(&self, group: u8) -> OResult<u8> {
        Ok(self.group(group)?.len() as u8)
    }

    /// FSM at position `fsm` of `group`.
    pub fn fsm(&self, group: u8, fsm: u8) -> OResult<&Fsm> {
        self.group(group)?
            .members()
            .get(fsm as usize)
            .and_then(|id| self.fsms.get(id.0))
            .ok_or(OfsmError::InvalidFsm(fsm))
    }

    /// Run every FSM's initialization handler.
    pub fn start(&self) {
        for group in &self.groups {
            for (position, id) in group.members().iter().enumerate() {
                if let Some(fsm) = self.fsms.get(id.0) {
                    fsm.initialize(&self.dispatch_for(FsmCoords::new(group.index(), position as u8)));
                }
            }
        }
    }

    /// Return to the startup state, then rerun initialization.
    ///
    /// Time goes back to zero, queues are emptied and every FSM returns to
    /// state 0 in infinite sleep.
    pub fn reset(&self) {
        debug!("O: Resetting...");
        critical_section::with(|cs| {
            self.shared.borrow(cs).set(Shared::STARTUP);
            for group in &self.groups {
                group.with_queue(cs, EventQueue::clear);
            }
        });
        for fsm in &self.fsms {
            fsm.reset();
        }
        self.start();
    }

    pub fn now(&self) -> Timestamp {
        critical_section::with(|cs| self.shared.borrow(cs).get().now)
    }

    pub fn flags(&self) -> SchedulerFlags {
        critical_section::with(|cs| self.shared.borrow(cs).get().flags)
    }

    /// Wakeup committed before the last sleep, `None` during infinite sleep.
    pub fn scheduled_wakeup(&self) -> Option<Timestamp> {
        critical_section::with(|cs| {
            let shared = self.shared.borrow(cs).get();
            (!shared.flags.infinite_sleep).then_some(shared.wakeup)
        })
    }

    /// Queue an event into one group.
    ///
    /// Never blocks. An invalid group or a full queue drops the event; the
    /// error is logged and returned.
    pub fn enqueue_group_event(
        &self,
        group: u8,
        force_new: bool,
        code: EventCode,
        data: EventData,
    ) -> OResult<Enqueued> {
        self.push_event(group, force_new, Event::new(code, data))
    }

    /// Queue an event into every group.
    pub fn enqueue_global_event(&self, force_new: bool, code: EventCode, data: EventData) {
        self.push_global(force_new, Event::new(code, data));
    }

    /// Record a new heartbeat time, then queue a timeout if the scheduled
    /// wakeup has been reached.
    ///
    /// A value lower than the previous one is a counter wrap. Safe to call
    /// from interrupt context.
    pub fn advance_time(&self, ticks: Tick) {
        self.advance(|_| ticks);
    }

    /// Advance time by one tick.
    ///
    /// The read and the update share one critical section, so concurrent
    /// heartbeats never lose a tick.
    pub fn heartbeat(&self) {
        self.advance(|now| now.ticks().wrapping_add(1));
    }

    /// Make [`run`](Self::run) return at the start of its next pass.
    pub fn request_exit(&self) {
        self.modify(|shared| shared.flags.exit_requested = true);
        self.platform.wake();
    }

    /// One pass of the main loop.
    ///
    /// Every group gets to deliver one pending event to its FSMs. The pass
    /// then decides whether to go again (backlog, new events, a wakeup that
    /// is already due) or to sleep until the earliest scheduled wakeup.
    pub fn dispatch_once(&self) -> Step {
        let (exit, timeout_wakes_sleepers) = self.modify(|shared| {
            shared.flags.infinite_sleep = true;
            shared.flags.event_queued = false;
            (
                shared.flags.exit_requested,
                shared.flags.timeout_wakes_sleepers,
            )
        });
        if exit {
            debug!("O: Exit requested.");
            return Step::Exit;
        }

        let mut base = self.dispatch_for(FsmCoords::new(0, 0));
        base.timeout_wakes_sleepers = timeout_wakes_sleepers;

        let mut consensus = Consensus::IDLE;
        for group in &self.groups {
            trace!("O: Processing event for group index {}...", group.index());
            let report = group.dispatch_pending(&self.fsms, &base);
            if report.backlog {
                self.modify(|shared| shared.flags.event_queued = true);
            }
            consensus.merge(report.consensus);
        }

        if self.flags().event_queued {
            trace!("O: At least one group has pending event(s). Re-process all groups.");
            return Step::Again;
        }

        match critical_section::with(|cs| self.commit(cs, consensus)) {
            Commit::Due => {
                debug!("O: Reached timeout. Queue global timeout event.");
                self.push_global(false, Event::TIMEOUT);
                Step::Again
            }
            Commit::Sleep(wakeup) => {
                self.trace.record(&TraceRecord::Sleep { wakeup });
                Step::Sleep(wakeup)
            }
        }
    }

    /// Run passes until the scheduler would sleep or exit; never sleeps.
    pub fn run_until_idle(&self) -> Step {
        loop {
            match self.dispatch_once() {
                Step::Again => continue,
                step => return step,
            }
        }
    }

    /// Main loop. Sleeps through the platform between passes and returns
    /// once [`request_exit`](Self::request_exit) was called.
    pub fn run(&self) {
        loop {
            match self.dispatch_once() {
                Step::Again => {}
                Step::Sleep(until) => {
                    self.platform.sleep(until);
                    trace!("O: Waked up.");
                }
                Step::Exit => return,
            }
        }
    }

    /// Atomic snapshot of the scheduler, `group` and its FSM `fsm`.
    pub fn status(&self, group: u8, fsm: u8) -> OResult<StatusReport> {
        let target = self.group(group)?;
        let machine = self.fsm(group, fsm)?;
        Ok(critical_section::with(|cs| {
            let shared = self.shared_in(cs);
            let (queue_overflow, pending) =
                target.with_queue(cs, |queue| (queue.is_overflowed(), queue.len()));
            let status = machine.status_in(cs);
            StatusReport {
                infinite_sleep: shared.flags.infinite_sleep,
                group,
                queue_overflow,
                pending,
                fsm,
                fsm_flags: status.flags,
                state: status.state,
                now: shared.now,
                wakeup: (!shared.flags.infinite_sleep).then_some(shared.wakeup),
                fsm_wakeup: status.scheduled_wakeup(),
            }
        }))
    }

    /// Events waiting in `group`, oldest first.
    pub fn pending_events(&self, group: u8) -> OResult<Vec<Event>> {
        let target = self.group(group)?;
        Ok(critical_section::with(|cs| {
            target.with_queue(cs, |queue| queue.iter().copied().collect())
        }))
    }
}

impl<P: Platform> Orchestrator<P> {
    fn group(&self, group: u8) -> OResult<&Group> {
        self.groups
            .get(group as usize)
            .ok_or(OfsmError::InvalidGroup(group))
    }

    fn dispatch_for(&self, coords: FsmCoords) -> Dispatch<'_> {
        Dispatch {
            coords,
            runtime: self,
            trace: &*self.trace,
            timing: self.config.timing(),
            timeout_wakes_sleepers: self.flags().timeout_wakes_sleepers,
        }
    }

    fn advance(&self, next: impl FnOnce(Timestamp) -> Tick) {
        let shared = self.modify(|shared| {
            shared.now = shared.now.advance_to(next(shared.now));
            *shared
        });

        if shared.flags.infinite_sleep {
            // a pass is in flight or everything sleeps; only make sure a
            // freshly queued event is not slept through
            if shared.flags.event_queued {
                self.platform.wake();
            }
        } else if shared.now.is_at_or_after(shared.wakeup) {
            debug!("O: Reached timeout. Queue global timeout event.");
            self.push_global(false, Event::TIMEOUT);
        }
    }

    fn shared_in(&self, cs: CriticalSection<'_>) -> Shared {
        self.shared.borrow(cs).get()
    }

    fn modify<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        critical_section::with(|cs| {
            let cell = self.shared.borrow(cs);
            let mut shared = cell.get();
            let result = f(&mut shared);
            cell.set(shared);
            result
        })
    }

    /// Decide between sleeping and a due timeout, atomically with respect
    /// to the heartbeat.
    fn commit(&self, cs: CriticalSection<'_>, consensus: Consensus) -> Commit {
        let cell = self.shared.borrow(cs);
        let mut shared = cell.get();

        if let Some(earliest) = consensus.earliest {
            if shared.now.is_at_or_after(earliest) {
                return Commit::Due;
            }
        }

        shared.flags.infinite_sleep = consensus.is_infinite_sleep();
        shared.wakeup = consensus.earliest.unwrap_or(Timestamp::ZERO);
        // Every live wakeup is past the wrap the clock has entered: that
        // wrap is now the current one.
        if shared.flags.infinite_sleep || (shared.now.overflowed() && shared.wakeup.overflowed()) {
            shared.now = shared.now.rebased();
            shared.wakeup = shared.wakeup.rebased();
            for fsm in &self.fsms {
                fsm.rebase_in(cs);
            }
        }
        shared.flags.timeout_wakes_sleepers = false;
        cell.set(shared);

        trace!(
            "O: Entering sleep... Wakeup Time {}.",
            if shared.flags.infinite_sleep {
                -1
            } else {
                i64::from(shared.wakeup.ticks())
            }
        );
        Commit::Sleep((!shared.flags.infinite_sleep).then_some(shared.wakeup))
    }

    fn push_event(&self, group: u8, force_new: bool, event: Event) -> OResult<Enqueued> {
        let Ok(target) = self.group(group) else {
            error!("O: Invalid Group Index {group}!!! Dropped {event}.");
            return Err(OfsmError::InvalidGroup(group));
        };

        let result = critical_section::with(|cs| {
            let result = target.with_queue(cs, |queue| queue.push(force_new, event));
            if result == Ok(Enqueued::Appended) {
                let cell = self.shared.borrow(cs);
                let mut shared = cell.get();
                shared.flags.event_queued = true;
                cell.set(shared);
            }
            result
        });

        match result {
            Ok(outcome) => {
                if outcome == Enqueued::Appended || self.config.wake_on_coalesce {
                    self.platform.wake();
                }
                self.trace.record(&TraceRecord::Enqueued {
                    group,
                    event,
                    outcome,
                });
            }
            Err(_) => {
                self.platform.wake();
                self.trace.record(&TraceRecord::Dropped { group, event });
            }
        }
        result
    }

    fn push_global(&self, force_new: bool, event: Event) {
        for group in &self.groups {
            trace!("O: Event queuing group {}...", group.index());
            // failures are logged and traced per group
            let _ = self.push_event(group.index(), force_new, event);
        }
    }
}

impl<P: Platform> Runtime for Orchestrator<P> {
    fn now(&self) -> Timestamp {
        Orchestrator::now(self)
    }

    fn enqueue(&self, group: u8, force_new: bool, event: Event) -> OResult<Enqueued> {
        self.push_event(group, force_new, event)
    }
}
