//! FSM runtime state and event processing

use alloc::sync::Arc;
use core::any::Any;
use core::cell::Cell;

use critical_section::{CriticalSection, Mutex};
use log::{debug, trace, warn};

use ofsm_core::{
    Event, FsmCoords, FsmFlags, StateId, Suppression, Tick, Timestamp, TraceRecord, TraceSink,
    INFINITE_TICKS,
};

use crate::context::{FsmContext, Runtime};
use crate::table::{Handler, TransitionTable};

/// Time a handler's delay is measured from.
///
/// Applies to the configured default delay as well as to one set by the
/// handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelayBase {
    /// The instant sampled before the handler ran
    #[default]
    BeforeHandler,
    /// A fresh sample taken after the handler returned
    AfterHandler,
}

/// How wakeups are computed after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timing {
    /// Delay used when the handler did not set one
    pub default_delay: Tick,
    pub delay_base: DelayBase,
}

/// Everything `process_event` needs from the scheduler for one delivery.
#[derive(Clone, Copy)]
pub struct Dispatch<'a> {
    pub coords: FsmCoords,
    pub runtime: &'a dyn Runtime,
    pub trace: &'a dyn TraceSink,
    pub timing: Timing,
    /// Startup override: timeouts also reach FSMs in infinite sleep
    pub timeout_wakes_sleepers: bool,
}

/// Mutable part of an FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsmStatus {
    pub state: StateId,
    /// Meaningless while `flags.infinite_sleep` is set
    pub wakeup: Timestamp,
    pub flags: FsmFlags,
}

impl FsmStatus {
    pub const STARTUP: Self = Self {
        state: StateId::INITIAL,
        wakeup: Timestamp::ZERO,
        flags: FsmFlags::STARTUP,
    };

    /// Wakeup time, or `None` during infinite sleep.
    pub fn scheduled_wakeup(&self) -> Option<Timestamp> {
        (!self.flags.infinite_sleep).then_some(self.wakeup)
    }

    fn is_asleep(&self, now: Timestamp, timeout_wakes_sleepers: bool) -> bool {
        (self.flags.infinite_sleep && !timeout_wakes_sleepers) || self.wakeup.is_after(now)
    }
}

/// One state machine instance.
pub struct Fsm {
    table: TransitionTable,
    init: Option<Handler>,
    private: Option<Arc<dyn Any + Send + Sync>>,
    status: Mutex<Cell<FsmStatus>>,
}

impl Fsm {
    pub fn new(table: TransitionTable) -> Self {
        Self {
            table,
            init: None,
            private: None,
            status: Mutex::new(Cell::new(FsmStatus::STARTUP)),
        }
    }

    /// Handler run once at start and after every reset.
    pub fn with_init(mut self, handler: Handler) -> Self {
        self.init = Some(handler);
        self
    }

    /// Data handed to handlers through [`FsmContext::private_data`].
    pub fn with_private_data<T: Any + Send + Sync>(mut self, data: T) -> Self {
        self.private = Some(Arc::new(data));
        self
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn status(&self) -> FsmStatus {
        critical_section::with(|cs| self.status_in(cs))
    }

    /// Status read inside a caller-held critical section.
    pub fn status_in(&self, cs: CriticalSection<'_>) -> FsmStatus {
        self.status.borrow(cs).get()
    }

    pub fn reset(&self) {
        self.store(FsmStatus::STARTUP);
    }

    /// Clear the overflow flag of the wakeup time after a counter wrap.
    pub fn rebase_in(&self, cs: CriticalSection<'_>) {
        let cell = self.status.borrow(cs);
        let mut status = cell.get();
        status.wakeup = status.wakeup.rebased();
        cell.set(status);
    }

    /// Run the initialization handler, if any.
    ///
    /// The handler sees a timeout event. A state override moves the FSM, a
    /// delay schedules its first wakeup; otherwise it stays asleep.
    pub fn initialize(&self, dispatch: &Dispatch<'_>) {
        let Some(init) = self.init else {
            return;
        };
        let coords = dispatch.coords;
        debug!("{coords}: Initializing...");

        let before = self.status();
        let mut ctx = FsmContext::new(
            coords,
            before.state,
            Event::TIMEOUT,
            INFINITE_TICKS,
            &self.table,
            self.private.as_deref(),
            dispatch.runtime,
        );
        init(&mut ctx);
        let outcome = ctx.outcome;
        if outcome.prevent {
            return;
        }

        let mut after = before;
        if let Some(state) = outcome.next_state {
            after.state = state;
            after.flags.next_state_override = true;
        }
        if outcome.infinite {
            after.flags.infinite_sleep = true;
        } else if let Some(delay) = outcome.delay {
            after.wakeup = dispatch.runtime.now().offset(delay);
            after.flags.infinite_sleep = false;
        }
        self.store(after);
    }

    /// Deliver one event.
    ///
    /// Calls at most one handler. The handler runs outside the critical
    /// section so it can queue events of its own.
    pub fn process_event(&self, event: &Event, dispatch: &Dispatch<'_>) {
        let coords = dispatch.coords;
        if !self.table.contains_event(event.code) {
            warn!(
                "{coords}: Unexpected Event!!! Ignored eventCode {}.",
                event.code
            );
            return;
        }

        let now = dispatch.runtime.now();
        let before = self.status();
        let Some(transition) = self.table.get(before.state, event.code) else {
            warn!("{coords}: State {} has no table row.", before.state);
            return;
        };

        let Some(handler) = transition.handler() else {
            if event.is_timeout() {
                // the state cannot wake itself
                self.update(|status| status.flags.infinite_sleep = true);
            }
            self.suppress(dispatch, before.state, event, Suppression::NoHandler);
            return;
        };
        if event.is_timeout() && before.is_asleep(now, dispatch.timeout_wakes_sleepers) {
            if before.flags.infinite_sleep {
                trace!("{coords}: State Machine is in infinite sleep.");
            } else {
                trace!(
                    "{coords}: State Machine is asleep. Wakeup is scheduled in {} ticks.",
                    now.ticks_until(before.wakeup)
                );
            }
            self.suppress(dispatch, before.state, event, Suppression::Asleep);
            return;
        }

        let time_left = if before.flags.infinite_sleep {
            INFINITE_TICKS
        } else {
            now.ticks_until(before.wakeup)
        };
        self.store(FsmStatus {
            state: before.state,
            wakeup: Timestamp::ZERO,
            flags: FsmFlags::CLEAR,
        });
        debug!(
            "{coords}: State: {}. Processing {event}...",
            before.state
        );

        let mut ctx = FsmContext::new(
            coords,
            before.state,
            *event,
            time_left,
            &self.table,
            self.private.as_deref(),
            dispatch.runtime,
        );
        handler(&mut ctx);
        let outcome = ctx.outcome;

        if outcome.prevent {
            let mut flags = before.flags;
            flags.prevent_transition = true;
            self.store(FsmStatus { flags, ..before });
            dispatch.trace.record(&TraceRecord::Vetoed {
                fsm: coords,
                state: before.state,
                event: *event,
            });
            return;
        }

        let next = outcome.next_state.unwrap_or(transition.next_state());
        let base = match dispatch.timing.delay_base {
            DelayBase::BeforeHandler => now,
            DelayBase::AfterHandler => dispatch.runtime.now(),
        };
        let delay = if outcome.infinite || !self.table.handles_timeout(next) {
            None
        } else {
            Some(outcome.delay.unwrap_or(dispatch.timing.default_delay))
        };

        self.store(FsmStatus {
            state: next,
            wakeup: delay.map_or(Timestamp::ZERO, |ticks| base.offset(ticks)),
            flags: FsmFlags {
                infinite_sleep: delay.is_none(),
                prevent_transition: false,
                next_state_override: outcome.next_state.is_some(),
            },
        });
        dispatch.trace.record(&TraceRecord::Transition {
            fsm: coords,
            from: before.state,
            event: *event,
            to: next,
            overridden: outcome.next_state.is_some(),
            delay,
            at: base,
        });
    }

    fn suppress(&self, dispatch: &Dispatch<'_>, state: StateId, event: &Event, reason: Suppression) {
        dispatch.trace.record(&TraceRecord::Suppressed {
            fsm: dispatch.coords,
            state,
            event: *event,
            reason,
        });
    }

    fn store(&self, status: FsmStatus) {
        critical_section::with(|cs| self.status.borrow(cs).set(status));
    }

    fn update(&self, f: impl FnOnce(&mut FsmStatus)) {
        critical_section::with(|cs| {
            let cell = self.status.borrow(cs);
            let mut status = cell.get();
            f(&mut status);
            cell.set(status);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use ofsm_core::{Enqueued, EventCode, OResult, RecordingSink};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::vec::Vec;

    use crate::table::Transition;

    const S0: StateId = StateId(0);
    const S1: StateId = StateId(1);
    const S2: StateId = StateId(2);

    const GO: EventCode = EventCode(1);
    const VETO: EventCode = EventCode(2);
    const SLEEP: EventCode = EventCode(3);
    const JUMP: EventCode = EventCode(4);
    const ECHO: EventCode = EventCode(5);

    fn noop(_: &mut FsmContext<'_>) {}

    fn go(ctx: &mut FsmContext<'_>) {
        ctx.set_delay(10);
    }

    fn veto(ctx: &mut FsmContext<'_>) {
        ctx.prevent_transition();
    }

    fn sleep(ctx: &mut FsmContext<'_>) {
        ctx.set_infinite_delay();
    }

    fn jump(ctx: &mut FsmContext<'_>) {
        ctx.override_next_state(S2).unwrap();
    }

    fn echo(ctx: &mut FsmContext<'_>) {
        let data = ctx.event_data();
        ctx.emit(GO, data).unwrap();
        if let Some(seen) = ctx.private_data::<AtomicU32>() {
            seen.store(ctx.time_left_before_timeout(), Ordering::SeqCst);
        }
    }

    static TABLE: [[Transition; 6]; 3] = [
        // timeout, go, veto, sleep, jump, echo
        [
            Transition::new(noop, S0),
            Transition::new(go, S1),
            Transition::new(veto, S1),
            Transition::new(sleep, S1),
            Transition::new(jump, S1),
            Transition::new(echo, S0),
        ],
        [
            Transition::new(noop, S1),
            Transition::new(noop, S0),
            Transition::EMPTY,
            Transition::EMPTY,
            Transition::EMPTY,
            Transition::new(echo, S1),
        ],
        [
            Transition::EMPTY,
            Transition::new(noop, S0),
            Transition::EMPTY,
            Transition::EMPTY,
            Transition::EMPTY,
            Transition::EMPTY,
        ],
    ];

    struct FakeRuntime {
        now: Cell<Timestamp>,
        queued: RefCell<Vec<(u8, bool, Event)>>,
    }

    impl FakeRuntime {
        fn at(ticks: Tick) -> Self {
            Self {
                now: Cell::new(Timestamp::new(ticks)),
                queued: RefCell::new(Vec::new()),
            }
        }
    }

    impl Runtime for FakeRuntime {
        fn now(&self) -> Timestamp {
            self.now.get()
        }

        fn enqueue(&self, group: u8, force_new: bool, event: Event) -> OResult<Enqueued> {
            self.queued.borrow_mut().push((group, force_new, event));
            Ok(Enqueued::Appended)
        }
    }

    fn dispatch<'a>(rt: &'a FakeRuntime, sink: &'a RecordingSink) -> Dispatch<'a> {
        Dispatch {
            coords: FsmCoords::new(0, 0),
            runtime: rt,
            trace: sink,
            timing: Timing {
                default_delay: 1,
                delay_base: DelayBase::BeforeHandler,
            },
            timeout_wakes_sleepers: false,
        }
    }

    fn fsm() -> Fsm {
        Fsm::new(TransitionTable::from_rows(&TABLE).unwrap())
    }

    fn ev(code: EventCode) -> Event {
        Event::new(code, 0)
    }

    #[test]
    fn non_timeout_event_wakes_sleeping_fsm() {
        let rt = FakeRuntime::at(5);
        let sink = RecordingSink::new();
        let fsm = fsm();

        fsm.process_event(&ev(GO), &dispatch(&rt, &sink));

        let status = fsm.status();
        assert_eq!(status.state, S1);
        assert_eq!(status.scheduled_wakeup(), Some(Timestamp::new(15)));
        assert_eq!(sink.transitions().len(), 1);
    }

    #[test]
    fn default_delay_applies_when_handler_sets_none() {
        let rt = FakeRuntime::at(5);
        let sink = RecordingSink::new();
        let fsm = fsm();
        let mut d = dispatch(&rt, &sink);
        d.timeout_wakes_sleepers = true;

        fsm.process_event(&Event::TIMEOUT, &d);

        let status = fsm.status();
        assert_eq!(status.state, S0);
        assert_eq!(status.scheduled_wakeup(), Some(Timestamp::new(6)));
    }

    #[test]
    fn timeout_waits_for_wakeup_time() {
        let rt = FakeRuntime::at(0);
        let sink = RecordingSink::new();
        let fsm = fsm();
        fsm.process_event(&ev(GO), &dispatch(&rt, &sink));
        sink.clear();

        rt.now.set(Timestamp::new(9));
        fsm.process_event(&Event::TIMEOUT, &dispatch(&rt, &sink));
        assert_eq!(
            sink.records(),
            [TraceRecord::Suppressed {
                fsm: FsmCoords::new(0, 0),
                state: S1,
                event: Event::TIMEOUT,
                reason: Suppression::Asleep,
            }]
        );
        assert_eq!(fsm.status().scheduled_wakeup(), Some(Timestamp::new(10)));

        rt.now.set(Timestamp::new(10));
        fsm.process_event(&Event::TIMEOUT, &dispatch(&rt, &sink));
        assert_eq!(sink.transitions().len(), 1);
        assert_eq!(fsm.status().scheduled_wakeup(), Some(Timestamp::new(11)));
    }

    #[test]
    fn infinite_sleep_ignores_timeout_unless_startup_override() {
        let rt = FakeRuntime::at(3);
        let sink = RecordingSink::new();
        let fsm = fsm();

        fsm.process_event(&Event::TIMEOUT, &dispatch(&rt, &sink));
        assert_eq!(fsm.status(), FsmStatus::STARTUP);
        assert!(sink.transitions().is_empty());

        let mut d = dispatch(&rt, &sink);
        d.timeout_wakes_sleepers = true;
        fsm.process_event(&Event::TIMEOUT, &d);
        assert_eq!(sink.transitions().len(), 1);
        assert!(!fsm.status().flags.infinite_sleep);
    }

    #[test]
    fn veto_restores_previous_status() {
        let rt = FakeRuntime::at(0);
        let sink = RecordingSink::new();
        let fsm = fsm();
        let mut d = dispatch(&rt, &sink);
        d.timeout_wakes_sleepers = true;
        fsm.process_event(&Event::TIMEOUT, &d);
        let before = fsm.status();

        rt.now.set(Timestamp::new(1));
        fsm.process_event(&ev(VETO), &dispatch(&rt, &sink));

        let after = fsm.status();
        assert_eq!(after.state, before.state);
        assert_eq!(after.wakeup, before.wakeup);
        assert!(after.flags.prevent_transition);
        assert_eq!(after.flags.infinite_sleep, before.flags.infinite_sleep);
    }

    #[test]
    fn infinite_delay_request_sticks() {
        let rt = FakeRuntime::at(0);
        let sink = RecordingSink::new();
        let fsm = fsm();

        fsm.process_event(&ev(SLEEP), &dispatch(&rt, &sink));

        let status = fsm.status();
        assert_eq!(status.state, S1);
        assert!(status.flags.infinite_sleep);
        assert_eq!(status.scheduled_wakeup(), None);
    }

    #[test]
    fn override_wins_over_table_target() {
        let rt = FakeRuntime::at(0);
        let sink = RecordingSink::new();
        let fsm = fsm();

        fsm.process_event(&ev(JUMP), &dispatch(&rt, &sink));

        let status = fsm.status();
        assert_eq!(status.state, S2);
        assert!(status.flags.next_state_override);
        // S2 has no timeout handler
        assert!(status.flags.infinite_sleep);
        match sink.transitions()[0] {
            TraceRecord::Transition {
                overridden, delay, ..
            } => {
                assert!(overridden);
                assert_eq!(delay, None);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn unhandled_event_keeps_schedule() {
        let rt = FakeRuntime::at(0);
        let sink = RecordingSink::new();
        let fsm = fsm();
        fsm.process_event(&ev(GO), &dispatch(&rt, &sink));

        fsm.process_event(&ev(VETO), &dispatch(&rt, &sink));

        let status = fsm.status();
        assert_eq!(status.state, S1);
        assert_eq!(status.scheduled_wakeup(), Some(Timestamp::new(10)));
        assert!(matches!(
            sink.records().last(),
            Some(TraceRecord::Suppressed {
                reason: Suppression::NoHandler,
                ..
            })
        ));
    }

    #[test]
    fn missing_timeout_handler_forces_infinite_sleep() {
        fn park(ctx: &mut FsmContext<'_>) {
            ctx.override_next_state(S2).unwrap();
            ctx.set_delay(1);
        }

        let rt = FakeRuntime::at(0);
        let sink = RecordingSink::new();
        let fsm = fsm().with_init(park);
        fsm.initialize(&dispatch(&rt, &sink));
        assert_eq!(fsm.status().scheduled_wakeup(), Some(Timestamp::new(1)));

        rt.now.set(Timestamp::new(1));
        fsm.process_event(&Event::TIMEOUT, &dispatch(&rt, &sink));

        let status = fsm.status();
        assert_eq!(status.state, S2);
        assert!(status.flags.infinite_sleep);
        assert!(sink.transitions().is_empty());
    }

    #[test]
    fn out_of_range_event_is_ignored() {
        let rt = FakeRuntime::at(0);
        let sink = RecordingSink::new();
        let fsm = fsm();

        fsm.process_event(&ev(EventCode(6)), &dispatch(&rt, &sink));

        assert_eq!(fsm.status(), FsmStatus::STARTUP);
        assert!(sink.records().is_empty());
    }

    #[test]
    fn handler_emits_into_own_group_and_sees_time_left() {
        let rt = FakeRuntime::at(0);
        let sink = RecordingSink::new();
        let fsm = Fsm::new(TransitionTable::from_rows(&TABLE).unwrap())
            .with_private_data(AtomicU32::new(0));
        let mut d = dispatch(&rt, &sink);
        d.coords = FsmCoords::new(2, 1);

        fsm.process_event(&ev(GO), &d);
        rt.now.set(Timestamp::new(4));
        fsm.process_event(&Event::new(ECHO, 9), &d);

        assert_eq!(*rt.queued.borrow(), [(2, false, Event::new(GO, 9))]);
        let seen = fsm.private.as_deref().unwrap().downcast_ref::<AtomicU32>().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn delay_after_handler_uses_fresh_time() {
        fn slow(ctx: &mut FsmContext<'_>) {
            ctx.set_delay(2);
        }
        static SLOW: [[Transition; 2]; 1] = [[Transition::new(noop, S0), Transition::new(slow, S0)]];

        struct Drifting(Cell<Tick>);
        impl Runtime for Drifting {
            fn now(&self) -> Timestamp {
                let t = self.0.get();
                self.0.set(t + 3);
                Timestamp::new(t)
            }
            fn enqueue(&self, _: u8, _: bool, _: Event) -> OResult<Enqueued> {
                Ok(Enqueued::Appended)
            }
        }

        let rt = Drifting(Cell::new(0));
        let sink = RecordingSink::new();
        let fsm = Fsm::new(TransitionTable::from_rows(&SLOW).unwrap());
        let d = Dispatch {
            coords: FsmCoords::new(0, 0),
            runtime: &rt,
            trace: &sink,
            timing: Timing {
                default_delay: 0,
                delay_base: DelayBase::AfterHandler,
            },
            timeout_wakes_sleepers: false,
        };

        fsm.process_event(&ev(EventCode(1)), &d);

        // sampled at 0 before the handler, at 3 after it
        assert_eq!(fsm.status().scheduled_wakeup(), Some(Timestamp::new(5)));
    }

    #[test]
    fn default_delay_follows_the_delay_base() {
        static PLAIN: [[Transition; 2]; 1] = [[Transition::new(noop, S0), Transition::new(noop, S0)]];

        struct Drifting(Cell<Tick>);
        impl Runtime for Drifting {
            fn now(&self) -> Timestamp {
                let t = self.0.get();
                self.0.set(t + 3);
                Timestamp::new(t)
            }
            fn enqueue(&self, _: u8, _: bool, _: Event) -> OResult<Enqueued> {
                Ok(Enqueued::Appended)
            }
        }

        let wakeup_for = |delay_base| {
            let rt = Drifting(Cell::new(0));
            let sink = RecordingSink::new();
            let fsm = Fsm::new(TransitionTable::from_rows(&PLAIN).unwrap());
            let d = Dispatch {
                coords: FsmCoords::new(0, 0),
                runtime: &rt,
                trace: &sink,
                timing: Timing {
                    default_delay: 4,
                    delay_base,
                },
                timeout_wakes_sleepers: false,
            };
            fsm.process_event(&ev(EventCode(1)), &d);
            fsm.status().scheduled_wakeup()
        };

        assert_eq!(wakeup_for(DelayBase::BeforeHandler), Some(Timestamp::new(4)));
        assert_eq!(wakeup_for(DelayBase::AfterHandler), Some(Timestamp::new(7)));
    }

    #[test]
    fn init_handler_schedules_first_wakeup() {
        fn init(ctx: &mut FsmContext<'_>) {
            ctx.override_next_state(S1).unwrap();
            ctx.set_delay(4);
        }

        let rt = FakeRuntime::at(2);
        let sink = RecordingSink::new();
        let fsm = fsm().with_init(init);

        fsm.initialize(&dispatch(&rt, &sink));

        let status = fsm.status();
        assert_eq!(status.state, S1);
        assert_eq!(status.scheduled_wakeup(), Some(Timestamp::new(6)));

        fsm.reset();
        assert_eq!(fsm.status(), FsmStatus::STARTUP);
    }

    #[test]
    fn override_rejects_unknown_state() {
        fn bad(ctx: &mut FsmContext<'_>) {
            assert_eq!(
                ctx.override_next_state(StateId(9)),
                Err(ofsm_core::OfsmError::InvalidState(9))
            );
        }
        static BAD: [[Transition; 2]; 1] = [[Transition::EMPTY, Transition::new(bad, S0)]];

        let rt = FakeRuntime::at(0);
        let sink = RecordingSink::new();
        let fsm = Fsm::new(TransitionTable::from_rows(&BAD).unwrap());

        fsm.process_event(&ev(EventCode(1)), &dispatch(&rt, &sink));

        assert_eq!(fsm.status().state, S0);
        assert!(!fsm.status().flags.next_state_override);
    }
}
