//! The view a handler gets of its FSM

use core::any::Any;

use ofsm_core::{
    Enqueued, Event, EventCode, EventData, FsmCoords, OResult, OfsmError, StateId, Tick, Timestamp,
};

use crate::table::TransitionTable;

/// Services the scheduler exposes to handlers.
pub trait Runtime {
    /// Current heartbeat time.
    fn now(&self) -> Timestamp;

    /// Queue `event` into `group`, coalescing unless `force_new` is set.
    fn enqueue(&self, group: u8, force_new: bool, event: Event) -> OResult<Enqueued>;
}

/// What the handler asked for. Read back once the handler returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Outcome {
    pub prevent: bool,
    pub delay: Option<Tick>,
    pub infinite: bool,
    pub next_state: Option<StateId>,
}

/// Read/write view of one FSM for the duration of a handler call.
pub struct FsmContext<'a> {
    coords: FsmCoords,
    state: StateId,
    event: Event,
    time_left: Tick,
    table: &'a TransitionTable,
    private: Option<&'a (dyn Any + Send + Sync)>,
    runtime: &'a dyn Runtime,
    pub(crate) outcome: Outcome,
}

impl<'a> FsmContext<'a> {
    pub(crate) fn new(
        coords: FsmCoords,
        state: StateId,
        event: Event,
        time_left: Tick,
        table: &'a TransitionTable,
        private: Option<&'a (dyn Any + Send + Sync)>,
        runtime: &'a dyn Runtime,
    ) -> Self {
        Self {
            coords,
            state,
            event,
            time_left,
            table,
            private,
            runtime,
            outcome: Outcome::default(),
        }
    }

    /// State the FSM is in while the handler runs.
    pub fn state(&self) -> StateId {
        self.state
    }

    pub fn event(&self) -> Event {
        self.event
    }

    pub fn event_code(&self) -> EventCode {
        self.event.code
    }

    pub fn event_data(&self) -> EventData {
        self.event.data
    }

    /// Ticks that were left until the FSM's scheduled wakeup.
    ///
    /// [`INFINITE_TICKS`](ofsm_core::INFINITE_TICKS) when the FSM was in
    /// infinite sleep, 0 when the wakeup was already due.
    pub fn time_left_before_timeout(&self) -> Tick {
        self.time_left
    }

    pub fn group_index(&self) -> u8 {
        self.coords.group
    }

    pub fn fsm_index(&self) -> u8 {
        self.coords.fsm
    }

    pub fn coords(&self) -> FsmCoords {
        self.coords
    }

    pub fn now(&self) -> Timestamp {
        self.runtime.now()
    }

    /// Veto the transition; the FSM keeps its state, wakeup and flags.
    pub fn prevent_transition(&mut self) {
        self.outcome.prevent = true;
    }

    /// Wake up `ticks` after entering the next state.
    ///
    /// Replaces an earlier [`set_infinite_delay`](Self::set_infinite_delay).
    pub fn set_delay(&mut self, ticks: Tick) {
        self.outcome.delay = Some(ticks);
        self.outcome.infinite = false;
    }

    /// Sleep in the next state until a non-timeout event arrives.
    pub fn set_infinite_delay(&mut self) {
        self.outcome.infinite = true;
        self.outcome.delay = None;
    }

    /// Enter `state` instead of the table's target.
    pub fn override_next_state(&mut self, state: StateId) -> OResult<()> {
        if !self.table.contains_state(state) {
            return Err(OfsmError::InvalidState(state.raw()));
        }
        self.outcome.next_state = Some(state);
        Ok(())
    }

    /// Queue an event into this FSM's group, coalescing with a pending event
    /// of the same code.
    pub fn emit(&self, code: EventCode, data: EventData) -> OResult<Enqueued> {
        self.runtime
            .enqueue(self.coords.group, false, Event::new(code, data))
    }

    /// Queue an event into this FSM's group in a fresh slot.
    pub fn emit_new(&self, code: EventCode, data: EventData) -> OResult<Enqueued> {
        self.runtime
            .enqueue(self.coords.group, true, Event::new(code, data))
    }

    /// The FSM's private data, if it was attached with type `T`.
    pub fn private_data<T: Any>(&self) -> Option<&'a T> {
        self.private?.downcast_ref::<T>()
    }
}
