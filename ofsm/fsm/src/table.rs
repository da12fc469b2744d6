//! Static transition tables

use core::fmt;

use ofsm_core::{EventCode, OResult, OfsmError, StateId, MAX_EVENTS, MAX_STATES};

use crate::context::FsmContext;

/// Event handler. Runs outside any critical section.
pub type Handler = fn(&mut FsmContext<'_>);

/// One table entry: what to call and where to go next.
#[derive(Clone, Copy)]
pub struct Transition {
    handler: Option<Handler>,
    next_state: StateId,
}

impl Transition {
    /// No handler; the event is ignored in this state.
    pub const EMPTY: Self = Self {
        handler: None,
        next_state: StateId::INITIAL,
    };

    pub const fn new(handler: Handler, next_state: StateId) -> Self {
        Self {
            handler: Some(handler),
            next_state,
        }
    }

    /// Entry without a handler. The target is kept for documentation only,
    /// since unhandled events never transition.
    pub const fn to(next_state: StateId) -> Self {
        Self {
            handler: None,
            next_state,
        }
    }

    pub const fn handler(&self) -> Option<Handler> {
        self.handler
    }

    pub const fn next_state(&self) -> StateId {
        self.next_state
    }

    pub const fn is_handled(&self) -> bool {
        self.handler.is_some()
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("handled", &self.is_handled())
            .field("next_state", &self.next_state)
            .finish()
    }
}

/// Read-only `(state, event) -> transition` map.
#[derive(Debug, Clone, Copy)]
pub struct TransitionTable {
    entries: &'static [Transition],
    event_count: u8,
    state_count: u8,
}

impl TransitionTable {
    /// Build a table from rows of `E` event columns, one row per state.
    ///
    /// Fails if either dimension is empty or exceeds 255, or if a static
    /// target names a state without a row.
    pub fn from_rows<const E: usize>(rows: &'static [[Transition; E]]) -> OResult<Self> {
        if E == 0 || E > MAX_EVENTS || rows.is_empty() || rows.len() > MAX_STATES {
            return Err(OfsmError::TableShape);
        }

        let entries = rows.as_flattened();
        if let Some(bad) = entries
            .iter()
            .find(|t| t.is_handled() && t.next_state.index() >= rows.len())
        {
            return Err(OfsmError::InvalidState(bad.next_state.raw()));
        }

        Ok(Self {
            entries,
            event_count: E as u8,
            state_count: rows.len() as u8,
        })
    }

    pub fn event_count(&self) -> u8 {
        self.event_count
    }

    pub fn state_count(&self) -> u8 {
        self.state_count
    }

    pub fn contains_event(&self, code: EventCode) -> bool {
        code.raw() < self.event_count
    }

    pub fn contains_state(&self, state: StateId) -> bool {
        state.raw() < self.state_count
    }

    /// Entry for `state` and `code`, or `None` if either is out of range.
    pub fn get(&self, state: StateId, code: EventCode) -> Option<&Transition> {
        if !self.contains_state(state) || !self.contains_event(code) {
            return None;
        }
        self.entries
            .get(state.index() * self.event_count as usize + code.index())
    }

    /// Whether `state` can wake itself, i.e. has a timeout handler.
    pub fn handles_timeout(&self, state: StateId) -> bool {
        self.get(state, EventCode::TIMEOUT)
            .is_some_and(Transition::is_handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut FsmContext<'_>) {}

    const S0: StateId = StateId(0);
    const S1: StateId = StateId(1);

    static TWO_STATES: [[Transition; 2]; 2] = [
        [Transition::new(noop, S0), Transition::new(noop, S1)],
        [Transition::new(noop, S1), Transition::EMPTY],
    ];

    #[test]
    fn lookup_by_state_and_event() {
        let table = TransitionTable::from_rows(&TWO_STATES).unwrap();

        assert_eq!(table.state_count(), 2);
        assert_eq!(table.event_count(), 2);
        assert_eq!(table.get(S0, EventCode(1)).unwrap().next_state(), S1);
        assert!(!table.get(S1, EventCode(1)).unwrap().is_handled());
        assert!(table.get(StateId(2), EventCode(0)).is_none());
        assert!(table.get(S0, EventCode(2)).is_none());
        assert!(table.handles_timeout(S1));
    }

    #[test]
    fn rejects_dangling_targets() {
        static DANGLING: [[Transition; 1]; 1] = [[Transition::new(noop, StateId(3))]];

        assert_eq!(
            TransitionTable::from_rows(&DANGLING).unwrap_err(),
            OfsmError::InvalidState(3)
        );
    }

    #[test]
    fn rejects_empty_tables() {
        static NO_ROWS: [[Transition; 1]; 0] = [];
        static NO_COLUMNS: [[Transition; 0]; 1] = [[]];

        assert_eq!(
            TransitionTable::from_rows(&NO_ROWS).unwrap_err(),
            OfsmError::TableShape
        );
        assert_eq!(
            TransitionTable::from_rows(&NO_COLUMNS).unwrap_err(),
            OfsmError::TableShape
        );
    }
}
