//! Identifiers for states and FSM coordinates

use core::fmt;

/// State identifier, the row index into a transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StateId(pub u8);

impl StateId {
    /// Every FSM starts here
    pub const INITIAL: Self = Self(0);

    pub const fn new(state: u8) -> Self {
        Self(state)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u8> for StateId {
    fn from(state: u8) -> Self {
        Self(state)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for StateId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "S{}", self.0);
    }
}

/// Position of an FSM inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FsmCoords {
    pub group: u8,
    pub fsm: u8,
}

impl FsmCoords {
    pub const fn new(group: u8, fsm: u8) -> Self {
        Self { group, fsm }
    }
}

/// Log prefix, `F(fsm)G(group)`.
impl fmt::Display for FsmCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F({})G({})", self.fsm, self.group)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FsmCoords {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "F({})G({})", self.fsm, self.group);
    }
}
