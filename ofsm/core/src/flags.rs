//! Named flag sets for FSMs and the scheduler
//!
//! Overflow markers are not here; they travel with the [`Timestamp`]
//! they qualify.
//!
//! [`Timestamp`]: crate::Timestamp

/// Per-FSM status flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FsmFlags {
    /// No wakeup is scheduled; only a non-timeout event resumes the FSM
    pub infinite_sleep: bool,
    /// The last handler vetoed its transition
    pub prevent_transition: bool,
    /// The last handler picked the next state itself
    pub next_state_override: bool,
}

impl FsmFlags {
    /// Flags of a freshly reset FSM
    pub const STARTUP: Self = Self {
        infinite_sleep: true,
        prevent_transition: false,
        next_state_override: false,
    };

    /// All flags cleared
    pub const CLEAR: Self = Self {
        infinite_sleep: false,
        prevent_transition: false,
        next_state_override: false,
    };
}

/// Scheduler-wide flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerFlags {
    /// Every FSM is in infinite sleep
    pub infinite_sleep: bool,
    /// An event was appended since the start of the current dispatch pass
    pub event_queued: bool,
    /// Timeouts reach FSMs in infinite sleep; set until the first sleep
    pub timeout_wakes_sleepers: bool,
    /// The run loop must return
    pub exit_requested: bool,
}

impl SchedulerFlags {
    /// Flags right after setup or reset
    pub const STARTUP: Self = Self {
        infinite_sleep: true,
        event_queued: false,
        timeout_wakes_sleepers: true,
        exit_requested: false,
    };
}
