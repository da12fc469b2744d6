//! Fixed-width status line used by scripts and debug consoles

use core::fmt::{self, Write};

use ofsm_core::{FsmFlags, StateId, Timestamp};

/// Capacity of a rendered status line; the longest line is 82 bytes.
pub const STATUS_LINE_LEN: usize = 96;

/// Snapshot of the scheduler, one group and one of its FSMs.
///
/// Rendered as
/// `-O[I]-G(0)[.,001]-F(0)[ipo]-S(1)-TW[0000000005.,O:0000000000.,F:0000000007.]`:
/// scheduler infinite sleep, group overflow marker and pending count, FSM
/// flags (infinite sleep, prevented, overridden), state, then current time,
/// scheduler wakeup and FSM wakeup each with its overflow marker. Wakeups of
/// sleeping owners print as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub infinite_sleep: bool,
    pub group: u8,
    pub queue_overflow: bool,
    pub pending: usize,
    pub fsm: u8,
    pub fsm_flags: FsmFlags,
    pub state: StateId,
    pub now: Timestamp,
    pub wakeup: Option<Timestamp>,
    pub fsm_wakeup: Option<Timestamp>,
}

impl StatusReport {
    /// Render without allocating.
    pub fn to_line(&self) -> heapless::String<STATUS_LINE_LEN> {
        let mut line = heapless::String::new();
        // cannot fail, see STATUS_LINE_LEN
        let _ = write!(line, "{self}");
        line
    }
}

fn mark(set: bool, on: char, off: char) -> char {
    if set {
        on
    } else {
        off
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "-O[{}]-G({})[{},{:03}]-F({})[{}{}{}]-S({})-TW[{},O:{},F:{}]",
            mark(self.infinite_sleep, 'I', 'i'),
            self.group,
            mark(self.queue_overflow, '!', '.'),
            self.pending,
            self.fsm,
            mark(self.fsm_flags.infinite_sleep, 'I', 'i'),
            mark(self.fsm_flags.prevent_transition, 'P', 'p'),
            mark(self.fsm_flags.next_state_override, 'O', 'o'),
            self.state,
            self.now,
            self.wakeup.unwrap_or(Timestamp::ZERO),
            self.fsm_wakeup.unwrap_or(Timestamp::ZERO),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn renders_every_field() {
        let report = StatusReport {
            infinite_sleep: false,
            group: 0,
            queue_overflow: true,
            pending: 3,
            fsm: 1,
            fsm_flags: FsmFlags {
                infinite_sleep: false,
                prevent_transition: true,
                next_state_override: false,
            },
            state: StateId(2),
            now: Timestamp::with_overflow(4, true),
            wakeup: Some(Timestamp::with_overflow(6, true)),
            fsm_wakeup: Some(Timestamp::new(4_000_000_000)),
        };

        assert_eq!(
            report.to_string(),
            "-O[i]-G(0)[!,003]-F(1)[iPo]-S(2)-TW[0000000004!,O:0000000006!,F:4000000000.]"
        );
        assert_eq!(report.to_line().as_str(), report.to_string());
    }

    #[test]
    fn sleeping_wakeups_print_as_zero() {
        let report = StatusReport {
            infinite_sleep: true,
            group: 255,
            queue_overflow: false,
            pending: 0,
            fsm: 255,
            fsm_flags: FsmFlags::STARTUP,
            state: StateId(255),
            now: Timestamp::with_overflow(u32::MAX, true),
            wakeup: None,
            fsm_wakeup: None,
        };

        let line = report.to_line();
        assert_eq!(
            line.as_str(),
            "-O[I]-G(255)[.,000]-F(255)[Ipo]-S(255)-TW[4294967295!,O:0000000000.,F:0000000000.]"
        );
    }
}
