#![no_std]
#![forbid(unsafe_code)]

//! # OFSM state machines
//!
//! Flat state machines driven by a static transition table. Each table row
//! is a state, each column an event code; an entry names the handler to call
//! and the state to enter afterwards. Column 0 is the timeout event, whose
//! entry for a state decides whether that state schedules wakeups at all.

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod context;
pub mod machine;
pub mod table;

pub use context::{FsmContext, Runtime};
pub use machine::{DelayBase, Dispatch, Fsm, FsmStatus, Timing};
pub use table::{Handler, Transition, TransitionTable};
