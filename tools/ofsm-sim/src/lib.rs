//! Script and interactive simulation of OFSM schedulers.
//!
//! Scripts are line-oriented (see [`command`]): they queue events, move the
//! heartbeat, print status reports and assert on them. The [`Simulator`]
//! drives a built-in [`Machine`] either synchronously, with the scheduler
//! run on demand, or threaded on the host port.

pub mod command;
pub mod interpreter;
pub mod machines;

pub use command::{parse_line, Command, Line, ScriptError};
pub use interpreter::{Flow, SimError, Simulator, WakeMode};
pub use machines::Machine;
