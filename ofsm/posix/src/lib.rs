//! Host port of the OFSM scheduler.
//!
//! Runs an [`Orchestrator`](ofsm_sched::Orchestrator) on a desktop OS: a
//! condvar-backed [`HostPlatform`] stands in for the MCU's wait-for-interrupt,
//! a [`Ticker`] thread plays the timer interrupt driving the heartbeat, and
//! [`HostSimulation`] ties both to a scheduler thread.

#![forbid(unsafe_code)]

pub mod platform;
pub mod simulation;
pub mod time;

pub use platform::HostPlatform;
pub use simulation::HostSimulation;
pub use time::{ClockTick, Ticker};
