#![no_std]
#![forbid(unsafe_code)]

//! # OFSM scheduler
//!
//! Cooperative, time-driven scheduling of OFSM groups. Producers (interrupt
//! handlers, threads, FSM handlers) queue events into per-group rings; the
//! [`Orchestrator`] drains them, delivers each event to every FSM of its
//! group and sleeps through a [`Platform`] until the earliest scheduled
//! wakeup, which the heartbeat ([`Orchestrator::advance_time`]) turns into a
//! timeout event.

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod group;
pub mod platform;
pub mod queue;
pub mod scheduler;
pub mod status;

pub use config::{SchedulerConfig, SchedulerConfigBuilder};
pub use group::{Consensus, FsmId, Group, GroupReport};
#[cfg(target_arch = "arm")]
pub use platform::WfiPlatform;
pub use platform::{LatchPlatform, Platform};
pub use queue::EventQueue;
pub use scheduler::{Orchestrator, OrchestratorBuilder, Step};
pub use status::{StatusReport, STATUS_LINE_LEN};
