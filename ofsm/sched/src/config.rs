//! Scheduler configuration

use ofsm_core::Tick;
use ofsm_fsm::{DelayBase, Timing};

/// Construction-time settings of an [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub name: &'static str,
    /// Delay applied after a transition whose handler set none
    pub default_delay: Tick,
    /// Instant a transition delay is added to
    pub delay_base: DelayBase,
    /// Wake the platform when an event only replaced a pending one.
    ///
    /// Turning this off gives the "replace-only, no wake" mode: a coalesced
    /// event rides on the wake its predecessor already issued.
    pub wake_on_coalesce: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "OFSM",
            default_delay: 0,
            delay_base: DelayBase::BeforeHandler,
            wake_on_coalesce: true,
        }
    }
}

impl SchedulerConfig {
    /// Creates a new scheduler configuration builder.
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }

    /// Transition timing handed to FSMs.
    pub fn timing(&self) -> Timing {
        Timing {
            default_delay: self.default_delay,
            delay_base: self.delay_base,
        }
    }
}

/// Builder for ergonomic scheduler configuration construction.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    /// Sets the scheduler name used in diagnostics.
    pub fn name(mut self, name: &'static str) -> Self {
        self.config.name = name;
        self
    }

    /// Sets the delay used when a handler sets none.
    pub fn default_delay(mut self, ticks: Tick) -> Self {
        self.config.default_delay = ticks;
        self
    }

    /// Sets whether delays count from before or after the handler.
    pub fn delay_base(mut self, base: DelayBase) -> Self {
        self.config.delay_base = base;
        self
    }

    /// Sets whether coalesced events wake the platform.
    pub fn wake_on_coalesce(mut self, wake: bool) -> Self {
        self.config.wake_on_coalesce = wake;
        self
    }

    /// Builds the scheduler configuration.
    pub fn build(self) -> SchedulerConfig {
        self.config
    }
}
