//! Domain types shared by the sampler, the policy engine and the coordinator.

use std::time::Instant;

/// A single CPU utilization measurement taken on one sampling tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// When the reading was taken.
    pub timestamp: Instant,

    /// CPU utilization in `[0, 1]`.
    pub busy_fraction: f64,

    /// Whether the login session reported recent user input.
    pub input_active: bool,
}

impl Reading {
    /// Create a reading, clamping the busy fraction into `[0, 1]`.
    ///
    /// NaN is treated as fully busy.
    pub fn new(timestamp: Instant, busy_fraction: f64) -> Self {
        let busy_fraction = if busy_fraction.is_nan() {
            1.0
        } else {
            busy_fraction.clamp(0.0, 1.0)
        };

        Self {
            timestamp,
            busy_fraction,
            input_active: false,
        }
    }

    /// Mark whether user input was observed during this tick.
    #[must_use]
    pub fn with_input_active(mut self, input_active: bool) -> Self {
        self.input_active = input_active;
        self
    }
}

/// Output of the policy engine for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDecision {
    /// Every reading in the full window was quiet.
    pub idle_sustained: bool,

    /// Start of the current quiet run. Only set while `idle_sustained` holds.
    pub since: Option<Instant>,
}

impl PolicyDecision {
    /// Decision reporting activity (or a window that is not yet full).
    pub fn active() -> Self {
        Self {
            idle_sustained: false,
            since: None,
        }
    }

    /// Decision reporting sustained idle for the run that started at `since`.
    pub fn sustained(since: Instant) -> Self {
        Self {
            idle_sustained: true,
            since: Some(since),
        }
    }
}
