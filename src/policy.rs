//! Sustained-idle policy.
//!
//! Rules:
//! - Idle is sustained only once the window is full and every reading in it is quiet
//! - A single busy reading resets the decision immediately (no decay)

use std::collections::VecDeque;
use std::time::Instant;

use tracing::{debug, trace};

use crate::config::Config;
use crate::domain::{PolicyDecision, Reading};

/// Sliding-window idle policy.
#[derive(Debug)]
pub struct IdlePolicy {
    /// Most recent readings, oldest first.
    window: VecDeque<Reading>,

    /// Readings required for a full window.
    capacity: usize,

    /// Busy fraction at or above which a reading counts as activity.
    threshold: f64,

    /// Timestamp of the first reading in the current quiet run.
    run_start: Option<Instant>,

    /// Whether the last decision reported sustained idle (for logging edges).
    was_sustained: bool,
}

impl IdlePolicy {
    /// Create a policy over `capacity` readings. A zero capacity is treated as one.
    pub fn new(capacity: usize, threshold: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::new(),
            capacity,
            threshold,
            run_start: None,
            was_sustained: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.window_len(), config.busy_threshold)
    }

    /// Feed one reading and recompute the decision.
    pub fn update(&mut self, reading: Reading) -> PolicyDecision {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(reading);

        if self.is_quiet(&reading) {
            self.run_start.get_or_insert(reading.timestamp);
        } else {
            self.run_start = None;
        }

        let sustained =
            self.window.len() == self.capacity && self.window.iter().all(|r| self.is_quiet(r));

        let decision = match (sustained, self.run_start) {
            (true, Some(since)) => PolicyDecision::sustained(since),
            _ => PolicyDecision::active(),
        };

        if decision.idle_sustained != self.was_sustained {
            debug!(
                "Sustained idle changed: {} -> {} (busy={:.3}, input_active={})",
                self.was_sustained, decision.idle_sustained, reading.busy_fraction, reading.input_active
            );
            self.was_sustained = decision.idle_sustained;
        } else {
            trace!(
                "Window {}/{}, busy={:.3}, sustained={}",
                self.window.len(),
                self.capacity,
                reading.busy_fraction,
                decision.idle_sustained
            );
        }

        decision
    }

    /// Forget all readings.
    pub fn reset(&mut self) {
        self.window.clear();
        self.run_start = None;
        self.was_sustained = false;
    }

    /// Readings currently held.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn is_quiet(&self, reading: &Reading) -> bool {
        reading.busy_fraction < self.threshold && !reading.input_active
    }
}
