//! Shutdown coordinator state machine.
//!
//! Pure transitions: the caller passes the current time in and carries out the
//! returned [`Action`]. Entering the countdown requires a *new* idle run, so a
//! declined prompt or a failed shutdown never re-arms on the same run.

use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::config::Config;
use crate::domain::PolicyDecision;
use crate::interaction::Confirmation;
use crate::power::ShutdownError;

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownState {
    #[default]
    Monitoring,
    CountdownActive,
    Confirming,
    ShuttingDown,
    Aborted,
}

/// What the caller must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do.
    None,
    /// A countdown began; `remaining` until it elapses.
    CountdownStarted { remaining: Duration },
    /// Countdown still running.
    CountdownTick { remaining: Duration },
    /// Activity resumed during the countdown.
    CountdownAborted,
    /// Ask the operator, giving up after `timeout`.
    RequestConfirmation { timeout: Duration },
    /// Drop the in-flight prompt; activity resumed.
    CancelConfirmation,
    /// Issue the OS shutdown now.
    ShutdownNow,
    /// Back to monitoring after a decline, timeout or failed shutdown.
    Resumed,
}

/// Timing and confirmation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub countdown: Duration,
    pub confirm: bool,
    pub confirm_timeout: Duration,
    pub failure_cooldown: Duration,
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            countdown: config.countdown(),
            confirm: config.confirm,
            confirm_timeout: config.confirm_timeout(),
            failure_cooldown: config.failure_cooldown(),
        }
    }
}

/// Owns the [`ShutdownState`] and decides every transition.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    settings: CoordinatorSettings,
    state: ShutdownState,

    /// Countdown or cooldown deadline for the current state.
    deadline: Option<Instant>,

    /// Start of the idle run that last started a countdown.
    consumed_run: Option<Instant>,
}

impl ShutdownCoordinator {
    pub fn new(settings: CoordinatorSettings) -> Self {
        Self {
            settings,
            state: ShutdownState::Monitoring,
            deadline: None,
            consumed_run: None,
        }
    }

    pub fn state(&self) -> ShutdownState {
        self.state
    }

    /// Handle a decision from the policy engine.
    pub fn on_decision(&mut self, decision: &PolicyDecision, now: Instant) -> Action {
        match (self.state, decision.idle_sustained) {
            (ShutdownState::Monitoring, true) => {
                if decision.since.is_some() && decision.since == self.consumed_run {
                    return Action::None;
                }
                self.consumed_run = decision.since;
                let remaining = self.settings.countdown;
                self.enter(ShutdownState::CountdownActive, Some(now + remaining));
                info!("Sustained idle detected, shutting down in {:?}", remaining);
                Action::CountdownStarted { remaining }
            }
            (ShutdownState::CountdownActive, false) => {
                self.enter(ShutdownState::Monitoring, None);
                info!("Activity resumed, countdown aborted");
                Action::CountdownAborted
            }
            (ShutdownState::Confirming, false) => {
                self.enter(ShutdownState::Monitoring, None);
                info!("Activity resumed, confirmation cancelled");
                Action::CancelConfirmation
            }
            _ => Action::None,
        }
    }

    /// Advance timers.
    pub fn on_timer(&mut self, now: Instant) -> Action {
        let Some(deadline) = self.deadline else {
            return Action::None;
        };

        match self.state {
            ShutdownState::CountdownActive if now >= deadline => {
                if self.settings.confirm {
                    self.enter(ShutdownState::Confirming, None);
                    Action::RequestConfirmation {
                        timeout: self.settings.confirm_timeout,
                    }
                } else {
                    self.enter(ShutdownState::ShuttingDown, None);
                    Action::ShutdownNow
                }
            }
            ShutdownState::CountdownActive => Action::CountdownTick {
                remaining: deadline - now,
            },
            ShutdownState::Aborted if now >= deadline => {
                self.enter(ShutdownState::Monitoring, None);
                info!("Cooldown over, monitoring resumed");
                Action::Resumed
            }
            _ => Action::None,
        }
    }

    /// Handle the outcome of a confirmation prompt.
    pub fn on_confirmation(&mut self, confirmation: Confirmation) -> Action {
        if self.state != ShutdownState::Confirming {
            return Action::None;
        }

        match confirmation {
            Confirmation::Confirmed => {
                self.enter(ShutdownState::ShuttingDown, None);
                Action::ShutdownNow
            }
            Confirmation::Declined | Confirmation::TimedOut | Confirmation::Cancelled => {
                info!("Shutdown not confirmed ({:?}), monitoring resumed", confirmation);
                self.enter(ShutdownState::Monitoring, None);
                Action::Resumed
            }
        }
    }

    /// Handle the result of the OS shutdown call.
    ///
    /// Failures are never retried: the machine cools down in `Aborted`.
    pub fn on_shutdown_result(&mut self, result: &Result<(), ShutdownError>, now: Instant) -> Action {
        if self.state != ShutdownState::ShuttingDown {
            return Action::None;
        }

        match result {
            Ok(()) => {
                info!("Shutdown issued");
                Action::None
            }
            Err(e) => {
                error!("Shutdown failed: {}", e);
                warn!(
                    "Not retrying; monitoring resumes in {:?}",
                    self.settings.failure_cooldown
                );
                self.enter(
                    ShutdownState::Aborted,
                    Some(now + self.settings.failure_cooldown),
                );
                Action::None
            }
        }
    }

    fn enter(&mut self, state: ShutdownState, deadline: Option<Instant>) {
        self.state = state;
        self.deadline = deadline;
    }
}
