//! Daemon event loop.
//!
//! A sampling task drives sampler → policy once per interval and sends each
//! [`PolicyDecision`] over a channel. The [`Runner`] owns the coordinator and
//! reacts to decisions, the countdown timer and prompt answers. Nothing is
//! shared between the two except the channel.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::coordinator::{Action, CoordinatorSettings, ShutdownCoordinator};
use crate::domain::PolicyDecision;
use crate::idle::LogindSession;
use crate::interaction::{self, Confirmation, Interaction};
use crate::policy::IdlePolicy;
use crate::power::{self, PowerControl};
use crate::sampler::{self, IdleSampler};

/// Resolution of the countdown display and deadline checks.
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Decisions buffered between the sampler and the coordinator.
const DECISION_QUEUE: usize = 16;

const CONFIRM_PROMPT: &str = "CPU has been idle. Shut down now?";

/// Why the runner stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The shutdown call succeeded.
    PoweredOff,
    /// Stop signal received.
    Interrupted,
    /// The decision channel closed.
    SamplerStopped,
}

/// Sampler and policy, ticked on a fixed interval.
pub struct Sampling {
    sampler: IdleSampler,
    policy: IdlePolicy,
    session: Option<LogindSession>,
    interval: Duration,
}

impl Sampling {
    pub fn new(
        sampler: IdleSampler,
        policy: IdlePolicy,
        session: Option<LogindSession>,
        interval: Duration,
    ) -> Self {
        Self {
            sampler,
            policy,
            session,
            interval,
        }
    }

    /// Sample until cancelled or the receiver goes away.
    pub async fn run(mut self, decisions: mpsc::Sender<PolicyDecision>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Sampling every {:?}, window of {} readings",
            self.interval,
            self.policy.capacity()
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let decision = self.tick().await;
                    if decisions.send(decision).await.is_err() {
                        debug!("Decision receiver closed, sampler stopping");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&mut self) -> PolicyDecision {
        let mut reading = self.sampler.sample();

        if let Some(ref session) = self.session {
            // Don't disable on transient errors, just log
            if let Some(idle) = bounded_idle_hint(session.idle_hint(), self.interval).await {
                reading = reading.with_input_active(!idle);
            }
        }

        debug!(
            "Reading: busy={:.3} input_active={}",
            reading.busy_fraction, reading.input_active
        );
        self.policy.update(reading)
    }
}

/// Query the session idle hint, giving up after `limit`.
///
/// A stalled bus must not hold up the sampling loop; failures and timeouts
/// both leave the reading's input flag untouched.
async fn bounded_idle_hint<F>(query: F, limit: Duration) -> Option<bool>
where
    F: Future<Output = Result<bool>>,
{
    match tokio::time::timeout(limit, query).await {
        Ok(Ok(idle)) => Some(idle),
        Ok(Err(e)) => {
            warn!("Failed to poll session idle hint: {:#}", e);
            None
        }
        Err(_) => {
            warn!("Session idle hint timed out after {:?}", limit);
            None
        }
    }
}

/// An in-flight confirmation prompt.
struct PendingPrompt {
    cancel: CancellationToken,
    handle: JoinHandle<Confirmation>,
}

/// Drives the [`ShutdownCoordinator`] and carries out its actions.
pub struct Runner {
    coordinator: ShutdownCoordinator,
    interaction: Arc<dyn Interaction>,
    power: Box<dyn PowerControl>,
    prompt: Option<PendingPrompt>,
}

impl Runner {
    pub fn new(
        coordinator: ShutdownCoordinator,
        interaction: Arc<dyn Interaction>,
        power: Box<dyn PowerControl>,
    ) -> Self {
        Self {
            coordinator,
            interaction,
            power,
            prompt: None,
        }
    }

    /// Run until shutdown succeeds, `stop` resolves, or decisions stop arriving.
    pub async fn run<F>(mut self, mut decisions: mpsc::Receiver<PolicyDecision>, stop: F) -> Outcome
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);

        let mut timer = tokio::time::interval(COUNTDOWN_TICK);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let action = tokio::select! {
                () = &mut stop => {
                    info!("Stop requested");
                    self.cancel_prompt();
                    self.interaction.clear();
                    return Outcome::Interrupted;
                }
                decision = decisions.recv() => {
                    let Some(decision) = decision else {
                        self.cancel_prompt();
                        return Outcome::SamplerStopped;
                    };
                    self.coordinator.on_decision(&decision, now())
                }
                _ = timer.tick() => self.coordinator.on_timer(now()),
                answer = wait_prompt(&mut self.prompt), if self.prompt.is_some() => {
                    self.prompt = None;
                    self.coordinator.on_confirmation(answer)
                }
            };

            if self.apply(action).await {
                return Outcome::PoweredOff;
            }
        }
    }

    /// Carry out an action. Returns true once the shutdown call succeeded.
    async fn apply(&mut self, action: Action) -> bool {
        match action {
            Action::None | Action::Resumed => {}
            Action::CountdownStarted { remaining } | Action::CountdownTick { remaining } => {
                self.interaction.show_countdown(remaining);
            }
            Action::CountdownAborted => self.interaction.clear(),
            Action::RequestConfirmation { timeout } => {
                self.interaction.clear();
                self.start_prompt(timeout);
            }
            Action::CancelConfirmation => self.cancel_prompt(),
            Action::ShutdownNow => {
                self.interaction.clear();
                info!("Shutting down via {}", self.power.describe());

                // Not cancellable once issued
                let result = self.power.shutdown_now().await;
                let succeeded = result.is_ok();
                self.coordinator.on_shutdown_result(&result, now());
                return succeeded;
            }
        }
        false
    }

    fn start_prompt(&mut self, timeout: Duration) {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let interaction = Arc::clone(&self.interaction);

        let handle = tokio::task::spawn_blocking(move || {
            interaction.confirm(CONFIRM_PROMPT, timeout, &token)
        });

        self.prompt = Some(PendingPrompt { cancel, handle });
    }

    fn cancel_prompt(&mut self) {
        if let Some(prompt) = self.prompt.take() {
            prompt.cancel.cancel();
        }
    }
}

/// Wait for the pending prompt, or forever if there is none.
async fn wait_prompt(prompt: &mut Option<PendingPrompt>) -> Confirmation {
    let Some(prompt) = prompt else {
        return std::future::pending().await;
    };

    match (&mut prompt.handle).await {
        Ok(answer) => answer,
        Err(e) => {
            error!("Confirmation prompt failed: {}", e);
            Confirmation::Declined
        }
    }
}

/// Coordinator clock. Follows tokio's clock so paused-time tests work.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn stop_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            error!("Failed to listen for Ctrl-C: {}", e);
                            std::future::pending::<()>().await;
                        }
                    }
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Build every component from `config` and run until stopped.
pub async fn run(config: &Config) -> Result<Outcome> {
    let sampler = IdleSampler::new(sampler::source_for(config.cpu_source));
    let policy = IdlePolicy::from_config(config);

    let session = if config.watch_input {
        match LogindSession::connect().await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Failed to resolve logind session: {:#}. Ignoring user input.", e);
                None
            }
        }
    } else {
        None
    };

    let interaction = interaction::from_config(config)?;
    if config.confirm && !interaction.is_interactive() {
        warn!("Confirmation is required but no terminal is attached; shutdown will never be confirmed");
    }

    let power = power::from_config(config);
    info!(
        "Shutdown after {} idle minutes below {:.1}% CPU, {}s countdown, confirm={}, via {}",
        config.idle_minutes,
        config.busy_threshold * 100.0,
        config.countdown_seconds,
        config.confirm,
        power.describe()
    );

    let (tx, rx) = mpsc::channel(DECISION_QUEUE);
    let cancel = CancellationToken::new();
    let sampling = tokio::spawn(
        Sampling::new(sampler, policy, session, config.sample_interval()).run(tx, cancel.clone()),
    );

    let coordinator = ShutdownCoordinator::new(CoordinatorSettings::from_config(config));
    let outcome = Runner::new(coordinator, interaction, power)
        .run(rx, stop_signal())
        .await;

    cancel.cancel();
    if let Err(e) = sampling.await {
        warn!("Sampling task ended abnormally: {}", e);
    }

    Ok(outcome)
}
