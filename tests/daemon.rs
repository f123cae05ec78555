//! End-to-end coordinator runner tests on tokio's paused clock.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lovemeorleaveme::coordinator::{CoordinatorSettings, ShutdownCoordinator};
use lovemeorleaveme::daemon::{Outcome, Runner};
use lovemeorleaveme::domain::PolicyDecision;
use lovemeorleaveme::interaction::{Confirmation, Interaction};
use lovemeorleaveme::power::{PowerControl, ShutdownError};
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Power backend that counts calls and either succeeds or fails.
struct FakePower {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl PowerControl for FakePower {
    async fn shutdown_now(&self) -> Result<(), ShutdownError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(ShutdownError::Exited {
                code: Some(1),
                stderr: "Permission denied".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn describe(&self) -> String {
        "fake".to_string()
    }
}

/// Interaction that answers every prompt the same way and records countdowns.
struct FakeInteraction {
    answer: Confirmation,
    countdowns: Mutex<Vec<Duration>>,
}

impl FakeInteraction {
    fn answering(answer: Confirmation) -> Arc<Self> {
        Arc::new(Self {
            answer,
            countdowns: Mutex::new(Vec::new()),
        })
    }
}

impl Interaction for FakeInteraction {
    fn confirm(&self, _prompt: &str, _timeout: Duration, _cancel: &CancellationToken) -> Confirmation {
        self.answer
    }

    fn show_countdown(&self, remaining: Duration) {
        self.countdowns.lock().unwrap().push(remaining);
    }
}

/// Interaction that blocks until its prompt is cancelled.
struct StallingInteraction {
    started: mpsc::UnboundedSender<()>,
    finished: mpsc::UnboundedSender<Confirmation>,
}

impl Interaction for StallingInteraction {
    fn confirm(&self, _prompt: &str, _timeout: Duration, cancel: &CancellationToken) -> Confirmation {
        let _ = self.started.send(());
        while !cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(5));
        }
        let _ = self.finished.send(Confirmation::Cancelled);
        Confirmation::Cancelled
    }

    fn show_countdown(&self, _remaining: Duration) {}
}

fn settings(confirm: bool) -> CoordinatorSettings {
    CoordinatorSettings {
        countdown: Duration::from_secs(10),
        confirm,
        confirm_timeout: Duration::from_secs(30),
        failure_cooldown: Duration::from_secs(60),
    }
}

fn power(fail: bool) -> (Box<dyn PowerControl>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let power = FakePower {
        calls: Arc::clone(&calls),
        fail,
    };
    (Box::new(power), calls)
}

#[tokio::test(start_paused = true)]
async fn shuts_down_after_countdown_without_confirmation() {
    let (tx, rx) = mpsc::channel(8);
    let (power, calls) = power(false);
    let interaction = FakeInteraction::answering(Confirmation::Declined);
    let runner = Runner::new(
        ShutdownCoordinator::new(settings(false)),
        interaction.clone(),
        power,
    );

    tx.send(PolicyDecision::sustained(Instant::now())).await.unwrap();
    let outcome = runner.run(rx, std::future::pending()).await;

    assert_eq!(outcome, Outcome::PoweredOff);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let countdowns = interaction.countdowns.lock().unwrap();
    assert_eq!(countdowns.first(), Some(&Duration::from_secs(10)));
    drop(tx);
}

#[tokio::test(start_paused = true)]
async fn activity_aborts_countdown() {
    let (tx, rx) = mpsc::channel(8);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let (power, calls) = power(false);
    let runner = Runner::new(
        ShutdownCoordinator::new(settings(false)),
        FakeInteraction::answering(Confirmation::Declined),
        power,
    );
    let task = tokio::spawn(runner.run(rx, async move {
        let _ = stop_rx.await;
    }));

    tx.send(PolicyDecision::sustained(Instant::now())).await.unwrap();
    sleep(Duration::from_secs(3)).await;
    tx.send(PolicyDecision::active()).await.unwrap();
    sleep(Duration::from_secs(30)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);

    stop_tx.send(()).unwrap();
    assert_eq!(task.await.unwrap(), Outcome::Interrupted);
}

#[tokio::test(start_paused = true)]
async fn confirmed_prompt_shuts_down() {
    let (tx, rx) = mpsc::channel(8);
    let (power, calls) = power(false);
    let runner = Runner::new(
        ShutdownCoordinator::new(settings(true)),
        FakeInteraction::answering(Confirmation::Confirmed),
        power,
    );

    tx.send(PolicyDecision::sustained(Instant::now())).await.unwrap();
    let outcome = runner.run(rx, std::future::pending()).await;

    assert_eq!(outcome, Outcome::PoweredOff);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    drop(tx);
}

#[tokio::test(start_paused = true)]
async fn declined_prompt_keeps_running() {
    let (tx, rx) = mpsc::channel(8);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let (power, calls) = power(false);
    let runner = Runner::new(
        ShutdownCoordinator::new(settings(true)),
        FakeInteraction::answering(Confirmation::Declined),
        power,
    );
    let task = tokio::spawn(runner.run(rx, async move {
        let _ = stop_rx.await;
    }));

    let since = Instant::now();
    tx.send(PolicyDecision::sustained(since)).await.unwrap();
    sleep(Duration::from_secs(20)).await;

    // The same idle run keeps being reported; it must not prompt again
    for _ in 0..5 {
        tx.send(PolicyDecision::sustained(since)).await.unwrap();
        sleep(Duration::from_secs(15)).await;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    stop_tx.send(()).unwrap();
    assert_eq!(task.await.unwrap(), Outcome::Interrupted);
}

#[tokio::test(start_paused = true)]
async fn activity_cancels_pending_confirmation() {
    let (tx, rx) = mpsc::channel(8);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let (finished_tx, mut finished_rx) = mpsc::unbounded_channel();
    let (power, calls) = power(false);
    let runner = Runner::new(
        ShutdownCoordinator::new(settings(true)),
        Arc::new(StallingInteraction {
            started: started_tx,
            finished: finished_tx,
        }),
        power,
    );
    let task = tokio::spawn(runner.run(rx, async move {
        let _ = stop_rx.await;
    }));

    tx.send(PolicyDecision::sustained(Instant::now())).await.unwrap();
    started_rx.recv().await.unwrap();

    tx.send(PolicyDecision::active()).await.unwrap();
    assert_eq!(finished_rx.recv().await, Some(Confirmation::Cancelled));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    stop_tx.send(()).unwrap();
    assert_eq!(task.await.unwrap(), Outcome::Interrupted);
}

#[tokio::test(start_paused = true)]
async fn failed_shutdown_is_not_retried_on_same_idle_run() {
    let (tx, rx) = mpsc::channel(8);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let (power, calls) = power(true);
    let runner = Runner::new(
        ShutdownCoordinator::new(settings(false)),
        FakeInteraction::answering(Confirmation::Declined),
        power,
    );
    let task = tokio::spawn(runner.run(rx, async move {
        let _ = stop_rx.await;
    }));

    let first_run = Instant::now();
    tx.send(PolicyDecision::sustained(first_run)).await.unwrap();
    sleep(Duration::from_secs(15)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Past the cooldown, still the same idle run
    sleep(Duration::from_secs(70)).await;
    tx.send(PolicyDecision::sustained(first_run)).await.unwrap();
    sleep(Duration::from_secs(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Activity, then a new idle run triggers a fresh attempt
    tx.send(PolicyDecision::active()).await.unwrap();
    let second_run = first_run + Duration::from_secs(200);
    tx.send(PolicyDecision::sustained(second_run)).await.unwrap();
    sleep(Duration::from_secs(15)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    stop_tx.send(()).unwrap();
    assert_eq!(task.await.unwrap(), Outcome::Interrupted);
}

#[tokio::test(start_paused = true)]
async fn closed_channel_stops_runner() {
    let (tx, rx) = mpsc::channel(1);
    let (power, _calls) = power(false);
    let runner = Runner::new(
        ShutdownCoordinator::new(settings(false)),
        FakeInteraction::answering(Confirmation::Declined),
        power,
    );
    drop(tx);

    assert_eq!(
        runner.run(rx, std::future::pending()).await,
        Outcome::SamplerStopped
    );
}
