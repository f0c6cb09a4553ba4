//! Integration tests for the iteration supervisor with scripted attempts.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ralph_supervisor::cli::TokenUsage;
use ralph_supervisor::supervisor::{
    Attempt, IterationOutcome, IterationSupervisor, RetryPolicy, RunContext, RunObserver,
    RunState,
};

use super::Recorder;

/// Plays back a fixed list of outcomes, then keeps succeeding.
struct Playback {
    outcomes: VecDeque<IterationOutcome>,
    calls: u32,
    runs_started: u32,
}

impl Playback {
    fn new(outcomes: impl IntoIterator<Item = IterationOutcome>) -> Self {
        Self {
            outcomes: outcomes.into_iter().collect(),
            calls: 0,
            runs_started: 0,
        }
    }
}

#[async_trait]
impl Attempt for Playback {
    fn begin_run(&mut self) {
        self.runs_started += 1;
    }

    async fn run(&mut self, _iteration: u32, _observer: &dyn RunObserver) -> IterationOutcome {
        self.calls += 1;
        self.outcomes
            .pop_front()
            .unwrap_or_else(|| IterationOutcome::success(Some(0)))
    }

    fn token_usage(&self) -> TokenUsage {
        TokenUsage {
            input: u64::from(self.calls) * 10,
            ..TokenUsage::default()
        }
    }
}

fn fail() -> IterationOutcome {
    IterationOutcome::failed("Agent exited with code 1", Some(1))
}

fn build(
    attempt: Playback,
    max: u32,
    ctx: Arc<RunContext>,
) -> (IterationSupervisor<Playback>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let supervisor = IterationSupervisor::new(attempt, ctx, recorder.clone())
        .with_max_iterations(max)
        .with_iteration_delay(Duration::ZERO)
        .with_retry_policy(RetryPolicy::new(Duration::ZERO));
    (supervisor, recorder)
}

#[tokio::test]
async fn completes_on_second_of_five_iterations() {
    let attempt = Playback::new([
        IterationOutcome::success(Some(0)),
        IterationOutcome::completed(Some(0)),
    ]);
    let (mut supervisor, recorder) = build(attempt, 5, Arc::new(RunContext::new()));

    let summary = supervisor.run().await;

    assert_eq!(summary.state, RunState::Complete);
    assert_eq!(summary.iterations_run, 2);
    assert_eq!(supervisor.attempt().calls, 2);
    assert_eq!(supervisor.attempt().runs_started, 1);
    assert_eq!(summary.tokens.input, 20);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(
        recorder.statuses.lock().unwrap().last(),
        Some(&(RunState::Complete, None))
    );
}

#[tokio::test]
async fn failures_within_budget_are_retried() {
    let attempt = Playback::new([fail(), fail(), IterationOutcome::completed(Some(0))]);
    let (mut supervisor, _) = build(attempt, 5, Arc::new(RunContext::new()));

    let summary = supervisor.run().await;

    assert!(summary.completed());
    assert_eq!(summary.iterations_run, 1);
    assert_eq!(summary.retries, 2);
}

#[tokio::test]
async fn exhausted_retries_fail_the_run() {
    let attempt = Playback::new([fail(), fail(), fail(), fail()]);
    let (mut supervisor, recorder) = build(attempt, 5, Arc::new(RunContext::new()));

    let summary = supervisor.run().await;

    assert_eq!(summary.state, RunState::Failed);
    assert_eq!(supervisor.attempt().calls, 4);
    assert_eq!(summary.exit_code(), 1);

    let statuses = recorder.statuses.lock().unwrap();
    let failures: Vec<_> = statuses.iter().filter(|(s, _)| *s == RunState::Failed).collect();
    assert_eq!(failures.len(), 1, "exactly one terminal failure status");
}

#[tokio::test]
async fn ceiling_without_completion_fails() {
    let (mut supervisor, _) = build(Playback::new([]), 4, Arc::new(RunContext::new()));

    let summary = supervisor.run().await;

    assert_eq!(summary.state, RunState::Failed);
    assert_eq!(summary.iterations_run, 4);
    assert_eq!(
        summary.reason.as_deref(),
        Some("Reached maximum iterations (4) without completion")
    );
}

#[tokio::test]
async fn cancelled_before_run_does_nothing() {
    let ctx = Arc::new(RunContext::new());
    ctx.cancel("Interrupted by user");
    let (mut supervisor, _) = build(Playback::new([]), 5, ctx);

    let summary = supervisor.run().await;

    assert_eq!(summary.state, RunState::Cancelled);
    assert_eq!(summary.iterations_run, 0);
    assert_eq!(supervisor.attempt().calls, 0);
    assert_eq!(summary.exit_code(), 130);
}

#[tokio::test]
async fn cancel_during_iteration_delay_stops_promptly() {
    let ctx = Arc::new(RunContext::new());
    let recorder = Arc::new(Recorder::default());
    let mut supervisor = IterationSupervisor::new(Playback::new([]), Arc::clone(&ctx), recorder)
        .with_max_iterations(5)
        .with_iteration_delay(Duration::from_secs(30));

    let canceller = Arc::clone(&ctx);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel("Terminated by signal");
    });

    let started = Instant::now();
    let summary = supervisor.run().await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(summary.state, RunState::Cancelled);
    assert_eq!(summary.iterations_run, 1);
    assert_eq!(summary.reason.as_deref(), Some("Terminated by signal"));
}

#[tokio::test]
async fn rerun_resets_state() {
    let attempt = Playback::new([IterationOutcome::completed(Some(0))]);
    let (mut supervisor, _) = build(attempt, 2, Arc::new(RunContext::new()));

    assert!(supervisor.run().await.completed());
    let second = supervisor.run().await;

    assert_eq!(second.state, RunState::Failed);
    assert_eq!(second.iterations_run, 2);
    assert_eq!(supervisor.attempt().runs_started, 2);
}
