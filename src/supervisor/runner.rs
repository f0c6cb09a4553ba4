//! Iteration supervisor: runs the agent in a bounded loop until it signals
//! completion, fails for good, hits the iteration ceiling, or is cancelled.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::cli::TokenUsage;
use crate::supervisor::{
    Attempt, IterationOutcome, RetryPolicy, RunContext, RunObserver, RunState, RunStateMachine,
};

/// Default iteration ceiling.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Default pause between iterations.
pub const DEFAULT_ITERATION_DELAY: Duration = Duration::from_secs(2);

/// Exit code reported for a cancelled run.
pub const EXIT_CANCELLED: u8 = 130;

/// Final result of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub state: RunState,
    pub iterations_run: u32,
    pub retries: u32,
    pub tokens: TokenUsage,
    /// Failure or cancellation reason for non-success terminal states.
    pub reason: Option<String>,
    pub last_outcome: Option<IterationOutcome>,
}

impl RunSummary {
    #[must_use]
    pub fn completed(&self) -> bool {
        self.state == RunState::Complete
    }

    /// Process exit code: 0 on completion, 130 on cancellation, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self.state {
            RunState::Complete => 0,
            RunState::Cancelled => EXIT_CANCELLED,
            _ => 1,
        }
    }
}

/// Drives an [`Attempt`] through up to `max_iterations` retry-wrapped
/// iterations.
pub struct IterationSupervisor<A: Attempt> {
    attempt: A,
    ctx: Arc<RunContext>,
    observer: Arc<dyn RunObserver>,
    retry: RetryPolicy,
    max_iterations: u32,
    iteration_delay: Duration,
    state: RunStateMachine,
}

impl<A: Attempt> IterationSupervisor<A> {
    #[must_use]
    pub fn new(attempt: A, ctx: Arc<RunContext>, observer: Arc<dyn RunObserver>) -> Self {
        Self {
            attempt,
            ctx,
            observer,
            retry: RetryPolicy::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            iteration_delay: DEFAULT_ITERATION_DELAY,
            state: RunStateMachine::new(),
        }
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_iteration_delay(mut self, delay: Duration) -> Self {
        self.iteration_delay = delay;
        self
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state.state()
    }

    #[must_use]
    pub fn attempt(&self) -> &A {
        &self.attempt
    }

    /// Run the loop to a terminal state.
    pub async fn run(&mut self) -> RunSummary {
        self.attempt.begin_run();
        self.state = RunStateMachine::new();
        self.transition(RunState::Running, None);

        let max = self.max_iterations;
        let mut last_outcome = None;
        tracing::info!(max_iterations = max, "Run started");

        for iteration in 1..=max {
            if self.ctx.is_cancelled() {
                return self.finish_cancelled(last_outcome);
            }

            tracing::info!(iteration, max, "Iteration started");
            self.observer.on_iteration(iteration, max);

            let result = self
                .retry
                .run(&mut self.attempt, iteration, &self.ctx, self.observer.as_ref())
                .await;
            self.state.record_iteration(result.retries_used);
            self.observer.on_tokens(&self.attempt.token_usage());

            let outcome = result.outcome;
            if self.ctx.is_cancelled() || outcome.cancelled {
                return self.finish_cancelled(Some(outcome));
            }

            if outcome.completed {
                tracing::info!(iteration, "Agent signalled completion");
                self.transition(RunState::Complete, None);
                return self.summary(None, Some(outcome));
            }

            if result.exhausted {
                let reason = format!(
                    "Failed after {} retries: {}",
                    result.retries_used,
                    outcome.error_message()
                );
                self.transition(RunState::Failed, Some(&reason));
                return self.summary(Some(reason), Some(outcome));
            }

            last_outcome = Some(outcome);

            if iteration < max && !self.ctx.sleep(self.iteration_delay).await {
                return self.finish_cancelled(last_outcome);
            }
        }

        let reason = format!("Reached maximum iterations ({max}) without completion");
        self.transition(RunState::Failed, Some(&reason));
        self.summary(Some(reason), last_outcome)
    }

    fn finish_cancelled(&mut self, last_outcome: Option<IterationOutcome>) -> RunSummary {
        let reason = self
            .ctx
            .reason()
            .or_else(|| last_outcome.as_ref().and_then(|o| o.error.clone()))
            .unwrap_or_else(|| "Cancelled".to_string());
        self.transition(RunState::Cancelled, Some(&reason));
        self.summary(Some(reason), last_outcome)
    }

    fn transition(&mut self, state: RunState, message: Option<&str>) {
        match self.state.transition(state) {
            Ok(()) => {
                match state {
                    RunState::Failed => {
                        tracing::error!(reason = message.unwrap_or_default(), "Run failed");
                    }
                    RunState::Cancelled => {
                        tracing::warn!(reason = message.unwrap_or_default(), "Run cancelled");
                    }
                    _ => tracing::info!(%state, "Run state changed"),
                }
                self.observer.on_status(state, message);
            }
            Err(e) => tracing::warn!(error = %e, "Refused run state transition"),
        }
    }

    fn summary(&self, reason: Option<String>, last_outcome: Option<IterationOutcome>) -> RunSummary {
        let stats = self.state.stats();
        RunSummary {
            state: self.state.state(),
            iterations_run: stats.iterations,
            retries: stats.retries,
            tokens: self.attempt.token_usage(),
            reason,
            last_outcome,
        }
    }
}

impl<A: Attempt> std::fmt::Debug for IterationSupervisor<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IterationSupervisor")
            .field("state", &self.state.state())
            .field("max_iterations", &self.max_iterations)
            .field("iteration_delay", &self.iteration_delay)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
