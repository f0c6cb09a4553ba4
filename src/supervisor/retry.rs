//! Bounded retry of a single iteration.

use std::time::Duration;

use async_trait::async_trait;

use crate::cli::TokenUsage;
use crate::supervisor::{IterationOutcome, OutputLine, RetryOutcome, RunContext, RunObserver};

/// Re-attempts allowed after a failed first attempt.
pub const MAX_RETRIES: u32 = 3;

/// Default pause before each re-attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// One unit of work the supervisor can run and retry.
#[async_trait]
pub trait Attempt: Send {
    /// Called once when a fresh run starts, before the first iteration.
    fn begin_run(&mut self) {}

    /// Run one attempt of `iteration`.
    async fn run(&mut self, iteration: u32, observer: &dyn RunObserver) -> IterationOutcome;

    /// Token usage accumulated over the run so far.
    fn token_usage(&self) -> TokenUsage {
        TokenUsage::default()
    }
}

/// Retries failed attempts a fixed number of times with a fixed delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            max_retries: MAX_RETRIES,
            delay,
        }
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `attempt` until it succeeds, completes, is cancelled, or the
    /// retry budget runs out.
    pub async fn run<A: Attempt + ?Sized>(
        &self,
        attempt: &mut A,
        iteration: u32,
        ctx: &RunContext,
        observer: &dyn RunObserver,
    ) -> RetryOutcome {
        let mut retries_used = 0;

        loop {
            let outcome = attempt.run(iteration, observer).await;

            if outcome.is_final() {
                if retries_used > 0 {
                    observer.on_retry(0, self.max_retries);
                }
                return RetryOutcome {
                    outcome,
                    retries_used,
                    exhausted: false,
                };
            }

            if retries_used >= self.max_retries {
                tracing::error!(
                    iteration,
                    retries = retries_used,
                    error = outcome.error_message(),
                    "Retries exhausted"
                );
                return RetryOutcome {
                    outcome,
                    retries_used,
                    exhausted: true,
                };
            }

            if ctx.is_cancelled() {
                return cancelled(outcome, retries_used, ctx);
            }

            retries_used += 1;
            observer.on_retry(retries_used, self.max_retries);
            observer.on_output(&OutputLine::warning(format!(
                "Attempt failed: {}. Retrying ({retries_used}/{}) in {}s",
                outcome.error_message(),
                self.max_retries,
                self.delay.as_secs()
            )));
            tracing::warn!(
                iteration,
                retry = retries_used,
                max = self.max_retries,
                error = outcome.error_message(),
                "Attempt failed, retrying"
            );

            if !ctx.sleep(self.delay).await {
                return cancelled(outcome, retries_used, ctx);
            }
        }
    }
}

fn cancelled(mut outcome: IterationOutcome, retries_used: u32, ctx: &RunContext) -> RetryOutcome {
    outcome.success = false;
    outcome.cancelled = true;
    outcome.error = Some(ctx.reason().unwrap_or_else(|| "Cancelled".to_string()));
    RetryOutcome {
        outcome,
        retries_used,
        exhausted: false,
    }
}
