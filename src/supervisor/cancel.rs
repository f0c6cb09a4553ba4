//! Signal handling and cancellation teardown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::supervisor::{OutputLine, RunContext, RunObserver};

/// Default grace period between SIGTERM and SIGKILL for the agent.
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra time allowed on top of the grace period for the child to be reaped.
const SHUTDOWN_SLACK: Duration = Duration::from_secs(2);

/// Turns termination signals into a run cancellation.
///
/// Setting the flag is all this does to the child directly: the session
/// owning the child sees the flag, sends SIGTERM, escalates to SIGKILL after
/// the grace period, and clears the active child once reaped.
/// [`shutdown`](Self::shutdown) waits for that to happen.
pub struct CancellationController {
    ctx: Arc<RunContext>,
    grace: Duration,
    observer: Option<Arc<dyn RunObserver>>,
}

impl CancellationController {
    #[must_use]
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self {
            ctx,
            grace: DEFAULT_TERMINATE_TIMEOUT,
            observer: None,
        }
    }

    /// Set the grace period the session uses before SIGKILL.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Report cancellation requests to an observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Request cancellation. Returns `false` if already cancelled.
    pub fn request(&self, reason: &str) -> bool {
        request(&self.ctx, self.observer.as_deref(), reason)
    }

    /// Listen for SIGINT (and SIGTERM on Unix) until the task is aborted.
    ///
    /// Repeated signals are no-ops once the run is cancelled.
    #[must_use]
    pub fn spawn_signal_listener(&self) -> JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let observer = self.observer.clone();
        tokio::spawn(async move {
            loop {
                match wait_for_signal().await {
                    Ok(reason) => {
                        request(&ctx, observer.as_deref(), reason);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to listen for signals");
                        return;
                    }
                }
            }
        })
    }

    /// Wait for any in-flight child to be torn down.
    ///
    /// Returns `false` if the child was still registered after the grace
    /// period plus a small slack.
    pub async fn shutdown(&self) -> bool {
        let deadline = self.grace + SHUTDOWN_SLACK;
        match tokio::time::timeout(deadline, self.ctx.wait_idle()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(?deadline, "Agent process still active after shutdown deadline");
                false
            }
        }
    }
}

fn request(ctx: &RunContext, observer: Option<&dyn RunObserver>, reason: &str) -> bool {
    if !ctx.cancel(reason) {
        tracing::debug!(reason, "Cancellation already requested");
        return false;
    }

    let pid = ctx.active_child().and_then(|child| child.pid);
    tracing::warn!(reason, ?pid, "Cancellation requested");
    if let Some(observer) = observer {
        let message = match pid {
            Some(pid) => format!("{reason}: stopping agent (pid {pid})"),
            None => format!("{reason}: stopping"),
        };
        observer.on_output(&OutputLine::warning(message));
    }
    true
}

async fn wait_for_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok("Interrupted by user")
            }
            _ = terminate.recv() => Ok("Terminated by signal"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("Interrupted by user")
    }
}
