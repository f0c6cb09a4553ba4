//! Run-scoped shared state: the cancellation flag and the active child.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// The child process currently owned by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveChild {
    pub pid: Option<u32>,
}

/// State shared by the supervisor, the process session and the
/// cancellation controller for the duration of one run.
///
/// The controller is the only writer of the cancellation flag; the session
/// is the only writer of the active child.
#[derive(Debug)]
pub struct RunContext {
    token: CancellationToken,
    reason: Mutex<Option<String>>,
    active: watch::Sender<Option<ActiveChild>>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    #[must_use]
    pub fn new() -> Self {
        let (active, _) = watch::channel(None);
        Self {
            token: CancellationToken::new(),
            reason: Mutex::new(None),
            active,
        }
    }

    /// Get a clone of the cancellation token.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Set the cancellation flag.
    ///
    /// Idempotent: returns `true` only for the call that actually cancelled;
    /// the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let mut slot = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(reason.into());
        self.token.cancel();
        true
    }

    /// Reason given by the first cancellation request.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until the run is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `false` if the run was cancelled before or during the sleep.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            () = self.token.cancelled() => false,
            () = tokio::time::sleep(duration) => !self.is_cancelled(),
        }
    }

    pub(crate) fn set_active(&self, pid: Option<u32>) {
        self.active.send_replace(Some(ActiveChild { pid }));
    }

    pub(crate) fn clear_active(&self) {
        self.active.send_replace(None);
    }

    #[must_use]
    pub fn active_child(&self) -> Option<ActiveChild> {
        *self.active.borrow()
    }

    /// Wait until no child process is active.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(Option::is_none).await;
    }
}
