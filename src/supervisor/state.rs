//! Run state machine.

use serde::{Deserialize, Serialize};

/// Current state of a supervised run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Complete,
    #[serde(rename = "error")]
    Failed,
    Cancelled,
}

impl RunState {
    /// Terminal states accept no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// A refused state transition.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid run state transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: RunState,
    pub to: RunState,
}

/// State machine for tracking run progress.
#[derive(Debug, Clone, Default)]
pub struct RunStateMachine {
    state: RunState,
    iterations: u32,
    retries: u32,
}

impl RunStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Move to `new_state`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the current state is terminal or the
    /// target is `Idle`.
    pub fn transition(&mut self, new_state: RunState) -> Result<(), InvalidTransition> {
        if self.state.is_terminal() || new_state == RunState::Idle {
            return Err(InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }
        tracing::debug!(from = ?self.state, to = ?new_state, "State transition");
        self.state = new_state;
        Ok(())
    }

    pub fn record_iteration(&mut self, retries: u32) {
        self.iterations = self.iterations.saturating_add(1);
        self.retries = self.retries.saturating_add(retries);
    }

    #[must_use]
    pub fn stats(&self) -> RunStats {
        RunStats {
            iterations: self.iterations,
            retries: self.retries,
        }
    }
}

/// Run statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub iterations: u32,
    pub retries: u32,
}
