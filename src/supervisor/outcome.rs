//! Results of a single attempt and of a retry-wrapped iteration.

use serde::{Deserialize, Serialize};

/// Result of one agent invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationOutcome {
    /// The attempt succeeded (exit code 0, or completion observed).
    pub success: bool,
    /// The completion marker was observed.
    pub completed: bool,
    /// The attempt was cancelled. Takes precedence over everything else.
    pub cancelled: bool,
    /// Human-readable failure or cancellation reason.
    pub error: Option<String>,
    /// Process exit code, if it exited normally.
    pub exit_code: Option<i32>,
    /// Classified events seen during the attempt.
    pub events_seen: u32,
    /// Events carrying real text or tool-use content.
    pub meaningful_events: u32,
}

impl IterationOutcome {
    /// A clean exit without the completion marker.
    #[must_use]
    pub fn success(exit_code: Option<i32>) -> Self {
        Self {
            success: true,
            exit_code,
            ..Self::default()
        }
    }

    /// The completion marker was observed.
    #[must_use]
    pub fn completed(exit_code: Option<i32>) -> Self {
        Self {
            success: true,
            completed: true,
            exit_code,
            ..Self::default()
        }
    }

    /// The attempt failed.
    #[must_use]
    pub fn failed(error: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            error: Some(error.into()),
            exit_code,
            ..Self::default()
        }
    }

    /// The attempt was cancelled.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self {
            cancelled: true,
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Attach event counts.
    #[must_use]
    pub fn with_counts(mut self, events_seen: u32, meaningful_events: u32) -> Self {
        self.events_seen = events_seen;
        self.meaningful_events = meaningful_events;
        self
    }

    /// Whether this outcome ends the retry loop without a retry.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.success || self.completed || self.cancelled
    }

    /// Failure reason, or a generic message if none was recorded.
    #[must_use]
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }
}

/// Result of an iteration after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome {
    /// Outcome of the last attempt.
    pub outcome: IterationOutcome,
    /// Re-attempts made after the first.
    pub retries_used: u32,
    /// Every attempt failed and the retry budget is spent.
    pub exhausted: bool,
}
