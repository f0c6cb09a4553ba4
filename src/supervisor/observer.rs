//! Callback surface between the supervisor and whatever presents its progress.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cli::{StreamEvent, TokenUsage};
use crate::supervisor::{IterationOutcome, RunState};

/// Category of an output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Text,
    Tool,
    Info,
    Warning,
    Error,
}

/// An append-only line of run output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub kind: OutputKind,
    pub text: String,
}

impl OutputLine {
    #[must_use]
    pub fn new(kind: OutputKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(OutputKind::Text, text)
    }

    #[must_use]
    pub fn tool(text: impl Into<String>) -> Self {
        Self::new(OutputKind::Tool, text)
    }

    #[must_use]
    pub fn info(text: impl Into<String>) -> Self {
        Self::new(OutputKind::Info, text)
    }

    #[must_use]
    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(OutputKind::Warning, text)
    }

    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(OutputKind::Error, text)
    }
}

/// Receives progress from a run.
///
/// Every method has a no-op default so implementors only override what they
/// present. Calls arrive on the supervisor's task, in stream order.
pub trait RunObserver: Send + Sync {
    /// A new iteration is starting.
    fn on_iteration(&self, _iteration: u32, _total: u32) {}

    /// Cumulative token usage for the run changed.
    fn on_tokens(&self, _usage: &TokenUsage) {}

    /// The agent started a different task.
    fn on_task(&self, _task: &str) {}

    fn on_output(&self, _line: &OutputLine) {}

    /// The run changed state. Non-success terminal states carry a reason.
    fn on_status(&self, _state: RunState, _message: Option<&str>) {}

    /// A retry is about to happen; `retry` is 0 once retries are over.
    fn on_retry(&self, _retry: u32, _max: u32) {}

    fn log_iteration_start(&self, _iteration: u32) {}

    fn log_event(&self, _raw: &str, _event: &StreamEvent) {}

    fn log_raw_line(&self, _line: &str) {}

    fn log_diagnostic(&self, _line: &str) {}

    fn log_iteration_end(&self, _iteration: u32, _outcome: &IterationOutcome) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Fans callbacks out to several observers, in registration order.
#[derive(Clone, Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn RunObserver>>,
}

impl CompositeObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn push(&mut self, observer: Arc<dyn RunObserver>) {
        self.observers.push(observer);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl std::fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl RunObserver for CompositeObserver {
    fn on_iteration(&self, iteration: u32, total: u32) {
        for o in &self.observers {
            o.on_iteration(iteration, total);
        }
    }

    fn on_tokens(&self, usage: &TokenUsage) {
        for o in &self.observers {
            o.on_tokens(usage);
        }
    }

    fn on_task(&self, task: &str) {
        for o in &self.observers {
            o.on_task(task);
        }
    }

    fn on_output(&self, line: &OutputLine) {
        for o in &self.observers {
            o.on_output(line);
        }
    }

    fn on_status(&self, state: RunState, message: Option<&str>) {
        for o in &self.observers {
            o.on_status(state, message);
        }
    }

    fn on_retry(&self, retry: u32, max: u32) {
        for o in &self.observers {
            o.on_retry(retry, max);
        }
    }

    fn log_iteration_start(&self, iteration: u32) {
        for o in &self.observers {
            o.log_iteration_start(iteration);
        }
    }

    fn log_event(&self, raw: &str, event: &StreamEvent) {
        for o in &self.observers {
            o.log_event(raw, event);
        }
    }

    fn log_raw_line(&self, line: &str) {
        for o in &self.observers {
            o.log_raw_line(line);
        }
    }

    fn log_diagnostic(&self, line: &str) {
        for o in &self.observers {
            o.log_diagnostic(line);
        }
    }

    fn log_iteration_end(&self, iteration: u32, outcome: &IterationOutcome) {
        for o in &self.observers {
            o.log_iteration_end(iteration, outcome);
        }
    }
}
