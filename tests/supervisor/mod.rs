//! Supervisor module tests.

mod runner_test;
mod session_test;

use std::sync::Mutex;

use ralph_supervisor::cli::TokenUsage;
use ralph_supervisor::supervisor::{
    IterationOutcome, OutputKind, OutputLine, RunObserver, RunState,
};

/// Observer that keeps what the tests assert on.
#[derive(Debug, Default)]
pub struct Recorder {
    pub tasks: Mutex<Vec<String>>,
    pub output: Mutex<Vec<OutputLine>>,
    pub statuses: Mutex<Vec<(RunState, Option<String>)>>,
    pub tokens: Mutex<Option<TokenUsage>>,
    pub iteration_ends: Mutex<u32>,
}

impl Recorder {
    pub fn lines(&self, kind: OutputKind) -> Vec<String> {
        self.output
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| l.text.clone())
            .collect()
    }
}

impl RunObserver for Recorder {
    fn on_task(&self, task: &str) {
        self.tasks.lock().unwrap().push(task.to_string());
    }

    fn on_output(&self, line: &OutputLine) {
        self.output.lock().unwrap().push(line.clone());
    }

    fn on_status(&self, state: RunState, message: Option<&str>) {
        self.statuses
            .lock()
            .unwrap()
            .push((state, message.map(String::from)));
    }

    fn on_tokens(&self, usage: &TokenUsage) {
        *self.tokens.lock().unwrap() = Some(*usage);
    }

    fn log_iteration_end(&self, _iteration: u32, _outcome: &IterationOutcome) {
        *self.iteration_ends.lock().unwrap() += 1;
    }
}

/// Verify the public supervisor surface is exported from the library.
#[test]
fn test_all_supervisor_types_exported() {
    use ralph_supervisor::supervisor::{
        CancellationController, CompositeObserver, EventPipeline, NoopObserver, RetryPolicy,
        RunContext, RunStateMachine, Settlement, DEFAULT_ITERATION_DELAY,
        DEFAULT_TERMINATE_TIMEOUT, MAX_RETRIES,
    };

    let ctx = std::sync::Arc::new(RunContext::new());
    let _ = CancellationController::new(ctx);
    let _ = CompositeObserver::new().with(std::sync::Arc::new(NoopObserver));
    let _ = EventPipeline::new();
    let _ = RunStateMachine::new();
    let _ = RetryPolicy::default();
    let _ = Settlement::Cancelled;
    let _ = IterationOutcome::default();

    assert_eq!(MAX_RETRIES, 3);
    assert!(DEFAULT_TERMINATE_TIMEOUT.as_secs() >= 1);
    assert!(DEFAULT_ITERATION_DELAY.as_secs() >= 1);
}
