//! Process session tests driven by scripted shell "agents".

#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use ralph_supervisor::cli::AgentCommand;
use ralph_supervisor::supervisor::{
    Attempt, CancellationController, IterationSupervisor, OutputKind, ProcessSession,
    RetryPolicy, RunContext, RunState,
};

use super::Recorder;

fn script(body: &str) -> AgentCommand {
    AgentCommand::raw("sh", ["-c", body])
}

fn session(body: &str, ctx: &Arc<RunContext>) -> ProcessSession {
    ProcessSession::new(script(body), Arc::clone(ctx)).with_terminate_grace(Duration::from_secs(2))
}

#[tokio::test]
async fn end_to_end_stream_completes() {
    let body = r#"printf '%s\n' \
        '{"type":"step_start","sessionID":"s1"}' \
        '{"type":"text","part":{"text":"Working on: Add login\n"}}' \
        '{"type":"tool_use","part":{"tool":"edit","state":{"title":"src/login.rs"}}}' \
        '{"type":"text","part":{"text":"All done <promise>COMPLETE</promise>"}}' \
        '{"type":"step_finish","part":{"tokens":{"input":120,"output":30}}}'"#;

    let ctx = Arc::new(RunContext::new());
    let recorder = Arc::new(Recorder::default());
    let mut supervisor =
        IterationSupervisor::new(session(body, &ctx), Arc::clone(&ctx), recorder.clone())
            .with_max_iterations(3)
            .with_iteration_delay(Duration::ZERO)
            .with_retry_policy(RetryPolicy::new(Duration::ZERO));

    let summary = supervisor.run().await;

    assert_eq!(summary.state, RunState::Complete);
    assert!(summary.completed());
    assert_eq!(summary.iterations_run, 1);
    assert_eq!(summary.tokens.total(), 150);
    assert_eq!(*recorder.tasks.lock().unwrap(), vec!["Add login"]);
    assert_eq!(recorder.lines(OutputKind::Tool), vec!["edit: src/login.rs"]);

    let outcome = summary.last_outcome.unwrap();
    assert!(outcome.completed);
    assert_eq!(outcome.events_seen, 5);
    assert_eq!(outcome.meaningful_events, 3);
}

#[tokio::test]
async fn malformed_lines_are_warnings() {
    let body = r#"printf '%s\n' '{"type":"text","text":"one"}' 'NOT-JSON' '{"type":"text","text":"two"}'"#;
    let ctx = Arc::new(RunContext::new());
    let recorder = Recorder::default();
    let mut session = session(body, &ctx);

    session.begin_run();
    let outcome = session.run(1, &recorder).await;

    assert!(outcome.success);
    assert!(!outcome.completed);
    assert_eq!(outcome.events_seen, 2);
    assert_eq!(session.pipeline().warnings(), 1);
    assert_eq!(recorder.lines(OutputKind::Warning).len(), 1);
}

#[tokio::test]
async fn nonzero_exit_is_failure() {
    let ctx = Arc::new(RunContext::new());
    let recorder = Recorder::default();
    let mut session = session("echo 'Error: 503 Service Unavailable' >&2; exit 2", &ctx);

    let outcome = session.run(1, &recorder).await;

    assert!(!outcome.success);
    assert!(!outcome.cancelled);
    assert_eq!(outcome.exit_code, Some(2));
    assert_eq!(outcome.error_message(), "Agent exited with code 2");

    let warnings = recorder.lines(OutputKind::Warning);
    assert!(warnings.iter().any(|w| w.contains("503")), "got {warnings:?}");
    assert_eq!(*recorder.iteration_ends.lock().unwrap(), 1);
}

#[tokio::test]
async fn completion_beats_nonzero_exit() {
    let body = r#"printf '%s\n' '{"type":"text","text":"<promise>COMPLETE</promise>"}'; exit 1"#;
    let ctx = Arc::new(RunContext::new());
    let mut session = session(body, &ctx);

    let outcome = session.run(1, &Recorder::default()).await;
    assert!(outcome.completed);
    assert!(outcome.success);
}

#[tokio::test]
async fn clean_exit_without_output_warns() {
    let ctx = Arc::new(RunContext::new());
    let recorder = Recorder::default();
    let mut session = session("exit 0", &ctx);

    let outcome = session.run(1, &recorder).await;
    assert!(outcome.success);
    assert_eq!(outcome.meaningful_events, 0);
    assert!(recorder
        .lines(OutputKind::Warning)
        .iter()
        .any(|w| w.starts_with("Empty response")));
}

#[tokio::test]
async fn trailing_record_without_newline_is_processed() {
    let body = r#"printf '%s' '{"type":"text","text":"<promise>COMPLETE</promise>"}'"#;
    let ctx = Arc::new(RunContext::new());
    let mut session = session(body, &ctx);

    let outcome = session.run(1, &Recorder::default()).await;
    assert!(outcome.completed);
}

#[tokio::test]
async fn settles_on_exit_while_descendant_holds_pipes() {
    let body = r#"printf '%s\n' '{"type":"text","text":"<promise>COMPLETE</promise>"}'; sleep 5 & exit 0"#;
    let ctx = Arc::new(RunContext::new());
    let mut session = session(body, &ctx);

    let started = Instant::now();
    let outcome = session.run(1, &Recorder::default()).await;

    assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
    assert!(outcome.completed);
    assert!(ctx.active_child().is_none());
}

#[tokio::test]
async fn missing_program_fails_attempt() {
    let ctx = Arc::new(RunContext::new());
    let recorder = Recorder::default();
    let command = AgentCommand::new("task").program("definitely-not-an-agent-binary-xyz");
    let mut session = ProcessSession::new(command, Arc::clone(&ctx));

    let outcome = session.run(1, &recorder).await;
    assert!(!outcome.success);
    assert!(!outcome.is_final());
    assert!(outcome.error_message().contains("not found"));
    assert_eq!(recorder.lines(OutputKind::Error).len(), 1);
    assert!(ctx.active_child().is_none());
}

#[tokio::test]
async fn cancellation_terminates_running_agent() {
    let ctx = Arc::new(RunContext::new());
    let recorder = Arc::new(Recorder::default());
    let controller = CancellationController::new(Arc::clone(&ctx)).with_grace(Duration::from_secs(2));

    let mut supervisor = IterationSupervisor::new(
        session("sleep 30", &ctx),
        Arc::clone(&ctx),
        recorder.clone(),
    )
    .with_max_iterations(5)
    .with_iteration_delay(Duration::ZERO)
    .with_retry_policy(RetryPolicy::new(Duration::ZERO));

    let canceller = Arc::clone(&ctx);
    tokio::spawn(async move {
        // Wait until the session has registered its child.
        while canceller.active_child().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        canceller.cancel("Interrupted by user");
    });

    let started = Instant::now();
    let summary = supervisor.run().await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(summary.state, RunState::Cancelled);
    assert_eq!(summary.exit_code(), 130);
    assert_eq!(summary.iterations_run, 1);
    assert_eq!(summary.reason.as_deref(), Some("Interrupted by user"));
    assert!(controller.shutdown().await);
    assert!(ctx.active_child().is_none());

    let statuses = recorder.statuses.lock().unwrap();
    assert_eq!(statuses.last().map(|(s, _)| *s), Some(RunState::Cancelled));
}

#[tokio::test]
async fn retries_then_exhausts_on_persistent_failure() {
    let ctx = Arc::new(RunContext::new());
    let recorder = Arc::new(Recorder::default());
    let mut supervisor = IterationSupervisor::new(
        session("exit 1", &ctx),
        Arc::clone(&ctx),
        recorder.clone(),
    )
    .with_max_iterations(2)
    .with_retry_policy(RetryPolicy::new(Duration::ZERO));

    let summary = supervisor.run().await;

    assert_eq!(summary.state, RunState::Failed);
    assert_eq!(summary.retries, 3);
    assert_eq!(*recorder.iteration_ends.lock().unwrap(), 4);
    assert_eq!(
        summary.reason.as_deref(),
        Some("Failed after 3 retries: Agent exited with code 1")
    );
}
