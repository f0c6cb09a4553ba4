//! Tests for agent process spawning and control.

use ralph_supervisor::cli::{AgentCommand, AgentProcess, SpawnError, DEFAULT_AGENT};

#[test]
fn command_default_layout() {
    let command = AgentCommand::new("Fix the bug").model("openai/gpt-5");
    assert_eq!(command.get_program(), DEFAULT_AGENT);
    assert_eq!(
        command.build_args(),
        vec!["run", "--model", "openai/gpt-5", "--format", "json", "Fix the bug"]
    );
}

#[test]
fn command_raw_args_pass_through() {
    let command = AgentCommand::raw("sh", ["-c", "true"]).working_dir("/tmp");
    assert_eq!(command.build_args(), vec!["-c", "true"]);
    assert_eq!(command.get_working_dir(), Some(std::path::Path::new("/tmp")));
}

#[tokio::test]
async fn spawn_missing_program_is_not_found() {
    let command = AgentCommand::new("task").program("definitely-not-an-agent-binary-xyz");
    let err = AgentProcess::spawn(&command).unwrap_err();
    assert!(matches!(err, SpawnError::NotFound { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn spawn_and_wait_for_exit_code() {
    let command = AgentCommand::raw("sh", ["-c", "exit 3"]);
    let mut process = AgentProcess::spawn(&command).unwrap();
    let status = process.wait().await.unwrap();
    assert_eq!(status.code(), Some(3));
}

#[cfg(unix)]
#[tokio::test]
async fn graceful_terminate_stops_sleeping_child() {
    use std::time::{Duration, Instant};

    let command = AgentCommand::raw("sh", ["-c", "sleep 30"]);
    let mut process = AgentProcess::spawn(&command).unwrap();
    assert!(process.id().is_some());

    let started = Instant::now();
    process
        .graceful_terminate(Duration::from_secs(2))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[cfg(unix)]
#[tokio::test]
async fn graceful_terminate_escalates_to_kill() {
    use std::time::{Duration, Instant};

    let command = AgentCommand::raw("sh", ["-c", "trap '' TERM; sleep 30"]);
    let mut process = AgentProcess::spawn(&command).unwrap();
    // Give the shell time to install the trap.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    process
        .graceful_terminate(Duration::from_millis(300))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
}
