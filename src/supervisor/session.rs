//! One agent invocation: spawn, stream, settle, resolve.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{ChildStderr, ChildStdout};

use crate::cli::{diagnose, AgentCommand, AgentProcess, ExitInfo, TokenUsage};
use crate::supervisor::{
    Attempt, EventPipeline, IterationOutcome, OutputLine, RunContext, RunObserver,
    DEFAULT_TERMINATE_TIMEOUT,
};

/// Bytes requested from stdout per read.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// How long output is still read after the child has exited.
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// How the child process settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The child exited on its own.
    Exited(ExitInfo),
    /// The run was cancelled and the child was terminated.
    Cancelled,
    /// Waiting on the child failed.
    WaitFailed(String),
}

/// Runs the agent once per attempt, under a shared [`RunContext`].
pub struct ProcessSession {
    command: AgentCommand,
    ctx: Arc<RunContext>,
    terminate_grace: Duration,
    pipeline: EventPipeline,
}

impl ProcessSession {
    #[must_use]
    pub fn new(command: AgentCommand, ctx: Arc<RunContext>) -> Self {
        Self {
            command,
            ctx,
            terminate_grace: DEFAULT_TERMINATE_TIMEOUT,
            pipeline: EventPipeline::new(),
        }
    }

    /// Grace period between SIGTERM and SIGKILL on cancellation.
    #[must_use]
    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    #[must_use]
    pub fn command(&self) -> &AgentCommand {
        &self.command
    }

    #[must_use]
    pub fn pipeline(&self) -> &EventPipeline {
        &self.pipeline
    }

    async fn attempt(&mut self, iteration: u32, observer: &dyn RunObserver) -> IterationOutcome {
        self.pipeline.begin_iteration();

        if self.ctx.is_cancelled() {
            return IterationOutcome::cancelled(self.cancel_reason());
        }

        let mut process = match AgentProcess::spawn(&self.command) {
            Ok(process) => process,
            Err(e) => {
                tracing::error!(iteration, error = %e, "Failed to spawn agent");
                observer.on_output(&OutputLine::error(e.to_string()));
                return IterationOutcome::failed(e.to_string(), None);
            }
        };

        let pid = process.id();
        tracing::info!(iteration, ?pid, program = %self.command.get_program(), "Agent started");
        self.ctx.set_active(pid);

        let settlement = self.drive(&mut process, observer).await;

        self.ctx.clear_active();
        self.pipeline.finish(observer);

        let outcome = resolve_outcome(
            &settlement,
            self.ctx.is_cancelled(),
            self.pipeline.is_complete(),
            self.ctx.reason(),
        )
        .with_counts(self.pipeline.events_seen(), self.pipeline.meaningful_events());

        tracing::info!(
            iteration,
            success = outcome.success,
            completed = outcome.completed,
            cancelled = outcome.cancelled,
            exit_code = ?outcome.exit_code,
            events = outcome.events_seen,
            "Agent settled"
        );

        if outcome.success && !outcome.completed && outcome.meaningful_events == 0 {
            tracing::warn!(iteration, "Agent exited cleanly without any output");
            observer.on_output(&OutputLine::warning(
                "Empty response: the agent exited without producing any text or tool calls",
            ));
        }

        outcome
    }

    /// Stream output until the child exits or the run is cancelled.
    ///
    /// Settlement follows the child's exit, not the pipes: a descendant that
    /// inherited stdout/stderr only gets [`OUTPUT_DRAIN_TIMEOUT`] to finish.
    async fn drive(&mut self, process: &mut AgentProcess, observer: &dyn RunObserver) -> Settlement {
        let token = self.ctx.token();
        let mut output = AgentOutput::new(process);

        loop {
            tokio::select! {
                biased;

                () = token.cancelled() => {
                    tracing::info!(pid = ?process.id(), "Terminating agent");
                    if let Err(e) = process.graceful_terminate(self.terminate_grace).await {
                        tracing::error!(error = %e, "Failed to terminate agent");
                    }
                    return Settlement::Cancelled;
                }
                next = output.next() => self.handle_output(next, &output, observer),
                status = process.wait() => {
                    let settlement = match status {
                        Ok(status) => Settlement::Exited(status.into()),
                        Err(e) => Settlement::WaitFailed(e.to_string()),
                    };
                    self.drain(&mut output, observer).await;
                    return settlement;
                }
            }
        }
    }

    /// Read what the exited child left in its pipes.
    async fn drain(&mut self, output: &mut AgentOutput, observer: &dyn RunObserver) {
        let drained = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, async {
            while !output.is_closed() {
                let next = output.next().await;
                self.handle_output(next, output, observer);
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                timeout_ms = OUTPUT_DRAIN_TIMEOUT.as_millis(),
                "Agent output still open after exit, abandoning it"
            );
        }
    }

    fn handle_output(&mut self, next: Output, output: &AgentOutput, observer: &dyn RunObserver) {
        match next {
            Output::Stdout(n) => self.pipeline.feed(output.chunk(n), observer),
            Output::Stderr(line) => handle_stderr(&line, observer),
            Output::Closed => {}
        }
    }

    fn cancel_reason(&self) -> String {
        self.ctx.reason().unwrap_or_else(|| "Cancelled".to_string())
    }
}

impl std::fmt::Debug for ProcessSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSession")
            .field("command", &self.command)
            .field("terminate_grace", &self.terminate_grace)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Attempt for ProcessSession {
    fn begin_run(&mut self) {
        self.pipeline.begin_run();
    }

    async fn run(&mut self, iteration: u32, observer: &dyn RunObserver) -> IterationOutcome {
        observer.log_iteration_start(iteration);
        let outcome = self.attempt(iteration, observer).await;
        observer.log_iteration_end(iteration, &outcome);
        outcome
    }

    fn token_usage(&self) -> TokenUsage {
        self.pipeline.tokens()
    }
}

enum Output {
    Stdout(usize),
    Stderr(String),
    Closed,
}

/// The child's stdout (read in chunks) and stderr (read by line).
struct AgentOutput {
    stdout: Option<ChildStdout>,
    stderr: Option<Lines<BufReader<ChildStderr>>>,
    buf: Vec<u8>,
}

impl AgentOutput {
    fn new(process: &mut AgentProcess) -> Self {
        Self {
            stdout: process.take_stdout(),
            stderr: process.take_stderr().map(|s| BufReader::new(s).lines()),
            buf: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    fn is_closed(&self) -> bool {
        self.stdout.is_none() && self.stderr.is_none()
    }

    fn chunk(&self, n: usize) -> &[u8] {
        &self.buf[..n]
    }

    /// Next stdout chunk or stderr line. Never resolves once both are closed.
    async fn next(&mut self) -> Output {
        tokio::select! {
            biased;

            read = read_chunk(&mut self.stdout, &mut self.buf) => match read {
                Ok(0) => {
                    self.stdout = None;
                    Output::Closed
                }
                Ok(n) => Output::Stdout(n),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read agent stdout");
                    self.stdout = None;
                    Output::Closed
                }
            },
            line = next_line(&mut self.stderr) => match line {
                Ok(Some(line)) => Output::Stderr(line),
                Ok(None) => {
                    self.stderr = None;
                    Output::Closed
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read agent stderr");
                    self.stderr = None;
                    Output::Closed
                }
            },
        }
    }
}

async fn read_chunk(stdout: &mut Option<ChildStdout>, buf: &mut [u8]) -> std::io::Result<usize> {
    match stdout {
        Some(stdout) => stdout.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn next_line(
    stderr: &mut Option<Lines<BufReader<ChildStderr>>>,
) -> std::io::Result<Option<String>> {
    match stderr {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

fn handle_stderr(line: &str, observer: &dyn RunObserver) {
    if line.trim().is_empty() {
        return;
    }
    observer.log_diagnostic(line);
    let diagnostic = diagnose(line);
    tracing::debug!(category = ?diagnostic.category, "Agent stderr");
    observer.on_output(&OutputLine::warning(diagnostic.message));
}

/// Decide the outcome of a settled attempt.
///
/// Precedence: cancellation, then completion, then the exit status.
#[must_use]
pub fn resolve_outcome(
    settlement: &Settlement,
    cancel_flag: bool,
    completed: bool,
    reason: Option<String>,
) -> IterationOutcome {
    #[allow(clippy::match_same_arms)]
    let exit = match settlement {
        _ if cancel_flag => None,
        Settlement::Cancelled => None,
        Settlement::Exited(exit) => Some(*exit),
        Settlement::WaitFailed(e) => {
            return IterationOutcome::failed(format!("Failed to wait for agent: {e}"), None);
        }
    };
    let Some(exit) = exit else {
        return IterationOutcome::cancelled(reason.unwrap_or_else(|| "Cancelled".to_string()));
    };

    if exit.is_termination_signal() {
        let signal = exit.signal.unwrap_or_default();
        return IterationOutcome::cancelled(format!("Agent was terminated by signal {signal}"));
    }

    if completed {
        return IterationOutcome::completed(exit.code);
    }

    match (exit.code, exit.signal) {
        (Some(0), _) => IterationOutcome::success(Some(0)),
        (Some(code), _) => IterationOutcome::failed(format!("Agent exited with code {code}"), Some(code)),
        (None, Some(signal)) => {
            IterationOutcome::failed(format!("Agent was killed by signal {signal}"), None)
        }
        (None, None) => IterationOutcome::failed("Agent exited with unknown status", None),
    }
}
