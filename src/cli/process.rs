//! Agent process spawning and control.
//!
//! This module provides a builder for the agent's command line, along with
//! a handle over the running child that supports graceful termination.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// Default agent executable.
pub const DEFAULT_AGENT: &str = "opencode";

/// Default model selector passed to the agent.
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4-20250514";

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The executable was not found.
    #[error("Agent executable '{program}' not found on PATH; is it installed?")]
    NotFound { program: String },
    /// Permission denied when spawning.
    #[error("Permission denied executing '{program}'; check that it is executable")]
    PermissionDenied { program: String },
    /// Out of file descriptors or processes.
    #[error("Cannot spawn '{program}': system resources exhausted (too many open files or processes)")]
    ResourceExhausted { program: String },
    /// Other I/O error.
    #[error("Failed to spawn '{program}': {source}")]
    Io {
        program: String,
        source: std::io::Error,
    },
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    #[must_use]
    pub fn from_io(program: &str, err: std::io::Error) -> Self {
        let program = program.to_string();
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { program },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { program },
            _ if is_resource_exhaustion(&err) => Self::ResourceExhausted { program },
            _ => Self::Io {
                program,
                source: err,
            },
        }
    }
}

fn is_resource_exhaustion(err: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        matches!(
            err.raw_os_error().map(Errno::from_raw),
            Some(Errno::EMFILE | Errno::ENFILE | Errno::EAGAIN)
        )
    }

    #[cfg(not(unix))]
    {
        let _ = err;
        false
    }
}

/// Builder for the agent command line.
///
/// The default layout is `<program> run --model <model> --format json <instruction>`.
#[derive(Debug, Clone)]
pub struct AgentCommand {
    program: String,
    model: String,
    instruction: String,
    working_dir: Option<PathBuf>,
    raw_args: Option<Vec<String>>,
}

impl AgentCommand {
    /// Create a command for the default agent with the given instruction.
    #[must_use]
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            program: DEFAULT_AGENT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            instruction: instruction.into(),
            working_dir: None,
            raw_args: None,
        }
    }

    /// Run an arbitrary program with fixed arguments instead of the agent layout.
    ///
    /// Useful for wrappers and for driving the supervisor with scripted output.
    #[must_use]
    pub fn raw<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            model: String::new(),
            instruction: String::new(),
            working_dir: None,
            raw_args: Some(args.into_iter().map(Into::into).collect()),
        }
    }

    /// Set the executable.
    #[must_use]
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the model selector.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the working directory for the agent process.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn get_program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn get_working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    #[must_use]
    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Build the command-line arguments.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        if let Some(args) = &self.raw_args {
            return args.clone();
        }
        vec![
            "run".to_string(),
            "--model".to_string(),
            self.model.clone(),
            "--format".to_string(),
            "json".to_string(),
            self.instruction.clone(),
        ]
    }
}

/// A running agent process.
#[derive(Debug)]
pub struct AgentProcess {
    child: Child,
}

impl AgentProcess {
    /// Spawn the agent with stdin closed and stdout/stderr piped.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn(command: &AgentCommand) -> Result<Self, SpawnError> {
        let args = command.build_args();

        let mut cmd = Command::new(&command.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(&command.program, e))?;

        tracing::debug!(
            program = %command.program,
            pid = ?child.id(),
            "Spawned agent process"
        );

        Ok(Self { child })
    }

    /// Take ownership of the stdout handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take ownership of the stderr handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Forcefully kill the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    /// Attempt graceful termination with a timeout.
    ///
    /// On Unix, sends SIGTERM first, then SIGKILL after the timeout.
    /// On other platforms, falls back to immediate kill. Either way the
    /// child has been reaped when this returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns an error if termination fails.
    pub async fn graceful_terminate(&mut self, timeout: Duration) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            self.graceful_terminate_unix(timeout).await
        }

        #[cfg(not(unix))]
        {
            let _ = timeout;
            self.kill().await
        }
    }

    #[cfg(unix)]
    async fn graceful_terminate_unix(&mut self, timeout: Duration) -> std::io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.id() else {
            // Already reaped
            return Ok(());
        };

        let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        if let Err(e) = kill(nix_pid, Signal::SIGTERM) {
            tracing::debug!(pid, error = %e, "SIGTERM failed, process likely exited");
        }

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!(pid, ?timeout, "Agent ignored SIGTERM, sending SIGKILL");
                self.child.kill().await
            }
        }
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitInfo {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed by one.
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// A normal exit with the given code.
    #[must_use]
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Death by signal.
    #[must_use]
    pub fn signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Whether the child was stopped by an interrupt or termination request.
    #[must_use]
    pub fn is_termination_signal(&self) -> bool {
        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;
            matches!(
                self.signal.and_then(|s| Signal::try_from(s).ok()),
                Some(Signal::SIGINT | Signal::SIGTERM)
            )
        }

        #[cfg(not(unix))]
        {
            false
        }
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}
