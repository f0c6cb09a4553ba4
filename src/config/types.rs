//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::{DEFAULT_AGENT, DEFAULT_MODEL};

/// Default prompt file, relative to the working directory.
pub const DEFAULT_PROMPT_FILE: &str = "PROMPT.md";

/// Settings for a supervised loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Agent executable.
    pub agent: String,
    /// Model identifier passed to the agent.
    pub model: String,
    pub max_iterations: u32,
    /// Delay before each retry, in seconds.
    pub retry_delay_secs: u64,
    /// Delay between iterations, in seconds.
    pub iteration_delay_secs: u64,
    /// Grace period between SIGTERM and SIGKILL, in seconds.
    pub terminate_grace_secs: u64,
    pub prompt_file: PathBuf,
    /// Directory for per-run debug logs. Disabled when unset.
    pub debug_log_dir: Option<PathBuf>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            agent: DEFAULT_AGENT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_iterations: 10,
            retry_delay_secs: 5,
            iteration_delay_secs: 2,
            terminate_grace_secs: 5,
            prompt_file: PathBuf::from(DEFAULT_PROMPT_FILE),
            debug_log_dir: None,
        }
    }
}

impl LoopConfig {
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    #[must_use]
    pub fn iteration_delay(&self) -> Duration {
        Duration::from_secs(self.iteration_delay_secs)
    }

    #[must_use]
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_secs(self.terminate_grace_secs)
    }
}
