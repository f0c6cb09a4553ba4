//! Per-run JSON debug log.
//!
//! One file per run, `<dir>/run-<uuid>.json`, rewritten at the end of every
//! attempt so that an interrupted run still leaves its finished attempts on
//! disk.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::StreamEvent;
use crate::supervisor::{IterationOutcome, RunObserver};

/// Errors from creating or writing the debug log.
#[derive(Debug, thiserror::Error)]
pub enum DebugLogError {
    #[error("Failed to create debug log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write debug log {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize debug log: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct LoggedEvent {
    at: DateTime<Utc>,
    kind: String,
    record: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct IterationRecord {
    iteration: u32,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    events: Vec<LoggedEvent>,
    raw_lines: Vec<String>,
    diagnostics: Vec<String>,
    outcome: Option<IterationOutcome>,
}

impl IterationRecord {
    fn new(iteration: u32) -> Self {
        Self {
            iteration,
            started_at: Utc::now(),
            ended_at: None,
            events: Vec::new(),
            raw_lines: Vec::new(),
            diagnostics: Vec::new(),
            outcome: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct RunLog {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    iterations: Vec<IterationRecord>,
}

/// Observer that records every attempt to a JSON file.
#[derive(Debug)]
pub struct DebugLog {
    path: PathBuf,
    log: Mutex<RunLog>,
}

impl DebugLog {
    /// Create the log directory if needed and write an empty run record.
    ///
    /// # Errors
    ///
    /// Returns `DebugLogError` if the directory or file cannot be written.
    pub fn create(dir: &Path) -> Result<Self, DebugLogError> {
        std::fs::create_dir_all(dir).map_err(|e| DebugLogError::CreateDir {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let run_id = Uuid::new_v4();
        let path = dir.join(format!("run-{run_id}.json"));
        let log = Self {
            path,
            log: Mutex::new(RunLog {
                run_id,
                started_at: Utc::now(),
                iterations: Vec::new(),
            }),
        };
        log.persist()?;
        tracing::info!(path = %log.path.display(), "Writing debug log");
        Ok(log)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current record to disk.
    ///
    /// # Errors
    ///
    /// Returns `DebugLogError` if serialization or the write fails.
    pub fn persist(&self) -> Result<(), DebugLogError> {
        let json = {
            let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_vec_pretty(&*log)?
        };
        std::fs::write(&self.path, json).map_err(|e| DebugLogError::Write {
            path: self.path.clone(),
            source: e,
        })
    }

    fn with_current(&self, f: impl FnOnce(&mut IterationRecord)) {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = log.iterations.last_mut() {
            f(record);
        }
    }
}

impl RunObserver for DebugLog {
    fn log_iteration_start(&self, iteration: u32) {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.iterations.push(IterationRecord::new(iteration));
    }

    fn log_event(&self, raw: &str, event: &StreamEvent) {
        let record = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        self.with_current(|current| {
            current.events.push(LoggedEvent {
                at: Utc::now(),
                kind: event.kind().to_string(),
                record,
            });
        });
    }

    fn log_raw_line(&self, line: &str) {
        self.with_current(|current| current.raw_lines.push(line.to_string()));
    }

    fn log_diagnostic(&self, line: &str) {
        self.with_current(|current| current.diagnostics.push(line.to_string()));
    }

    fn log_iteration_end(&self, _iteration: u32, outcome: &IterationOutcome) {
        self.with_current(|current| {
            current.ended_at = Some(Utc::now());
            current.outcome = Some(outcome.clone());
        });
        if let Err(e) = self.persist() {
            tracing::warn!(error = %e, "Failed to write debug log");
        }
    }
}
