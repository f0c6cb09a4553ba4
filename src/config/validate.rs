//! Preflight checks run before the loop starts.

use std::path::{Path, PathBuf};

/// Where the instruction payload comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    /// Given directly on the command line.
    Inline(String),
    /// Read from a file, relative paths resolved against the working dir.
    File(PathBuf),
}

/// A preflight check failed.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Working directory does not exist: {0}")]
    MissingWorkingDir(PathBuf),

    #[error("Working directory is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Prompt file not found: {0}")]
    MissingPromptFile(PathBuf),

    #[error("Failed to read prompt file {path}: {source}")]
    UnreadablePromptFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Prompt file is empty: {0}")]
    EmptyPromptFile(PathBuf),

    #[error("Instruction is empty")]
    EmptyInstruction,

    #[error("max_iterations must be at least 1")]
    ZeroIterations,
}

/// Check that the working directory exists.
///
/// # Errors
///
/// Returns `ValidationError` if the path is missing or not a directory.
pub fn validate_working_dir(dir: &Path) -> Result<(), ValidationError> {
    if !dir.exists() {
        return Err(ValidationError::MissingWorkingDir(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(ValidationError::NotADirectory(dir.to_path_buf()));
    }
    Ok(())
}

/// Resolve the instruction payload.
///
/// # Errors
///
/// Returns `ValidationError` if the prompt file is missing, unreadable or
/// blank, or the inline instruction is blank.
pub fn load_instruction(source: &PromptSource, working_dir: &Path) -> Result<String, ValidationError> {
    match source {
        PromptSource::Inline(text) => {
            if text.trim().is_empty() {
                return Err(ValidationError::EmptyInstruction);
            }
            Ok(text.clone())
        }
        PromptSource::File(path) => {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                working_dir.join(path)
            };
            if !path.is_file() {
                return Err(ValidationError::MissingPromptFile(path));
            }
            let text = std::fs::read_to_string(&path).map_err(|e| {
                ValidationError::UnreadablePromptFile {
                    path: path.clone(),
                    source: e,
                }
            })?;
            if text.trim().is_empty() {
                return Err(ValidationError::EmptyPromptFile(path));
            }
            tracing::debug!(path = %path.display(), len = text.len(), "Loaded prompt file");
            Ok(text)
        }
    }
}

/// Reject a zero iteration ceiling.
///
/// # Errors
///
/// Returns `ValidationError::ZeroIterations` when `max_iterations` is 0.
pub fn validate_max_iterations(max_iterations: u32) -> Result<(), ValidationError> {
    if max_iterations == 0 {
        return Err(ValidationError::ZeroIterations);
    }
    Ok(())
}
