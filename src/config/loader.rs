//! Configuration file loader.

use std::path::{Path, PathBuf};

use super::LoopConfig;

/// File name looked up in the current directory.
pub const LOCAL_CONFIG_FILE: &str = ".ralph-supervisor.toml";

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
    /// An explicitly requested file must exist.
    explicit: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths, looking for the
    /// local file in the process's current directory.
    #[must_use]
    pub fn new() -> Self {
        Self::for_working_dir(Path::new(""))
    }

    /// Create a config loader whose local file lives in `working_dir`, the
    /// directory the agent runs in.
    #[must_use]
    pub fn for_working_dir(working_dir: &Path) -> Self {
        let mut search_paths = Vec::new();

        // 1. Working directory: .ralph-supervisor.toml
        search_paths.push(working_dir.join(LOCAL_CONFIG_FILE));

        // 2. User config directory: ~/.config/ralph-supervisor/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("ralph-supervisor").join("config.toml"));
        }

        Self {
            search_paths,
            explicit: false,
        }
    }

    /// Create a config loader for a file given on the command line.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
            explicit: true,
        }
    }

    /// Load configuration from the first available file, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed,
    /// or if an explicitly requested file is missing.
    pub fn load(&self) -> Result<LoopConfig, ConfigError> {
        if let Some(path) = self.find_config_file() {
            tracing::debug!(path = %path.display(), "Loading config file");
            return Self::load_from_path(&path);
        }

        if self.explicit {
            if let Some(path) = self.search_paths.first() {
                return Err(ConfigError::NotFound { path: path.clone() });
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(LoopConfig::default())
    }

    /// Load configuration from a specific path.
    fn load_from_path(path: &Path) -> Result<LoopConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find the first config file that exists.
    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|p| p.is_file()).cloned()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}
