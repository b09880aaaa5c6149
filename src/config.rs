//! Run configuration loaded from a JSON file.
//!
//! The config names the files to track, where the diagnostic log goes, and
//! where snapshot records are stored. The key names are shared with other
//! tooling that reads the same file, so they are fixed.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Errors that may occur while loading the run configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Config file content was not JSON of the expected shape.
    #[error("Invalid config at {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// JSON parse error.
        source: serde_json::Error,
    },
}

/// Configuration for one snapshot run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Paths to track, in the order they are fingerprinted.
    pub files: Vec<String>,
    /// Path of the diagnostic log file.
    pub log_file: PathBuf,
    /// Directory holding the snapshot records.
    pub records_folder: PathBuf,
}

/// Load and parse the configuration at `path`.
///
/// A `files` value that is not a list fails parsing; unknown keys are
/// ignored.
pub fn load(path: &Path) -> Result<RunConfig, ConfigError> {
    let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
