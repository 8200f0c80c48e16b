//! Error handling for the quantification stage
//!
//! Every failure the stage can hit is one of these variants. None of them are
//! recovered locally: they propagate to `main`, which exits non-zero.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the stage
#[derive(Error, Debug)]
pub enum StageError {
    /// A manifest or description file is missing, unreadable or malformed
    #[error("Failed to load configuration from {}: {reason}", .path.display())]
    ConfigurationLoad { path: PathBuf, reason: String },

    /// One or more required local paths do not exist
    #[error("Missing required inputs: {}", .paths.join(", "))]
    MissingInput { paths: Vec<String> },

    /// A glob that must match one entry matched nothing
    #[error("No input matches pattern: {pattern}")]
    UnmatchedInput { pattern: String },

    /// A glob that must match one entry matched several
    #[error("Pattern {pattern} is ambiguous, {} candidates: {}", .matches.len(), display_paths(.matches))]
    AmbiguousInput { pattern: String, matches: Vec<PathBuf> },

    /// A mandatory pipeline-supplied key is absent from the manifest
    #[error("Missing required configuration key: {key}")]
    ConfigurationKey { key: String },

    /// A key is present but holds the wrong kind of value
    #[error("Configuration key {key} must be {expected}")]
    ConfigurationValue { key: String, expected: &'static str },

    /// An external command exited with a non-zero status
    #[error("Command `{command}` failed with exit code {exit_code}")]
    ExternalCommand { command: String, exit_code: i32 },

    /// The dataset path has no dataset folder segment
    #[error("Invalid dataset path '{path}': expected the dataset folder as the third '/'-separated segment")]
    InvalidDatasetPath { path: String },

    /// Programs needed by the stage are not on PATH
    #[error("Required programs not found: {}", .programs.join(", "))]
    MissingProgram { programs: Vec<String> },

    /// Stage settings are incomplete or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for stage operations
pub type Result<T> = std::result::Result<T, StageError>;

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl StageError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a `ConfigurationLoad` error for `path`
    pub fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ConfigurationLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn missing_key(key: impl Into<String>) -> Self {
        Self::ConfigurationKey { key: key.into() }
    }
}
