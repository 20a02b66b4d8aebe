//! Error types for Strata
//!
//! All modules use `StrataResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Strata operations
pub type StrataResult<T> = Result<T, StrataError>;

/// All errors that can occur in Strata
#[derive(Error, Debug)]
pub enum StrataError {
    // Cache key errors
    #[error("Could not detect source revision for {package}: {reason}")]
    RevisionNotDetected { package: String, reason: String },

    #[error("Could not parse toolchain version from output: {output}")]
    ToolchainVersionNotDetected { output: String },

    #[error("Toolchain unavailable: {0}")]
    ToolchainUnavailable(String),

    // Build errors
    #[error("Build failed for {target}: {reason}")]
    Build { target: String, reason: String },

    // Storage errors
    #[error("Storage '{storage}' failed: {reason}")]
    Storage { storage: String, reason: String },

    #[error("Incomplete fetch from '{storage}' for entry {entry}")]
    FetchIncomplete { storage: String, entry: String },

    #[error("Storage '{0}' does not serve fetches")]
    StorageNotReadable(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid cache policy: {0}")]
    PolicyInvalid(String),

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StrataError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a storage error
    pub fn storage(storage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Storage {
            storage: storage.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is fatal for the target it occurred on.
    ///
    /// Fatal-per-target errors (missing pin, undetectable toolchain, build
    /// failure) surface to the caller attached to that target. Everything
    /// else during restore, write-back, or backfill is soft: logged and
    /// treated as "that storage has no usable cache for that entry".
    pub fn is_fatal_for_target(&self) -> bool {
        matches!(
            self,
            Self::RevisionNotDetected { .. }
                | Self::ToolchainVersionNotDetected { .. }
                | Self::ToolchainUnavailable(_)
                | Self::Build { .. }
        )
    }
}
