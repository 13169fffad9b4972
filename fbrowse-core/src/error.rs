//! src/error.rs
//! ============================================================================
//! # `AppError`: Unified Error Type for the Browser Core
//!
//! Every fallible operation in the listing engine, the search walk and the
//! configuration layer reports through this enum. Variants are grouped by
//! how a consumer is expected to react: rejected start requests, invalid
//! paths (shown to the user in place of a listing), traversal failures
//! (shown once), and internal invariant violations (logged only).

use std::{io, path::PathBuf};
use thiserror::Error;

/// Convenient alias carrying the unified error type.
pub type AppResult<T> = Result<T, AppError>;

/// Unified error type for all browser core operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// Another task of the same kind is already active on this worker.
    #[error("{task} already in progress")]
    AlreadyRunning { task: &'static str },

    /// Search requested with an empty root directory or search term.
    #[error("Bad search parameters")]
    BadSearchParameters,

    /// Worker asked to read an empty directory path. Indicates a caller bug.
    #[error("Internal worker error: empty directory name")]
    EmptyDirectory,

    /// Requested directory does not exist.
    #[error("Folder does not exist: {0:?}")]
    NotFound(PathBuf),

    /// Directory exists but cannot be read.
    #[error("No permission to read the folder: {0:?}")]
    PermissionDenied(PathBuf),

    /// Unexpected failure during a recursive walk.
    #[error("Search failed in {directory:?}: {reason}")]
    Traversal { directory: PathBuf, reason: String },

    /// Standard IO error, auto-converted from `io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TOML config parsing error.
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// Config or settings file I/O error with path.
    #[error("Failed to access config file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Filesystem watch setup failure.
    #[error("Watch error: {0}")]
    Watch(String),

    /// Any other error, with description.
    #[error("Unexpected error: {0}")]
    Other(String),
}

impl AppError {
    /// Create a traversal error for the directory where the walk failed.
    pub fn traversal<P: Into<PathBuf>, S: Into<String>>(directory: P, reason: S) -> Self {
        Self::Traversal {
            directory: directory.into(),
            reason: reason.into(),
        }
    }

    /// Create a config I/O error.
    pub fn config_io<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        Self::ConfigIo {
            path: path.into(),
            source,
        }
    }

    /// True for errors that indicate a programming mistake rather than a
    /// condition a user can act on.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::EmptyDirectory)
    }

    /// Display string suitable for showing in place of a listing.
    ///
    /// Internal errors yield an empty string: they are logged, not shown.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(_) => "Folder does not exist".to_string(),
            Self::PermissionDenied(_) => "No permission to read the folder".to_string(),
            Self::Traversal { reason, .. } => reason.clone(),
            Self::EmptyDirectory => String::new(),
            other => other.to_string(),
        }
    }
}

// Manual Clone implementation to handle non-Clone fields
impl Clone for AppError {
    fn clone(&self) -> Self {
        match self {
            Self::AlreadyRunning { task } => Self::AlreadyRunning { task },
            Self::BadSearchParameters => Self::BadSearchParameters,
            Self::EmptyDirectory => Self::EmptyDirectory,
            Self::NotFound(path) => Self::NotFound(path.clone()),
            Self::PermissionDenied(path) => Self::PermissionDenied(path.clone()),
            Self::Traversal { directory, reason } => Self::Traversal {
                directory: directory.clone(),
                reason: reason.clone(),
            },
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
            Self::Config(e) => Self::Other(format!("Config error: {e}")),
            Self::ConfigIo { path, source } => Self::ConfigIo {
                path: path.clone(),
                source: io::Error::new(source.kind(), source.to_string()),
            },
            Self::Watch(msg) => Self::Watch(msg.clone()),
            Self::Other(msg) => Self::Other(msg.clone()),
        }
    }
}

impl From<notify::Error> for AppError {
    fn from(e: notify::Error) -> Self {
        Self::Watch(e.to_string())
    }
}
