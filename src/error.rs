// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the file replicator.
//!
//! Only failures that stop the pipeline surface as [`ReplicationError`].
//! Per-file results (skips, conflicts, exhausted retries) are values of
//! [`CopyOutcome`](crate::copier::CopyOutcome) and never abort a batch.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Io` | Yes | Local filesystem error outside the copy loop |
//! | `Directory` | Yes | Monitored directory could not be queried |
//! | `WatermarkStore` | No | SQLite errors (needs operator attention) |
//! | `Config` | No | Configuration invalid |
//! | `InvalidState` | No | Controller state machine violation |
//! | `Shutdown` | No | Controller is detached |
//! | `Internal` | No | Unexpected internal error |

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur while attaching or running the replicator.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Filesystem error with the operation and path that caused it.
    #[error("I/O error ({operation} {}): {source}", path.display())]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The monitored directory could not answer a query.
    ///
    /// Fatal during attach; the watcher may recover on its own.
    #[error("Monitored directory error ({operation}): {message}")]
    Directory { operation: String, message: String },

    /// SQLite error while reading or writing the watermark.
    #[error("Watermark store error: {0}")]
    WatermarkStore(#[from] sqlx::Error),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation attempted in the wrong controller state
    /// (e.g. a batch delivered before `attach()`).
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// The controller has been detached and accepts no further work.
    #[error("Shutdown in progress")]
    Shutdown,

    /// Catch-all for errors that shouldn't happen.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    /// Create an I/O error tagged with the operation and path.
    pub fn io(operation: impl Into<String>, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a directory error.
    pub fn directory(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Directory {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io { .. } => true,
            Self::Directory { .. } => true,
            Self::WatermarkStore(_) => false,
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
            Self::Shutdown => false,
            Self::Internal(_) => false,
        }
    }
}
