// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Monitored directory integration traits.
//!
//! The replicator never polls the filesystem itself. A directory watcher owned
//! by the embedding application implements [`MonitoredDir`] for the pristine
//! source directory and delivers [`ChangeBatch`] values in time order. The
//! watcher of the working (destination) directory receives look-ahead hints
//! through [`HintSink`].
//!
//! # Example
//!
//! ```rust,no_run
//! use file_replicator::monitored_dir::{BoxFuture, MonitoredDir, WatchedFile};
//! use file_replicator::Timestamp;
//!
//! struct Snapshot { files: Vec<WatchedFile> }
//!
//! impl MonitoredDir for Snapshot {
//!     fn high_water(&self) -> BoxFuture<'_, Option<Timestamp>> {
//!         Box::pin(async move { Ok(self.files.iter().map(|f| f.modified).max()) })
//!     }
//!
//!     fn modified_between(&self, after: Timestamp, up_to: Timestamp) -> BoxFuture<'_, Vec<WatchedFile>> {
//!         Box::pin(async move {
//!             Ok(self.files.iter()
//!                 .filter(|f| f.modified > after && f.modified <= up_to)
//!                 .cloned()
//!                 .collect())
//!         })
//!     }
//! }
//! ```

use crate::error::Result;
use crate::timestamp::Timestamp;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A file as reported by the directory watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedFile {
    pub path: PathBuf,
    pub modified: Timestamp,
}

impl WatchedFile {
    pub fn new(path: impl Into<PathBuf>, modified: Timestamp) -> Self {
        Self {
            path: path.into(),
            modified,
        }
    }

    /// Final path component as UTF-8, or an empty string if there is none.
    pub fn name(&self) -> &str {
        file_name(&self.path)
    }
}

pub(crate) fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// One scan's worth of changes in the watched directory.
#[derive(Debug, Clone, Default)]
pub struct ChangeBatch {
    /// Latest modification time in the directory when the batch was produced.
    pub high_water: Option<Timestamp>,
    pub added: Vec<WatchedFile>,
    pub modified: Vec<WatchedFile>,
    /// Part of the watcher contract; replication ignores deletions.
    pub deleted: Vec<WatchedFile>,
}

impl ChangeBatch {
    pub fn new(high_water: Timestamp) -> Self {
        Self {
            high_water: Some(high_water),
            ..Default::default()
        }
    }

    pub fn with_added(mut self, file: WatchedFile) -> Self {
        self.added.push(file);
        self
    }

    pub fn with_modified(mut self, file: WatchedFile) -> Self {
        self.modified.push(file);
        self
    }

    pub fn with_deleted(mut self, file: WatchedFile) -> Self {
        self.deleted.push(file);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// What the replicator needs from the watcher of the source directory.
pub trait MonitoredDir: Send + Sync + 'static {
    /// Latest modification time seen in the directory.
    ///
    /// `None` if the watcher has not completed its first scan.
    fn high_water(&self) -> BoxFuture<'_, Option<Timestamp>>;

    /// Files touched in the half-open interval `(after, up_to]`.
    fn modified_between(&self, after: Timestamp, up_to: Timestamp) -> BoxFuture<'_, Vec<WatchedFile>>;
}

/// Best-effort "expect these names soon" notifications to a directory watcher.
///
/// Implementations must not block and must tolerate wrong or stale names.
pub trait HintSink: Send + Sync + 'static {
    fn expect_updates(&self, names: &[String]);
}

/// Hint sink used when the destination watcher is absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHintSink;

impl HintSink for NoOpHintSink {
    fn expect_updates(&self, _names: &[String]) {}
}
