// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batch planning and concurrent replication.
//!
//! A [`ChangeBatch`] from the watcher (or the file list of a catch-up query)
//! becomes a [`BatchPlan`]; the plan is replicated with a bounded fan-out and
//! summarized in a [`BatchResult`].
//!
//! # Design
//!
//! ```text
//! ChangeBatch ──┬── added ──── mtime < floor? ──✓──▶ stale (skipped)
//!               │                    │✗
//!               │                    ▼
//!               ├── modified ──▶ to replicate ──▶ JoinSet (bulkhead-limited)
//!               │                                        │
//!               └── deleted ───▶ ignored                 ▼
//!                                               join barrier ──▶ BatchResult
//! ```
//!
//! The caller advances the watermark only after [`replicate_all`] returns, so
//! every copy in the batch has been attempted before the watermark moves.

use crate::copier::{CopyOutcome, CopyVerifier, ReplicatedFile};
use crate::metrics;
use crate::monitored_dir::{ChangeBatch, WatchedFile};
use crate::timestamp::Timestamp;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Where a planned file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOrigin {
    Added,
    Modified,
    CatchUp,
}

/// Which kind of pass produced a batch (for logs and metrics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    CatchUp,
    Live,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::CatchUp => "catch_up",
            BatchKind::Live => "live",
        }
    }
}

/// Files of one batch, partitioned.
#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    /// Non-stale new files.
    pub added: Vec<WatchedFile>,
    pub modified: Vec<WatchedFile>,
    /// Catch-up query results (no added/modified distinction).
    pub catch_up: Vec<WatchedFile>,
    /// New files older than the staleness floor.
    pub stale: Vec<WatchedFile>,
    pub deleted_ignored: usize,
}

impl BatchPlan {
    /// Partition a live batch. `floor` is `watermark - staleness window`.
    pub fn from_batch(batch: &ChangeBatch, floor: Option<Timestamp>) -> Self {
        let mut plan = BatchPlan {
            modified: batch.modified.clone(),
            deleted_ignored: batch.deleted.len(),
            ..Default::default()
        };

        for file in &batch.added {
            match floor {
                Some(floor) if file.modified < floor => {
                    debug!(
                        file = %file.name(),
                        modified = %file.modified,
                        floor = %floor,
                        "Skipping stale new file"
                    );
                    plan.stale.push(file.clone());
                }
                _ => plan.added.push(file.clone()),
            }
        }
        plan
    }

    /// Plan for the files returned by a catch-up query.
    pub fn catch_up(files: Vec<WatchedFile>) -> Self {
        BatchPlan {
            catch_up: files,
            ..Default::default()
        }
    }

    /// Names of the non-stale new files.
    pub fn added_names(&self) -> impl Iterator<Item = &str> {
        self.added.iter().map(|f| f.name())
    }

    /// Number of files that will be handed to the copier.
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.catch_up.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn into_work(self) -> Vec<(FileOrigin, WatchedFile)> {
        let added = self.added.into_iter().map(|f| (FileOrigin::Added, f));
        let modified = self.modified.into_iter().map(|f| (FileOrigin::Modified, f));
        let catch_up = self.catch_up.into_iter().map(|f| (FileOrigin::CatchUp, f));
        added.chain(modified).chain(catch_up).collect()
    }
}

/// Summary of one processed batch.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub replicated: Vec<ReplicatedFile>,
    /// Final names of replicated files that arrived as new files.
    pub replicated_added: Vec<String>,
    pub not_applicable: usize,
    pub conflicts: Vec<PathBuf>,
    pub stale: usize,
    pub deleted_ignored: usize,
    /// Sources that exhausted their attempts.
    pub failed: Vec<PathBuf>,
    /// Sources abandoned because of shutdown.
    pub interrupted: Vec<PathBuf>,
    /// Copy tasks that panicked.
    pub task_errors: usize,
}

impl BatchResult {
    /// No file ended exhausted or interrupted.
    pub fn is_full_success(&self) -> bool {
        self.failed.is_empty() && self.interrupted.is_empty() && self.task_errors == 0
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len() + self.interrupted.len() + self.task_errors
    }

    fn record(&mut self, origin: FileOrigin, source: PathBuf, outcome: CopyOutcome) {
        match outcome {
            CopyOutcome::Replicated(file) => {
                if origin == FileOrigin::Added {
                    self.replicated_added.push(file.name().to_string());
                }
                self.replicated.push(file);
            }
            CopyOutcome::NotApplicable => self.not_applicable += 1,
            CopyOutcome::Conflict { path } => self.conflicts.push(path),
            CopyOutcome::Exhausted { .. } => self.failed.push(source),
            CopyOutcome::Interrupted { .. } => self.interrupted.push(source),
        }
    }
}

/// Replicate every file in `plan` into `dest_dir` and wait for all of them.
///
/// Concurrency is bounded by the verifier's bulkhead. Per-file failures are
/// collected, never propagated.
pub async fn replicate_all(
    verifier: &CopyVerifier,
    plan: BatchPlan,
    dest_dir: &Path,
    kind: BatchKind,
) -> BatchResult {
    let started = Instant::now();
    let mut result = BatchResult {
        stale: plan.stale.len(),
        deleted_ignored: plan.deleted_ignored,
        ..Default::default()
    };

    let work = plan.into_work();
    let total = work.len();
    let mut join_set: JoinSet<(FileOrigin, PathBuf, CopyOutcome)> = JoinSet::new();

    for (origin, file) in work {
        let verifier = verifier.clone();
        let dest_dir = dest_dir.to_path_buf();

        join_set.spawn(async move {
            let outcome = verifier.replicate(&file.path, &dest_dir).await;
            (origin, file.path, outcome)
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((origin, source, outcome)) => result.record(origin, source, outcome),
            Err(e) => {
                warn!(error = %e, "Copy task failed (JoinError)");
                result.task_errors += 1;
            }
        }
    }

    let duration = started.elapsed();
    metrics::record_batch(kind.as_str(), total, result.failure_count(), duration);

    info!(
        kind = kind.as_str(),
        total,
        replicated = result.replicated.len(),
        not_applicable = result.not_applicable,
        conflicts = result.conflicts.len(),
        stale = result.stale,
        failed = result.failed.len(),
        interrupted = result.interrupted.len(),
        duration_ms = duration.as_millis() as u64,
        "Batch processed"
    );

    result
}
