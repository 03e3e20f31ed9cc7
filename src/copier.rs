// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Copy-verify engine.
//!
//! Moves one file from the pristine directory into the working directory with
//! end-to-end integrity verification.
//!
//! # Attempt Loop
//!
//! ```text
//! filter ─✗→ NotApplicable
//!   │
//! final name exists? ─✓→ Conflict
//!   │
//!   ▼
//! ┌─────────────── attempt k (0-based, k < max_attempts) ───────────────┐
//! │ copy src → dest/<name>.tmp                                          │
//! │ digest(src) == digest(dest/<name>.tmp) ?                            │
//! │   ✓ → commit (hard link, no clobber) → Replicated                   │
//! │   ✗ → remove .tmp, sleep retry_delay (shutdown aborts) → k+1        │
//! └─────────────────────────────────────────────────────────────────────┘
//!   │
//!   ▼
//! Exhausted
//! ```
//!
//! The final name only ever appears via the commit step, so a reader of the
//! working directory never sees a partially written or unverified file. A
//! crash before the commit leaves at most a staging file, which
//! [`CopyVerifier::sweep_staging`] removes on the next attach.

use crate::config::CopyConfig;
use crate::digest::{ContentDigest, FileTransfer, LocalTransfer};
use crate::error::{ReplicationError, Result};
use crate::filter::FileFilter;
use crate::metrics;
use crate::monitored_dir::file_name;
use crate::resilience::{Bulkhead, RetryConfig};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// Result of a single copy+verify attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    ChecksumMismatch {
        expected: ContentDigest,
        actual: ContentDigest,
    },
    IoError {
        kind: io::ErrorKind,
        message: String,
    },
    /// The copy or digest was interrupted before it completed.
    Interrupted,
}

impl AttemptOutcome {
    fn from_io(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::Interrupted {
            Self::Interrupted
        } else {
            Self::IoError {
                kind: e.kind(),
                message: e.to_string(),
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ChecksumMismatch { .. } => "checksum_mismatch",
            Self::IoError { .. } => "io_error",
            Self::Interrupted => "interrupted",
        }
    }
}

/// Diagnostic record of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyAttempt {
    /// 0-based attempt number.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

/// A verified file visible under its final name in the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicatedFile {
    pub path: PathBuf,
    pub bytes: u64,
    pub digest: ContentDigest,
    pub attempts: Vec<CopyAttempt>,
}

impl ReplicatedFile {
    pub fn name(&self) -> &str {
        file_name(&self.path)
    }
}

/// Terminal result of [`CopyVerifier::replicate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Replicated(ReplicatedFile),
    /// Rejected by the file filter.
    NotApplicable,
    /// The final name already exists in the working directory; left untouched.
    Conflict { path: PathBuf },
    /// Every attempt failed.
    Exhausted { attempts: Vec<CopyAttempt> },
    /// Shutdown was signalled before the file could be committed.
    Interrupted { attempts: Vec<CopyAttempt> },
}

impl CopyOutcome {
    /// Exhausted or interrupted. Skips and conflicts are not failures.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Exhausted { .. } | Self::Interrupted { .. })
    }

    pub fn attempt_count(&self) -> usize {
        match self {
            Self::Replicated(file) => file.attempts.len(),
            Self::Exhausted { attempts } | Self::Interrupted { attempts } => attempts.len(),
            Self::NotApplicable | Self::Conflict { .. } => 0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Replicated(_) => "replicated",
            Self::NotApplicable => "not_applicable",
            Self::Conflict { .. } => "conflict",
            Self::Exhausted { .. } => "exhausted",
            Self::Interrupted { .. } => "interrupted",
        }
    }
}

/// Staged, verified, no-clobber file replication.
///
/// Cheap to clone; clones share the transfer, filter and concurrency limit.
#[derive(Clone)]
pub struct CopyVerifier {
    filter: Arc<dyn FileFilter>,
    transfer: Arc<dyn FileTransfer>,
    retry: RetryConfig,
    staging_suffix: String,
    bulkhead: Arc<Bulkhead>,
    shutdown_rx: watch::Receiver<bool>,
}

impl CopyVerifier {
    pub fn new(
        config: &CopyConfig,
        filter: Arc<dyn FileFilter>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            filter,
            transfer: Arc::new(LocalTransfer),
            retry: config.retry_config(),
            staging_suffix: config.staging_suffix.clone(),
            bulkhead: Arc::new(Bulkhead::new(config.max_concurrent_copies)),
            shutdown_rx,
        }
    }

    /// Replace the byte copy / digest primitives.
    pub fn with_transfer(mut self, transfer: Arc<dyn FileTransfer>) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_filter(mut self, filter: Arc<dyn FileFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn bulkhead(&self) -> &Bulkhead {
        &self.bulkhead
    }

    pub fn staging_path(&self, dest_dir: &Path, name: &str) -> PathBuf {
        dest_dir.join(format!("{}{}", name, self.staging_suffix))
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Replicate `source` into `dest_dir` under the same file name.
    #[instrument(skip_all, fields(file = %file_name(source)))]
    pub async fn replicate(&self, source: &Path, dest_dir: &Path) -> CopyOutcome {
        let name = file_name(source).to_string();
        if !self.filter.accepts(&name) {
            debug!("Not eligible for replication");
            metrics::record_file_skipped("extension");
            return CopyOutcome::NotApplicable;
        }

        let final_path = dest_dir.join(&name);
        if matches!(tokio::fs::try_exists(&final_path).await, Ok(true)) {
            info!(dest = %final_path.display(), "Destination already exists, not overwriting");
            metrics::record_file_skipped("conflict");
            return CopyOutcome::Conflict { path: final_path };
        }

        let staging = self.staging_path(dest_dir, &name);
        let started = Instant::now();
        let mut attempts: Vec<CopyAttempt> = Vec::with_capacity(self.retry.max_attempts as usize);

        for attempt in 0..self.retry.max_attempts {
            if self.is_shutdown() {
                return self.interrupted(&staging, attempts).await;
            }

            let Some(permit) = self.bulkhead.acquire().await else {
                debug!("Copy slots closed");
                return self.interrupted(&staging, attempts).await;
            };

            let attempt_started = Instant::now();
            let result = self.run_attempt(source, &staging).await;
            let outcome = match &result {
                Ok(_) => AttemptOutcome::Success,
                Err(outcome) => outcome.clone(),
            };
            metrics::record_copy_attempt(outcome.label());
            attempts.push(CopyAttempt {
                attempt,
                outcome: outcome.clone(),
                elapsed: attempt_started.elapsed(),
            });

            match result {
                Ok((bytes, digest)) => {
                    drop(permit);
                    return self
                        .commit(&staging, final_path, bytes, digest, attempts, started)
                        .await;
                }
                Err(AttemptOutcome::ChecksumMismatch { expected, actual }) => {
                    warn!(attempt, %expected, %actual, "Checksum mismatch after copy");
                }
                Err(AttemptOutcome::IoError { message, .. }) if attempt == 0 => {
                    warn!(attempt, error = %message, "Copy failed");
                }
                Err(AttemptOutcome::IoError { message, .. }) => {
                    debug!(attempt, error = %message, "Copy failed again");
                }
                Err(AttemptOutcome::Interrupted) | Err(AttemptOutcome::Success) => {
                    debug!(attempt, "Copy attempt interrupted");
                }
            }
            drop(permit);

            if self.is_shutdown() {
                return self.interrupted(&staging, attempts).await;
            }

            if let Some(delay) = self.retry.delay_after(attempt) {
                if self.pause(delay).await {
                    return self.interrupted(&staging, attempts).await;
                }
            }
        }

        error!(
            attempts = attempts.len(),
            source = %source.display(),
            "Giving up on file after exhausting all attempts"
        );
        metrics::record_file_failed("exhausted");
        CopyOutcome::Exhausted { attempts }
    }

    /// One copy + digest comparison. Removes the staging file on failure.
    async fn run_attempt(
        &self,
        source: &Path,
        staging: &Path,
    ) -> std::result::Result<(u64, ContentDigest), AttemptOutcome> {
        let transfer = Arc::clone(&self.transfer);
        let source = source.to_path_buf();
        let staging = staging.to_path_buf();

        let joined = tokio::task::spawn_blocking(move || {
            let result = copy_and_verify(transfer.as_ref(), &source, &staging);
            if result.is_err() {
                remove_if_present(&staging);
            }
            result
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(AttemptOutcome::Interrupted),
            Err(e) => Err(AttemptOutcome::IoError {
                kind: io::ErrorKind::Other,
                message: format!("copy task failed: {}", e),
            }),
        }
    }

    async fn commit(
        &self,
        staging: &Path,
        final_path: PathBuf,
        bytes: u64,
        digest: ContentDigest,
        attempts: Vec<CopyAttempt>,
        started: Instant,
    ) -> CopyOutcome {
        let staging_owned = staging.to_path_buf();
        let target = final_path.clone();
        let joined =
            tokio::task::spawn_blocking(move || publish_no_clobber(&staging_owned, &target)).await;

        let committed = match joined {
            Ok(result) => result,
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
        };

        match committed {
            Ok(()) => {
                info!(
                    dest = %final_path.display(),
                    bytes,
                    attempts = attempts.len(),
                    digest = %digest,
                    "Replicated"
                );
                metrics::record_file_replicated(bytes, started.elapsed());
                CopyOutcome::Replicated(ReplicatedFile {
                    path: final_path,
                    bytes,
                    digest,
                    attempts,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                self.discard(staging).await;
                info!(dest = %final_path.display(), "Destination appeared during copy, not overwriting");
                metrics::record_file_skipped("conflict");
                CopyOutcome::Conflict { path: final_path }
            }
            Err(e) => {
                self.discard(staging).await;
                error!(dest = %final_path.display(), error = %e, "Failed to commit verified copy");
                metrics::record_file_failed("commit");
                CopyOutcome::Exhausted { attempts }
            }
        }
    }

    async fn interrupted(&self, staging: &Path, attempts: Vec<CopyAttempt>) -> CopyOutcome {
        self.discard(staging).await;
        info!(attempts = attempts.len(), "Replication interrupted by shutdown");
        metrics::record_file_failed("interrupted");
        CopyOutcome::Interrupted { attempts }
    }

    async fn discard(&self, staging: &Path) {
        let staging = staging.to_path_buf();
        let _ = tokio::task::spawn_blocking(move || remove_if_present(&staging)).await;
    }

    /// Sleep before the next attempt. Returns `true` if shutdown cut it short.
    async fn pause(&self, delay: Duration) -> bool {
        let mut shutdown_rx = self.shutdown_rx.clone();
        if *shutdown_rx.borrow() {
            return true;
        }
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                changed = shutdown_rx.changed() => match changed {
                    Ok(()) if *shutdown_rx.borrow() => return true,
                    Ok(()) => continue,
                    Err(_) => {
                        // Sender gone: nobody can signal shutdown any more.
                        (&mut sleep).await;
                        return false;
                    }
                },
            }
        }
    }

    /// Remove staging files left behind by a crash. Returns how many were removed.
    pub async fn sweep_staging(&self, dest_dir: &Path) -> Result<usize> {
        let dir = dest_dir.to_path_buf();
        let suffix = self.staging_suffix.clone();

        let removed = tokio::task::spawn_blocking(move || -> Result<usize> {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
                Err(e) => return Err(ReplicationError::io("read_dir", &dir, e)),
            };

            let mut removed = 0;
            for entry in entries {
                let entry = entry.map_err(|e| ReplicationError::io("read_dir", &dir, e))?;
                let path = entry.path();
                let name = file_name(&path);
                if name.len() <= suffix.len() || !name.ends_with(&suffix) {
                    continue;
                }
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        debug!(path = %path.display(), "Removed leftover staging file");
                        removed += 1;
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "Could not remove staging file"),
                }
            }
            Ok(removed)
        })
        .await
        .map_err(|e| ReplicationError::Internal(format!("staging sweep task failed: {}", e)))??;

        if removed > 0 {
            info!(removed, dest = %dest_dir.display(), "Swept leftover staging files");
            metrics::record_staging_swept(removed);
        }
        Ok(removed)
    }
}

fn copy_and_verify(
    transfer: &dyn FileTransfer,
    source: &Path,
    staging: &Path,
) -> std::result::Result<(u64, ContentDigest), AttemptOutcome> {
    let bytes = transfer.copy(source, staging).map_err(AttemptOutcome::from_io)?;
    let expected = transfer.digest(source).map_err(AttemptOutcome::from_io)?;
    let actual = transfer.digest(staging).map_err(AttemptOutcome::from_io)?;
    if expected != actual {
        return Err(AttemptOutcome::ChecksumMismatch { expected, actual });
    }
    Ok((bytes, expected))
}

/// Make `staging` visible as `target` without replacing an existing file.
///
/// Fails with `AlreadyExists` if `target` exists; `staging` is left in place
/// in that case.
fn publish_no_clobber(staging: &Path, target: &Path) -> io::Result<()> {
    match std::fs::hard_link(staging, target) {
        Ok(()) => {
            if let Err(e) = std::fs::remove_file(staging) {
                warn!(path = %staging.display(), error = %e, "Committed, but staging link not removed");
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(e) => {
            // No hard links on this filesystem: rename after a fresh existence check.
            debug!(error = %e, "hard_link unavailable, falling back to rename");
            if target.symlink_metadata().is_ok() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", target.display()),
                ));
            }
            std::fs::rename(staging, target)
        }
    }
}

fn remove_if_present(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove staging file"),
    }
}
