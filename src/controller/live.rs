// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Live batch processing and the listener loop.
//!
//! Per batch:
//! 1. Partition with the staleness floor (`watermark - window`).
//! 2. Send look-ahead hints for the names expected after the newest arrival.
//! 3. Replicate new and modified files, waiting for all of them.
//! 4. Send the final names of the replicated new files.
//! 5. Advance the watermark to the batch's high-water time.
//!
//! Hints are advisory. Nothing the hint sink does or fails to do changes which
//! files are replicated.

use super::{Inner, ReplicationController};
use crate::batch::{replicate_all, BatchKind, BatchPlan, BatchResult};
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::monitored_dir::{ChangeBatch, HintSink, MonitoredDir};
use crate::naming::lookahead;
use crate::watermark::WatermarkStore;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

impl<D: MonitoredDir, W: WatermarkStore, H: HintSink> ReplicationController<D, W, H> {
    pub(super) async fn process_batch(&self, inner: &mut Inner, batch: ChangeBatch) -> Result<BatchResult> {
        let floor = match (inner.watermark, self.config.settings.staleness.window_duration()) {
            (Some(watermark), Some(window)) => Some(watermark.saturating_sub(window)),
            _ => None,
        };
        let plan = BatchPlan::from_batch(&batch, floor);
        debug!(
            added = plan.added.len(),
            modified = plan.modified.len(),
            stale = plan.stale.len(),
            deleted = plan.deleted_ignored,
            "Batch received"
        );

        let hints = &self.config.settings.hints;
        if hints.enabled {
            let expected = lookahead(self.names.as_ref(), plan.added_names(), hints.lookahead);
            self.send_hint("lookahead", &expected);
        }

        let result = replicate_all(&self.verifier, plan, &self.config.dest_dir, BatchKind::Live).await;

        if hints.enabled {
            self.send_hint("replicated", &result.replicated_added);
        }

        match batch.high_water {
            Some(high_water) => self.advance(inner, high_water, &result).await?,
            None => warn!("Batch carried no high-water time, watermark unchanged"),
        }
        Ok(result)
    }

    fn send_hint(&self, kind: &'static str, names: &[String]) {
        if names.is_empty() {
            return;
        }
        debug!(kind, names = ?names, "Hinting destination watcher");
        self.hints.expect_updates(names);
        metrics::record_hints(kind, names.len());
    }

    /// Process batches from `rx` until the channel closes or the controller
    /// is detached.
    ///
    /// Errors from individual batches (such as a failed watermark write) are
    /// logged and the loop continues. Returns `InvalidState` if called before
    /// [`attach()`](Self::attach).
    pub async fn run(&self, mut rx: mpsc::Receiver<ChangeBatch>) -> Result<()> {
        let mut shutdown_rx = self.shutdown_rx.clone();
        if *shutdown_rx.borrow() {
            return Err(ReplicationError::Shutdown);
        }
        info!(pipeline = %self.config.pipeline_id, "Listening for change batches");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!("Listener stopping on shutdown");
                        break;
                    }
                }

                maybe_batch = rx.recv() => {
                    let Some(batch) = maybe_batch else {
                        info!("Change batch channel closed");
                        break;
                    };
                    match self.on_change_batch(batch).await {
                        Ok(_) => {}
                        Err(ReplicationError::Shutdown) => break,
                        Err(e @ ReplicationError::InvalidState { .. }) => return Err(e),
                        Err(e) if e.is_retryable() => {
                            warn!(error = %e, "Batch processing failed, continuing");
                        }
                        Err(e) => {
                            error!(error = %e, "Batch processing failed");
                        }
                    }
                }
            }
        }

        info!(pipeline = %self.config.pipeline_id, "Listener stopped");
        Ok(())
    }
}
