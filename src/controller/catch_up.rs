// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Attach-time catch-up.
//!
//! Replicates every file touched in `(persisted watermark, high water]`, then
//! raises the watermark to the high-water time. Files at or before the
//! persisted watermark were already considered by a previous run.
//!
//! Only reading the watermark or querying the directory can fail the attach;
//! per-file failures are logged and counted in the returned [`BatchResult`].

use super::{Inner, ReplicationController};
use crate::batch::{replicate_all, BatchKind, BatchPlan, BatchResult};
use crate::error::Result;
use crate::monitored_dir::{HintSink, MonitoredDir};
use crate::watermark::WatermarkStore;
use tracing::{debug, info, warn};

impl<D: MonitoredDir, W: WatermarkStore, H: HintSink> ReplicationController<D, W, H> {
    pub(super) async fn catch_up(&self, inner: &mut Inner) -> Result<BatchResult> {
        let persisted = self.store.read().await?;
        inner.watermark = persisted;
        let high_water = self.source.high_water().await?;

        info!(
            watermark = ?persisted.map(|t| t.to_string()),
            high_water = ?high_water.map(|t| t.to_string()),
            "Attaching to monitored directory"
        );

        match self.verifier.sweep_staging(&self.config.dest_dir).await {
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not sweep staging files"),
        }

        let Some(high_water) = high_water else {
            debug!("Directory has no high-water time yet, nothing to catch up");
            return Ok(BatchResult::default());
        };

        let result = match persisted {
            Some(since) if since < high_water => {
                let files = self.source.modified_between(since, high_water).await?;
                info!(files = files.len(), "Catching up");
                replicate_all(
                    &self.verifier,
                    BatchPlan::catch_up(files),
                    &self.config.dest_dir,
                    BatchKind::CatchUp,
                )
                .await
            }
            Some(_) => {
                debug!("Watermark is current, nothing to catch up");
                BatchResult::default()
            }
            None => {
                info!("No persisted watermark, starting from the current high-water time");
                BatchResult::default()
            }
        };

        self.advance(inner, high_water, &result).await?;
        Ok(result)
    }
}
