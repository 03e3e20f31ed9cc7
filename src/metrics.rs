// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Copy attempts and per-file outcomes
//! - Bytes replicated and copy duration
//! - Batch processing
//! - Watermark value and store contention
//! - Look-ahead hints
//! - Controller state
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `file_replication_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! # Usage
//!
//! ```rust,no_run
//! use file_replicator::metrics;
//! use std::time::Duration;
//!
//! // After a verified copy is committed
//! metrics::record_file_replicated(2_880_000, Duration::from_millis(350));
//!
//! // After a batch completes
//! metrics::record_batch("live", 12, 0, Duration::from_millis(900));
//! ```

use crate::controller::ControllerState;
use crate::timestamp::Timestamp;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record one copy+verify attempt by outcome
/// (`success`, `checksum_mismatch`, `io_error`, `interrupted`).
pub fn record_copy_attempt(outcome: &str) {
    counter!("file_replication_copy_attempts_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a file committed under its final name.
pub fn record_file_replicated(bytes: u64, duration: Duration) {
    counter!("file_replication_files_replicated_total").increment(1);
    counter!("file_replication_bytes_total").increment(bytes);
    histogram!("file_replication_copy_duration_seconds").record(duration.as_secs_f64());
}

/// Record a file skipped without copying (`extension`, `conflict`, `stale`).
pub fn record_file_skipped(reason: &str) {
    counter!("file_replication_files_skipped_total", "reason" => reason.to_string()).increment(1);
}

/// Record a file abandoned (`exhausted`, `interrupted`, `commit`).
pub fn record_file_failed(reason: &str) {
    counter!("file_replication_files_failed_total", "reason" => reason.to_string()).increment(1);
}

/// Record staging files removed at attach.
pub fn record_staging_swept(count: usize) {
    counter!("file_replication_staging_swept_total").increment(count as u64);
}

/// Record a processed batch (`live` or `catch_up`).
pub fn record_batch(kind: &str, files: usize, failures: usize, duration: Duration) {
    counter!("file_replication_batches_total", "kind" => kind.to_string()).increment(1);
    counter!("file_replication_batch_files_total", "kind" => kind.to_string()).increment(files as u64);
    if failures > 0 {
        counter!("file_replication_batch_failures_total", "kind" => kind.to_string())
            .increment(failures as u64);
    }
    histogram!("file_replication_batch_duration_seconds", "kind" => kind.to_string())
        .record(duration.as_secs_f64());
}

/// Record hint names sent to the destination watcher (`lookahead` or `replicated`).
pub fn record_hints(kind: &str, names: usize) {
    counter!("file_replication_hints_total", "kind" => kind.to_string()).increment(names as u64);
}

/// Gauge for the persisted watermark (milliseconds since the epoch).
pub fn set_watermark(pipeline_id: &str, watermark: Timestamp) {
    gauge!("file_replication_watermark_ms", "pipeline" => pipeline_id.to_string())
        .set(watermark.as_millis() as f64);
}

/// Record a batch whose watermark advance was withheld by policy.
pub fn record_watermark_held(pipeline_id: &str) {
    counter!("file_replication_watermark_held_total", "pipeline" => pipeline_id.to_string()).increment(1);
}

/// Record watermark SQLite retry (for SQLITE_BUSY/SQLITE_LOCKED).
pub fn record_watermark_store_retry(operation: &str) {
    counter!("file_replication_watermark_store_retries_total", "operation" => operation.to_string())
        .increment(1);
}

/// Gauge for controller state.
pub fn set_controller_state(pipeline_id: &str, state: ControllerState) {
    gauge!("file_replication_controller_state", "pipeline" => pipeline_id.to_string())
        .set(state.gauge_value());
}
