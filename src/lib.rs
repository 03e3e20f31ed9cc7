// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # File Replicator
//!
//! Watermark-driven, checksum-verified replication of files from a watched
//! "pristine" directory into a "working" directory.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                             file-replicator                               │
//! │                                                                           │
//! │  ┌──────────────┐   ┌───────────────────────┐   ┌──────────────────────┐  │
//! │  │ MonitoredDir │──►│ ReplicationController │──►│ CopyVerifier         │  │
//! │  │ (pristine)   │   │ (catch-up + batches)  │   │ (.tmp → digest →     │  │
//! │  └──────────────┘   └───────────────────────┘   │  no-clobber commit)  │  │
//! │                        │               │        └──────────────────────┘  │
//! │                        ▼               ▼                                  │
//! │              ┌────────────────┐  ┌──────────────────────┐                 │
//! │              │ WatermarkStore │  │ HintSink (working    │                 │
//! │              │ (SQLite)       │  │ dir watcher)         │                 │
//! │              └────────────────┘  └──────────────────────┘                 │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - A file appears under its final name in the working directory only after
//!   its contents have been verified against the source.
//! - Existing destination files are never overwritten.
//! - The persisted watermark never decreases. Files touched after it are
//!   caught up on the next attach.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use file_replicator::{ChangeBatch, MonitoredDir, ReplicationConfig, ReplicationController};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! async fn run<D: MonitoredDir>(watcher: Arc<D>, batches: mpsc::Receiver<ChangeBatch>)
//!     -> file_replicator::Result<()>
//! {
//!     let config = ReplicationConfig {
//!         pipeline_id: "gn-dhs".into(),
//!         source_dir: "/data/pristine".into(),
//!         dest_dir: "/data/working".into(),
//!         ..Default::default()
//!     };
//!
//!     let controller = ReplicationController::open(config, watcher).await?;
//!     controller.attach().await?;
//!     controller.run(batches).await?;
//!     controller.detach().await
//! }
//! ```

pub mod batch;
pub mod config;
pub mod controller;
pub mod copier;
pub mod digest;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod monitored_dir;
pub mod naming;
pub mod resilience;
pub mod timestamp;
pub mod watermark;

// Re-exports for convenience
pub use batch::{BatchPlan, BatchResult};
pub use config::{ReplicationConfig, ReplicationSettings, WatermarkPolicy};
pub use controller::{ControllerState, ReplicationController};
pub use copier::{AttemptOutcome, CopyAttempt, CopyOutcome, CopyVerifier, ReplicatedFile};
pub use digest::{ContentDigest, FileTransfer, LocalTransfer};
pub use error::{ReplicationError, Result};
pub use filter::{ExtensionFilter, FileFilter};
pub use monitored_dir::{ChangeBatch, HintSink, MonitoredDir, NoOpHintSink, WatchedFile};
pub use naming::{DatasetNameSequence, NameSequence};
pub use timestamp::Timestamp;
pub use watermark::{MemoryWatermarkStore, SqliteWatermarkStore, WatermarkStore};
