// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication controller.
//!
//! The orchestrator that ties together:
//! - The pristine directory's watcher via [`MonitoredDir`]
//! - Copy-verify-commit via [`CopyVerifier`]
//! - Watermark persistence via [`WatermarkStore`]
//! - Look-ahead hints to the working directory's watcher via [`HintSink`]
//!
//! # Lifecycle
//!
//! 1. [`attach()`](ReplicationController::attach): sweep leftover staging
//!    files, catch up on `(watermark, high water]`, advance the watermark
//! 2. [`on_change_batch()`](ReplicationController::on_change_batch) or
//!    [`run()`](ReplicationController::run): process live batches serially
//! 3. [`detach()`](ReplicationController::detach): interrupt retry sleeps,
//!    wait for the in-flight batch, close the watermark store
//!
//! Attach and batch processing hold the same lock, so a batch delivered while
//! catch-up is running waits for it to finish.

mod catch_up;
mod live;
mod types;

pub use types::ControllerState;

use crate::batch::BatchResult;
use crate::config::{ReplicationConfig, WatermarkPolicy};
use crate::copier::CopyVerifier;
use crate::digest::FileTransfer;
use crate::error::{ReplicationError, Result};
use crate::filter::FileFilter;
use crate::metrics;
use crate::monitored_dir::{ChangeBatch, HintSink, MonitoredDir, NoOpHintSink};
use crate::naming::{DatasetNameSequence, NameSequence};
use crate::timestamp::Timestamp;
use crate::watermark::{SqliteWatermarkStore, WatermarkStore};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, instrument, warn};

/// State guarded by the processing lock.
pub(crate) struct Inner {
    /// Last value read from or written to the store.
    watermark: Option<Timestamp>,
}

/// Replicates files from a watched pristine directory into a working directory.
///
/// All collaborators are injected, so the controller can run against an
/// in-memory watermark and a fake directory in tests.
pub struct ReplicationController<D: MonitoredDir, W: WatermarkStore, H: HintSink = NoOpHintSink> {
    config: ReplicationConfig,

    /// Watcher of the source directory.
    source: Arc<D>,

    /// Persisted watermark.
    store: Arc<W>,

    /// Watcher of the destination directory (hint receiver).
    hints: Arc<H>,

    /// Naming convention used for look-ahead hints.
    names: Arc<dyn NameSequence>,

    verifier: CopyVerifier,

    /// Controller state (broadcast to watchers)
    state_tx: watch::Sender<ControllerState>,
    state_rx: watch::Receiver<ControllerState>,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    /// Serializes attach, batches and detach.
    inner: Mutex<Inner>,
}

impl<D: MonitoredDir> ReplicationController<D, SqliteWatermarkStore, NoOpHintSink> {
    /// Create a controller persisting its watermark in the SQLite database
    /// named by `config.watermark`.
    pub async fn open(config: ReplicationConfig, source: Arc<D>) -> Result<Self> {
        let store = SqliteWatermarkStore::open(&config.watermark, config.pipeline_id.clone()).await?;
        Self::new(config, source, Arc::new(store))
    }
}

impl<D: MonitoredDir, W: WatermarkStore> ReplicationController<D, W, NoOpHintSink> {
    /// Create a controller with no hint receiver.
    ///
    /// The controller starts `Unattached`; call [`attach()`](Self::attach).
    pub fn new(config: ReplicationConfig, source: Arc<D>, store: Arc<W>) -> Result<Self> {
        config.validate()?;

        let (state_tx, state_rx) = watch::channel(ControllerState::Unattached);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let verifier = CopyVerifier::new(
            &config.settings.copy,
            Arc::new(config.settings.filter.to_filter()),
            shutdown_rx.clone(),
        );

        Ok(Self {
            config,
            source,
            store,
            hints: Arc::new(NoOpHintSink),
            names: Arc::new(DatasetNameSequence),
            verifier,
            state_tx,
            state_rx,
            shutdown_tx,
            shutdown_rx,
            inner: Mutex::new(Inner { watermark: None }),
        })
    }
}

impl<D: MonitoredDir, W: WatermarkStore, H: HintSink> ReplicationController<D, W, H> {
    /// Send hints to `hints` instead of the current sink.
    pub fn with_hint_sink<H2: HintSink>(self, hints: Arc<H2>) -> ReplicationController<D, W, H2> {
        ReplicationController {
            config: self.config,
            source: self.source,
            store: self.store,
            hints,
            names: self.names,
            verifier: self.verifier,
            state_tx: self.state_tx,
            state_rx: self.state_rx,
            shutdown_tx: self.shutdown_tx,
            shutdown_rx: self.shutdown_rx,
            inner: self.inner,
        }
    }

    pub fn with_name_sequence(mut self, names: Arc<dyn NameSequence>) -> Self {
        self.names = names;
        self
    }

    pub fn with_transfer(mut self, transfer: Arc<dyn FileTransfer>) -> Self {
        self.verifier = self.verifier.with_transfer(transfer);
        self
    }

    pub fn with_filter(mut self, filter: Arc<dyn FileFilter>) -> Self {
        self.verifier = self.verifier.with_filter(filter);
        self
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn pipeline_id(&self) -> &str {
        &self.config.pipeline_id
    }

    /// Get current controller state.
    pub fn state(&self) -> ControllerState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ControllerState> {
        self.state_rx.clone()
    }

    pub fn is_listening(&self) -> bool {
        matches!(self.state(), ControllerState::Listening)
    }

    /// Watermark as last read from or written to the store.
    ///
    /// Waits for any in-flight attach or batch.
    pub async fn watermark(&self) -> Option<Timestamp> {
        self.inner.lock().await.watermark
    }

    fn set_state(&self, state: ControllerState) {
        let _ = self.state_tx.send(state);
        metrics::set_controller_state(&self.config.pipeline_id, state);
    }

    /// Catch up on changes missed while not running, then start listening.
    ///
    /// Fails (and moves to `Failed`) only if the watermark store or the
    /// monitored directory cannot be read. Individual file failures are
    /// reported in the returned [`BatchResult`].
    #[instrument(skip_all, fields(pipeline = %self.config.pipeline_id))]
    pub async fn attach(&self) -> Result<BatchResult> {
        let mut inner = self.inner.lock().await;

        let state = self.state();
        if state != ControllerState::Unattached {
            return Err(ReplicationError::InvalidState {
                expected: ControllerState::Unattached.to_string(),
                actual: state.to_string(),
            });
        }

        self.set_state(ControllerState::CatchingUp);
        match self.catch_up(&mut inner).await {
            Ok(result) => {
                self.set_state(ControllerState::Listening);
                info!(
                    replicated = result.replicated.len(),
                    failed = result.failure_count(),
                    watermark = ?inner.watermark.map(|t| t.to_string()),
                    "Attached"
                );
                Ok(result)
            }
            Err(e) => {
                error!(error = %e, "Attach failed");
                self.set_state(ControllerState::Failed);
                Err(e)
            }
        }
    }

    /// Process one batch from the source directory's watcher.
    #[instrument(skip_all, fields(pipeline = %self.config.pipeline_id))]
    pub async fn on_change_batch(&self, batch: ChangeBatch) -> Result<BatchResult> {
        let mut inner = self.inner.lock().await;

        match self.state() {
            ControllerState::Listening => {}
            ControllerState::Detached => return Err(ReplicationError::Shutdown),
            other => {
                return Err(ReplicationError::InvalidState {
                    expected: ControllerState::Listening.to_string(),
                    actual: other.to_string(),
                })
            }
        }
        if *self.shutdown_rx.borrow() {
            return Err(ReplicationError::Shutdown);
        }

        self.process_batch(&mut inner, batch).await
    }

    /// Raise the persisted watermark to `to`, subject to the watermark policy.
    async fn advance(&self, inner: &mut Inner, to: Timestamp, result: &BatchResult) -> Result<()> {
        if self.config.settings.watermark_policy == WatermarkPolicy::AdvanceOnFullSuccess
            && !result.is_full_success()
        {
            warn!(
                failed = result.failure_count(),
                held_at = ?inner.watermark.map(|t| t.to_string()),
                "Holding watermark, batch had failures"
            );
            metrics::record_watermark_held(&self.config.pipeline_id);
            return Ok(());
        }

        let stored = self.store.write(to).await?;
        inner.watermark = Some(inner.watermark.map_or(stored, |current| current.max(stored)));
        Ok(())
    }

    /// Stop accepting work.
    ///
    /// Interrupts retry sleeps, waits for the batch in progress to finish
    /// and closes the watermark store. Calling it again is a no-op.
    #[instrument(skip_all, fields(pipeline = %self.config.pipeline_id))]
    pub async fn detach(&self) -> Result<()> {
        if self.state() == ControllerState::Detached {
            return Ok(());
        }
        info!("Detaching");
        self.shutdown_tx.send_replace(true);
        self.verifier.bulkhead().close();

        let _inner = self.inner.lock().await;
        if self.state() == ControllerState::Detached {
            return Ok(());
        }

        let closed = self.store.close().await;
        self.set_state(ControllerState::Detached);
        if let Err(ref e) = closed {
            warn!(error = %e, "Failed to close watermark store");
        }
        info!("Detached");
        closed
    }
}
