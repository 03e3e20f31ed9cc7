// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication watermark persistence.
//!
//! The watermark is the modification time up to which every file in the
//! source directory has already been considered for replication. It is read
//! once at attach to drive catch-up and written after catch-up and after every
//! batch.
//!
//! # Monotonicity
//!
//! `write()` never lowers the stored value. The SQLite store enforces this in
//! the upsert itself (`MAX(existing, new)`), so a late writer holding an older
//! value cannot roll the watermark back.
//!
//! # SQLite Busy Handling
//!
//! SQLite can return SQLITE_BUSY/SQLITE_LOCKED when the database is
//! contended. Writes are retried with exponential backoff
//! ([`RetryConfig::store`]).
//!
//! ```text
//! batch T=1234 processed → write(1234) → MAX(stored, 1234) persisted
//!                          (crash before write = batch re-offered by catch-up)
//! ```

use crate::config::WatermarkConfig;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::monitored_dir::BoxFuture;
use crate::resilience::RetryConfig;
use crate::timestamp::Timestamp;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Persisted "already considered" boundary for one pipeline.
pub trait WatermarkStore: Send + Sync + 'static {
    /// `None` if this pipeline has never run.
    fn read(&self) -> BoxFuture<'_, Option<Timestamp>>;

    /// Raise the watermark to at least `watermark`. Returns the stored value.
    fn write(&self, watermark: Timestamp) -> BoxFuture<'_, Timestamp>;

    /// Release resources. Called once on detach.
    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// Check if an error is a retryable SQLite busy/locked error
fn is_sqlite_busy_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            // SQLite error codes: SQLITE_BUSY = 5, SQLITE_LOCKED = 6
            if let Some(code) = db_err.code() {
                return code == "5" || code == "6";
            }
            let msg = db_err.message().to_lowercase();
            msg.contains("database is locked") || msg.contains("database is busy")
        }
        _ => false,
    }
}

/// Execute a database operation with retry on SQLITE_BUSY/SQLITE_LOCKED
async fn execute_with_retry<F, Fut, T>(
    operation_name: &str,
    retry: &RetryConfig,
    mut f: F,
) -> std::result::Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;
        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(operation = operation_name, attempts, "SQLite operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if is_sqlite_busy_error(&e) && attempts < retry.max_attempts => {
                let delay = retry.delay_after(attempts - 1).unwrap_or_default();
                warn!(
                    operation = operation_name,
                    attempts,
                    max_attempts = retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "SQLite busy, retrying"
                );
                metrics::record_watermark_store_retry(operation_name);
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if is_sqlite_busy_error(&e) {
                    warn!(operation = operation_name, attempts, "SQLite busy, max retries exceeded");
                }
                return Err(e);
            }
        }
    }
}

/// Watermark storage backed by SQLite, one row per pipeline.
pub struct SqliteWatermarkStore {
    pool: SqlitePool,
    pipeline_id: String,
    path: String,
    retry: RetryConfig,
}

impl SqliteWatermarkStore {
    /// Open (creating if needed) the store at `config.sqlite_path`.
    pub async fn open(config: &WatermarkConfig, pipeline_id: impl Into<String>) -> Result<Self> {
        let pipeline_id = pipeline_id.into();
        let path = config.sqlite_path.clone();
        let in_memory = path == ":memory:";
        info!(path = %path, pipeline = %pipeline_id, "Opening watermark store");

        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", path)
        };
        let journal = if config.wal_mode && !in_memory {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        };
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| ReplicationError::Config(format!("Invalid SQLite path: {}", e)))?
            .journal_mode(journal)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        // Each connection to ":memory:" is a separate database.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(2)
        };
        let pool = pool_options.connect_with(options).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS watermarks (
                pipeline_id TEXT PRIMARY KEY,
                last_modified INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            pipeline_id,
            path,
            retry: RetryConfig::store(),
        })
    }

    /// Get database path (for diagnostics).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// Force flush WAL to main database (for clean shutdown).
    pub async fn checkpoint(&self) -> Result<()> {
        let pool = &self.pool;
        execute_with_retry("watermark_checkpoint", &self.retry, || async {
            sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)").execute(pool).await
        })
        .await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

impl WatermarkStore for SqliteWatermarkStore {
    fn read(&self) -> BoxFuture<'_, Option<Timestamp>> {
        Box::pin(async move {
            let row: Option<(i64,)> =
                sqlx::query_as("SELECT last_modified FROM watermarks WHERE pipeline_id = ?")
                    .bind(&self.pipeline_id)
                    .fetch_optional(&self.pool)
                    .await?;
            let watermark = row.map(|(ms,)| Timestamp::from_millis(ms));
            debug!(pipeline = %self.pipeline_id, watermark = ?watermark, "Read watermark");
            Ok(watermark)
        })
    }

    fn write(&self, watermark: Timestamp) -> BoxFuture<'_, Timestamp> {
        Box::pin(async move {
            let now = Timestamp::now().as_millis();
            let pool = &self.pool;
            let pipeline_id = &self.pipeline_id;

            execute_with_retry("watermark_write", &self.retry, || async {
                sqlx::query(
                    r#"
                    INSERT INTO watermarks (pipeline_id, last_modified, updated_at)
                    VALUES (?, ?, ?)
                    ON CONFLICT(pipeline_id) DO UPDATE SET
                        last_modified = MAX(watermarks.last_modified, excluded.last_modified),
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(pipeline_id)
                .bind(watermark.as_millis())
                .bind(now)
                .execute(pool)
                .await
            })
            .await?;

            let (stored,): (i64,) =
                sqlx::query_as("SELECT last_modified FROM watermarks WHERE pipeline_id = ?")
                    .bind(pipeline_id)
                    .fetch_one(pool)
                    .await?;
            let stored = Timestamp::from_millis(stored);
            debug!(pipeline = %pipeline_id, requested = %watermark, stored = %stored, "Watermark written");
            metrics::set_watermark(pipeline_id, stored);
            Ok(stored)
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.path != ":memory:" {
                if let Err(e) = self.checkpoint().await {
                    warn!(error = %e, "Failed to checkpoint WAL on close");
                }
            }
            self.pool.close().await;
            info!("Watermark store closed");
            Ok(())
        })
    }
}

/// In-memory watermark with the same monotonic semantics.
///
/// Records every write request for inspection in tests.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    value: RwLock<Option<Timestamp>>,
    writes: RwLock<Vec<Timestamp>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded as if a previous run had persisted `watermark`.
    pub fn with_value(watermark: Timestamp) -> Self {
        Self {
            value: RwLock::new(Some(watermark)),
            writes: RwLock::new(Vec::new()),
        }
    }

    pub async fn current(&self) -> Option<Timestamp> {
        *self.value.read().await
    }

    /// Every value passed to `write()`, in call order.
    pub async fn writes(&self) -> Vec<Timestamp> {
        self.writes.read().await.clone()
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    fn read(&self) -> BoxFuture<'_, Option<Timestamp>> {
        Box::pin(async move { Ok(*self.value.read().await) })
    }

    fn write(&self, watermark: Timestamp) -> BoxFuture<'_, Timestamp> {
        Box::pin(async move {
            self.writes.write().await.push(watermark);
            let mut value = self.value.write().await;
            let stored = value.map_or(watermark, |current| current.max(watermark));
            *value = Some(stored);
            Ok(stored)
        })
    }
}
