// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the file replicator.
//!
//! Configuration is passed to
//! [`ReplicationController::new()`](crate::ReplicationController::new) and can
//! be constructed programmatically or deserialized from JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use file_replicator::config::ReplicationConfig;
//!
//! let config = ReplicationConfig {
//!     pipeline_id: "gn-dhs".into(),
//!     source_dir: "/data/pristine".into(),
//!     dest_dir: "/data/working".into(),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! ReplicationConfig
//! ├── pipeline_id: String           # Keys the persisted watermark
//! ├── source_dir: PathBuf           # Pristine directory (watched)
//! ├── dest_dir: PathBuf             # Working directory (written)
//! ├── settings: ReplicationSettings
//! │   ├── copy: CopyConfig          # Attempts, delay, staging suffix, concurrency
//! │   ├── filter: FilterConfig      # Eligible extension
//! │   ├── staleness: StalenessConfig
//! │   ├── hints: HintConfig         # Look-ahead hints
//! │   └── watermark_policy: WatermarkPolicy
//! └── watermark: WatermarkConfig    # SQLite watermark persistence
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "pipeline_id": "gn-dhs",
//!   "source_dir": "/data/pristine",
//!   "dest_dir": "/data/working",
//!   "settings": {
//!     "copy": { "max_attempts": 5, "retry_delay": "5s" },
//!     "filter": { "extension": ".fits" },
//!     "watermark_policy": "advance_always"
//!   },
//!   "watermark": { "sqlite_path": "/var/lib/replicator/watermark.db" }
//! }
//! ```

use crate::error::{ReplicationError, Result};
use crate::filter::ExtensionFilter;
use crate::resilience::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `ReplicationController::new()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Identity of this pipeline. The persisted watermark is keyed by it.
    pub pipeline_id: String,

    /// Pristine directory whose watcher feeds the controller.
    pub source_dir: PathBuf,

    /// Working directory that receives verified copies.
    pub dest_dir: PathBuf,

    #[serde(default)]
    pub settings: ReplicationSettings,

    #[serde(default)]
    pub watermark: WatermarkConfig,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            pipeline_id: "local.dev.pipeline.default".to_string(),
            source_dir: PathBuf::from("pristine"),
            dest_dir: PathBuf::from("working"),
            settings: ReplicationSettings::default(),
            watermark: WatermarkConfig::default(),
        }
    }
}

impl ReplicationConfig {
    /// Minimal config for tests: fast retries, in-memory watermark.
    pub fn for_testing(source_dir: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            pipeline_id: "test-pipeline".to_string(),
            source_dir: source_dir.into(),
            dest_dir: dest_dir.into(),
            settings: ReplicationSettings {
                copy: CopyConfig {
                    retry_delay: "10ms".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
            watermark: WatermarkConfig::in_memory(),
        }
    }

    /// Parse a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ReplicationError::Config(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the controller cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline_id.trim().is_empty() {
            return Err(ReplicationError::Config("pipeline_id must not be empty".into()));
        }
        if self.source_dir == self.dest_dir {
            return Err(ReplicationError::Config(format!(
                "source_dir and dest_dir are the same directory: {}",
                self.source_dir.display()
            )));
        }
        self.settings.copy.validate()?;
        if self.settings.filter.extension.is_empty() {
            return Err(ReplicationError::Config("filter.extension must not be empty".into()));
        }
        if self.settings.filter.extension == self.settings.copy.staging_suffix {
            return Err(ReplicationError::Config(
                "filter.extension must differ from copy.staging_suffix".into(),
            ));
        }
        if self.settings.staleness.enabled {
            humantime::parse_duration(&self.settings.staleness.window).map_err(|e| {
                ReplicationError::Config(format!(
                    "Invalid staleness.window '{}': {}",
                    self.settings.staleness.window, e
                ))
            })?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ReplicationSettings
// ═══════════════════════════════════════════════════════════════════════════════

/// Tunables for the replication logic.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReplicationSettings {
    #[serde(default)]
    pub copy: CopyConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub staleness: StalenessConfig,
    #[serde(default)]
    pub hints: HintConfig,
    #[serde(default)]
    pub watermark_policy: WatermarkPolicy,
}

// ═══════════════════════════════════════════════════════════════════════════════
// CopyConfig: copy-verify engine
// ═══════════════════════════════════════════════════════════════════════════════

/// Copy-verify engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Total copy+verify attempts per file.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between attempts as a duration string (e.g. "5s").
    #[serde(default = "default_retry_delay")]
    pub retry_delay: String,

    /// Suffix of the staging file written before the commit rename.
    #[serde(default = "default_staging_suffix")]
    pub staging_suffix: String,

    /// Maximum files copied at once.
    #[serde(default = "default_max_concurrent_copies")]
    pub max_concurrent_copies: usize,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay() -> String {
    "5s".to_string()
}

fn default_staging_suffix() -> String {
    ".tmp".to_string()
}

fn default_max_concurrent_copies() -> usize {
    4
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: "5s".to_string(),
            staging_suffix: ".tmp".to_string(),
            max_concurrent_copies: 4,
        }
    }
}

impl CopyConfig {
    /// Parse the retry_delay string to a Duration.
    pub fn retry_delay_duration(&self) -> Duration {
        humantime::parse_duration(&self.retry_delay).unwrap_or(Duration::from_secs(5))
    }

    /// Fixed-delay retry schedule for the copy loop.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::fixed(self.max_attempts, self.retry_delay_duration())
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ReplicationError::Config("copy.max_attempts must be at least 1".into()));
        }
        if self.staging_suffix.is_empty() {
            return Err(ReplicationError::Config("copy.staging_suffix must not be empty".into()));
        }
        if self.max_concurrent_copies == 0 {
            return Err(ReplicationError::Config(
                "copy.max_concurrent_copies must be at least 1".into(),
            ));
        }
        humantime::parse_duration(&self.retry_delay).map_err(|e| {
            ReplicationError::Config(format!("Invalid copy.retry_delay '{}': {}", self.retry_delay, e))
        })?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FilterConfig, StalenessConfig, HintConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Which files are eligible for replication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_extension() -> String {
    ".fits".to_string()
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
        }
    }
}

impl FilterConfig {
    pub fn to_filter(&self) -> ExtensionFilter {
        ExtensionFilter::new(self.extension.clone())
    }
}

/// Guard against "new" files with implausibly old modification times.
///
/// A new file older than `watermark - window` is skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StalenessConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_staleness_window")]
    pub window: String,
}

fn default_true() -> bool {
    true
}

fn default_staleness_window() -> String {
    "7days".to_string()
}

const ONE_WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: default_staleness_window(),
        }
    }
}

impl StalenessConfig {
    /// The window, or `None` when the guard is disabled.
    pub fn window_duration(&self) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        Some(humantime::parse_duration(&self.window).unwrap_or(ONE_WEEK))
    }
}

/// Look-ahead hints sent to the destination directory's watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How many upcoming names to predict.
    #[serde(default = "default_lookahead")]
    pub lookahead: usize,
}

fn default_lookahead() -> usize {
    5
}

impl Default for HintConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lookahead: 5,
        }
    }
}

/// When the watermark moves past a processed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkPolicy {
    /// Advance after every batch regardless of per-file outcomes.
    ///
    /// A file that exhausts its attempts is not retried on a later run unless
    /// its modification time changes again.
    #[default]
    AdvanceAlways,

    /// Hold the watermark when any file in the batch exhausted its attempts or
    /// was interrupted, so the next catch-up covers it again.
    AdvanceOnFullSuccess,
}

// ═══════════════════════════════════════════════════════════════════════════════
// WatermarkConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Watermark persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkConfig {
    /// Path to SQLite database for watermark storage.
    pub sqlite_path: String,

    /// Whether to use WAL mode for SQLite (recommended).
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "replication_watermark.db".to_string(),
            wal_mode: true,
        }
    }
}

impl WatermarkConfig {
    /// Create an in-memory config for testing.
    pub fn in_memory() -> Self {
        Self {
            sqlite_path: ":memory:".to_string(),
            wal_mode: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
