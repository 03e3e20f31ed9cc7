// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry schedules and the copy concurrency limit.
//!
//! - [`RetryConfig`]: how many times to try and how long to pause in between
//! - [`Bulkhead`]: semaphore limiting concurrent copies so catch-up of a large
//!   backlog does not saturate the disks
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() {
//! use file_replicator::resilience::{Bulkhead, RetryConfig};
//! use std::time::Duration;
//!
//! // Copy verification: 5 attempts, fixed 5 second pause between them
//! let retry = RetryConfig::verification();
//! assert_eq!(retry.delay_after(2), Some(Duration::from_secs(5)));
//! assert_eq!(retry.delay_after(4), None);
//!
//! // At most 4 copies on disk at once
//! let slots = Bulkhead::new(4);
//! if let Some(_permit) = slots.acquire().await {
//!     // permit dropped = slot released
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Pause schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same pause after every failed attempt.
    Fixed(Duration),
    /// Doubles after every failed attempt, starting at `initial`, never above `max`.
    Exponential { initial: Duration, max: Duration },
}

/// Attempt bound and pause schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::verification()
    }
}

impl RetryConfig {
    /// Copy-verify schedule: 5 attempts, 5 seconds between each.
    ///
    /// ```text
    /// Attempt  Pause before  Cumulative wait
    /// -------  ------------  ---------------
    /// 0        -             0s
    /// 1        5s            5s
    /// 2        5s            10s
    /// 3        5s            15s
    /// 4        5s            20s (last attempt, no pause after)
    /// ```
    pub fn verification() -> Self {
        Self::fixed(5, Duration::from_secs(5))
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    /// SQLite busy/locked retry for the watermark store: 10ms, 20ms, 40ms, ...
    /// capped at 500ms.
    pub fn store() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::Exponential {
                initial: Duration::from_millis(10),
                max: Duration::from_millis(500),
            },
        }
    }

    /// Fast schedule for tests.
    pub fn testing() -> Self {
        Self::fixed(5, Duration::from_millis(10))
    }

    /// Pause after failed attempt `attempt` (0-based), or `None` if it was the last.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt.saturating_add(1) >= self.max_attempts {
            return None;
        }
        Some(match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
                initial.checked_mul(factor).map_or(max, |d| d.min(max))
            }
        })
    }
}

// =============================================================================
// Bulkhead (copy slots)
// =============================================================================

/// Limits concurrent copies with a semaphore.
///
/// Shared by every clone of a verifier, so the limit holds across batches.
#[derive(Debug)]
pub struct Bulkhead {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl Bulkhead {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot. `None` once the bulkhead has been closed.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore).acquire_owned().await.ok()
    }

    /// Refuse all further acquisitions. Slots already held stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.semaphore.available_permits())
    }
}
