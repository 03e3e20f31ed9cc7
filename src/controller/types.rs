// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Controller state types.
//!
//! # State Transitions
//!
//! ```text
//!                 attach()
//! Unattached ───────────────→ CatchingUp
//!    │                            │
//!    │                            ├── (watermark store or directory
//!    │                            │    unreadable) ──→ Failed
//!    │                            │
//!    │                            ↓ (catch-up done, watermark advanced)
//!    │                        Listening ←── on_change_batch()
//!    │                            │
//!    │ detach()                   │ detach()
//!    ↓                            ↓
//! Detached ←──────────────────────┘
//! ```
//!
//! - **Unattached**: constructed; batches are rejected.
//! - **CatchingUp**: replicating the gap between the persisted watermark and
//!   the directory's high-water time.
//! - **Listening**: processing live batches.
//! - **Detached**: shut down; no further work is accepted.
//! - **Failed**: attach could not read the watermark or the directory.

/// State of a replication controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Unattached,
    CatchingUp,
    Listening,
    Detached,
    Failed,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Unattached => "Unattached",
            ControllerState::CatchingUp => "CatchingUp",
            ControllerState::Listening => "Listening",
            ControllerState::Detached => "Detached",
            ControllerState::Failed => "Failed",
        }
    }

    /// Numeric encoding for the state gauge.
    pub fn gauge_value(&self) -> f64 {
        match self {
            ControllerState::Unattached => 0.0,
            ControllerState::CatchingUp => 1.0,
            ControllerState::Listening => 2.0,
            ControllerState::Detached => 3.0,
            ControllerState::Failed => 4.0,
        }
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
