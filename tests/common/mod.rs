// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shared test utilities for the integration, chaos and property tests.
//!
//! This module provides:
//! - Temporary pristine/working directory pairs
//! - A fake monitored directory with scripted modification times
//! - A hint sink that records every call
//! - Fault-injecting file transfers

#![allow(dead_code)]

pub mod fake_dir;
pub mod transfers;

pub use fake_dir::*;
pub use transfers::*;
