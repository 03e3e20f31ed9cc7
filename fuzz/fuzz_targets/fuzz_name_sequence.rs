//! Fuzz target for dataset name incrementing.
//!
//! This tests that computing the next name never panics on arbitrary input
//! and that the result differs from the input.

#![no_main]

use file_replicator::{DatasetNameSequence, NameSequence};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|name: &str| {
    // Should never panic
    if let Some(next) = DatasetNameSequence.next(name) {
        assert_ne!(next, name);
        // Only the counter changes, so the name never shrinks
        assert!(next.len() >= name.len());
    }
});
