//! Fuzz target for look-ahead hint generation.
//!
//! Arbitrary batches of names must never panic, and the hints returned are
//! bounded by the requested count and contain no duplicates.

#![no_main]

use file_replicator::naming::lookahead;
use file_replicator::DatasetNameSequence;
use libfuzzer_sys::fuzz_target;
use std::collections::HashSet;

fuzz_target!(|data: (Vec<&str>, u8)| {
    let (names, count) = data;
    let count = usize::from(count % 32);

    let hints = lookahead(&DatasetNameSequence, names.iter().copied(), count);

    assert!(hints.len() <= count);
    let unique: HashSet<&String> = hints.iter().collect();
    assert_eq!(unique.len(), hints.len());
});
