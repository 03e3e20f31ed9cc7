//! Fuzz target for the replication eligibility filter.
//!
//! The filter must agree with a plain suffix check on arbitrary names and
//! must never accept a staged copy.

#![no_main]

use file_replicator::{ExtensionFilter, FileFilter};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (&str, &str)| {
    let (name, extension) = data;
    let filter = ExtensionFilter::new(extension);

    // Should never panic
    let accepted = filter.accepts(name);
    if accepted {
        assert!(name.ends_with(extension));
        assert!(name.len() > extension.len());
    }

    let fits = ExtensionFilter::new(".fits");
    let staged = format!("{}.fits.tmp", name);
    assert!(!fits.accepts(&staged));
});
