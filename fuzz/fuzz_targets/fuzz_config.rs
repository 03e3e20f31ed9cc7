//! Fuzz target for configuration parsing.
//!
//! Malformed JSON must be rejected with an error, never a panic.

#![no_main]

use file_replicator::ReplicationConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(json) = std::str::from_utf8(data) {
        // Should never panic
        if let Ok(config) = ReplicationConfig::from_json(json) {
            // Parsed configs are always valid
            assert!(config.validate().is_ok());
            let _ = config.settings.copy.retry_delay_duration();
            let _ = config.settings.staleness.window_duration();
        }
    }
});
