// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fake monitored directory and hint sink.
//!
//! Files are real (written to a temp directory) but their modification times
//! are logical timestamps chosen by the test, so catch-up intervals and
//! staleness floors can be exercised without touching the clock.

use file_replicator::monitored_dir::BoxFuture;
use file_replicator::{
    ChangeBatch, HintSink, MonitoredDir, ReplicationConfig, ReplicationError, Timestamp, WatchedFile,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

pub fn ts(millis: i64) -> Timestamp {
    Timestamp::from_millis(millis)
}

/// A pristine/working directory pair under one temp root.
pub struct TestEnv {
    pub root: TempDir,
    pub src: PathBuf,
    pub dst: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("pristine");
        let dst = root.path().join("working");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::create_dir_all(&dst).unwrap();
        Self { root, src, dst }
    }

    /// Config with fast retries and an in-memory watermark.
    pub fn config(&self) -> ReplicationConfig {
        ReplicationConfig::for_testing(&self.src, &self.dst)
    }

    /// Write a source file and describe it with a logical modification time.
    pub fn write_source(&self, name: &str, contents: &[u8], modified: i64) -> WatchedFile {
        let path = self.src.join(name);
        std::fs::write(&path, contents).unwrap();
        WatchedFile::new(path, ts(modified))
    }

    pub fn write_dest(&self, name: &str, contents: &[u8]) {
        std::fs::write(self.dst.join(name), contents).unwrap();
    }

    pub fn dest_contents(&self, name: &str) -> Option<Vec<u8>> {
        std::fs::read(self.dst.join(name)).ok()
    }

    /// Sorted names of everything in the working directory.
    pub fn dest_names(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.dst)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// In-memory stand-in for the pristine directory's watcher.
#[derive(Default)]
pub struct FakeMonitoredDir {
    files: Mutex<Vec<WatchedFile>>,
    high_water: Mutex<Option<Timestamp>>,
    queries: Mutex<Vec<(Timestamp, Timestamp)>>,
    unreadable: AtomicBool,
}

impl FakeMonitoredDir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(files: Vec<WatchedFile>) -> Self {
        let dir = Self::new();
        for file in files {
            dir.add(file);
        }
        dir
    }

    /// Record a file and raise the high-water time to cover it.
    pub fn add(&self, file: WatchedFile) {
        let mut high_water = self.high_water.lock().unwrap();
        *high_water = Some(high_water.map_or(file.modified, |hw| hw.max(file.modified)));
        self.files.lock().unwrap().push(file);
    }

    pub fn set_high_water(&self, high_water: Timestamp) {
        *self.high_water.lock().unwrap() = Some(high_water);
    }

    pub fn set_unreadable(&self, unreadable: bool) {
        self.unreadable.store(unreadable, Ordering::SeqCst);
    }

    /// Every `(after, up_to]` interval queried so far.
    pub fn queries(&self) -> Vec<(Timestamp, Timestamp)> {
        self.queries.lock().unwrap().clone()
    }

    /// A batch reporting `added` as new files at high-water time `high_water`.
    pub fn batch(&self, high_water: i64, added: Vec<WatchedFile>) -> ChangeBatch {
        let mut batch = ChangeBatch::new(ts(high_water));
        for file in added {
            self.add(file.clone());
            batch = batch.with_added(file);
        }
        self.set_high_water(ts(high_water));
        batch
    }
}

impl MonitoredDir for FakeMonitoredDir {
    fn high_water(&self) -> BoxFuture<'_, Option<Timestamp>> {
        Box::pin(async move {
            if self.unreadable.load(Ordering::SeqCst) {
                return Err(ReplicationError::directory("high_water", "watcher not started"));
            }
            Ok(*self.high_water.lock().unwrap())
        })
    }

    fn modified_between(&self, after: Timestamp, up_to: Timestamp) -> BoxFuture<'_, Vec<WatchedFile>> {
        Box::pin(async move {
            if self.unreadable.load(Ordering::SeqCst) {
                return Err(ReplicationError::directory("modified_between", "watcher not started"));
            }
            self.queries.lock().unwrap().push((after, up_to));
            Ok(self
                .files
                .lock()
                .unwrap()
                .iter()
                .filter(|f| f.modified > after && f.modified <= up_to)
                .cloned()
                .collect())
        })
    }
}

/// Records every hint call.
#[derive(Default)]
pub struct RecordingHintSink {
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingHintSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl HintSink for RecordingHintSink {
    fn expect_updates(&self, names: &[String]) {
        self.calls.lock().unwrap().push(names.to_vec());
    }
}
