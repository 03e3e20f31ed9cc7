// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fault-injecting [`FileTransfer`] implementations.

use file_replicator::{ContentDigest, FileTransfer, LocalTransfer};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

/// Fails the first `fail_first` copies with `kind`, then copies normally.
pub struct FlakyTransfer {
    fail_first: u32,
    kind: io::ErrorKind,
    copies: AtomicU32,
}

impl FlakyTransfer {
    pub fn new(fail_first: u32) -> Self {
        Self::with_kind(fail_first, io::ErrorKind::Other)
    }

    pub fn always_failing() -> Self {
        Self::new(u32::MAX)
    }

    pub fn with_kind(fail_first: u32, kind: io::ErrorKind) -> Self {
        Self {
            fail_first,
            kind,
            copies: AtomicU32::new(0),
        }
    }

    pub fn copies(&self) -> u32 {
        self.copies.load(Ordering::SeqCst)
    }
}

impl FileTransfer for FlakyTransfer {
    fn copy(&self, src: &Path, dst: &Path) -> io::Result<u64> {
        let n = self.copies.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            // Leave a partial file behind, like a real failed write would.
            std::fs::write(dst, b"partial")?;
            return Err(io::Error::new(self.kind, "injected copy failure"));
        }
        LocalTransfer.copy(src, dst)
    }

    fn digest(&self, path: &Path) -> io::Result<ContentDigest> {
        LocalTransfer.digest(path)
    }
}

/// Corrupts the staged copy on the first `corrupt_first` copies.
pub struct CorruptingTransfer {
    corrupt_first: u32,
    copies: AtomicU32,
}

impl CorruptingTransfer {
    pub fn new(corrupt_first: u32) -> Self {
        Self {
            corrupt_first,
            copies: AtomicU32::new(0),
        }
    }

    pub fn copies(&self) -> u32 {
        self.copies.load(Ordering::SeqCst)
    }
}

impl FileTransfer for CorruptingTransfer {
    fn copy(&self, src: &Path, dst: &Path) -> io::Result<u64> {
        let n = self.copies.fetch_add(1, Ordering::SeqCst);
        let bytes = LocalTransfer.copy(src, dst)?;
        if n < self.corrupt_first {
            let mut contents = std::fs::read(dst)?;
            match contents.first_mut() {
                Some(b) => *b ^= 0xFF,
                None => contents.push(0),
            }
            std::fs::write(dst, contents)?;
        }
        Ok(bytes)
    }

    fn digest(&self, path: &Path) -> io::Result<ContentDigest> {
        LocalTransfer.digest(path)
    }
}

/// Sleeps inside every copy and tracks peak concurrency.
pub struct SlowTransfer {
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowTransfer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl FileTransfer for SlowTransfer {
    fn copy(&self, src: &Path, dst: &Path) -> io::Result<u64> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        let result = LocalTransfer.copy(src, dst);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn digest(&self, path: &Path) -> io::Result<ContentDigest> {
        LocalTransfer.digest(path)
    }
}

/// Creates the final-named destination file while the staged copy is written.
pub struct RacingWriterTransfer {
    pub contents: &'static [u8],
}

impl FileTransfer for RacingWriterTransfer {
    fn copy(&self, src: &Path, dst: &Path) -> io::Result<u64> {
        let bytes = LocalTransfer.copy(src, dst)?;
        let name = dst.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if let (Some(dir), Some(final_name)) = (dst.parent(), name.strip_suffix(".tmp")) {
            std::fs::write(dir.join(final_name), self.contents)?;
        }
        Ok(bytes)
    }

    fn digest(&self, path: &Path) -> io::Result<ContentDigest> {
        LocalTransfer.digest(path)
    }
}
