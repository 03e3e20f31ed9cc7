// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Byte copy and whole-file digest primitives.
//!
//! The copy-verify engine drives these through the [`FileTransfer`] trait so
//! tests can inject I/O failures and corruption. All methods block and are
//! called from `spawn_blocking`.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

/// SHA-256 of a file's full contents.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest(pub [u8; 32]);

impl ContentDigest {
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut out = [0u8; 32];
        out.copy_from_slice(&Sha256::digest(data));
        Self(out)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Raw file operations used by the copy-verify loop.
pub trait FileTransfer: Send + Sync + 'static {
    /// Copy `src` to `dst` (creating or truncating it), durably. Returns bytes copied.
    fn copy(&self, src: &Path, dst: &Path) -> io::Result<u64>;

    /// Digest of the full contents of `path`.
    fn digest(&self, path: &Path) -> io::Result<ContentDigest>;
}

/// Local filesystem implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransfer;

impl FileTransfer for LocalTransfer {
    fn copy(&self, src: &Path, dst: &Path) -> io::Result<u64> {
        let mut reader = BufReader::new(File::open(src)?);
        let file = File::create(dst)?;
        let mut writer = BufWriter::new(file);
        let bytes = io::copy(&mut reader, &mut writer)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(bytes)
    }

    fn digest(&self, path: &Path) -> io::Result<ContentDigest> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut hasher = Sha256::new();
        io::copy(&mut reader, &mut hasher)?;
        hasher.flush()?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        Ok(ContentDigest(out))
    }
}
