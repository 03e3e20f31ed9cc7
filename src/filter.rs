// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Eligibility predicate for replication.

/// Decides which file names in the watched directory are replicated.
pub trait FileFilter: Send + Sync + 'static {
    fn accepts(&self, name: &str) -> bool;
}

/// Accepts names ending in a fixed, case-sensitive suffix such as `".fits"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    extension: String,
}

impl ExtensionFilter {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl FileFilter for ExtensionFilter {
    fn accepts(&self, name: &str) -> bool {
        // A bare ".fits" has no stem and is not a dataset.
        name.len() > self.extension.len() && name.ends_with(&self.extension)
    }
}
