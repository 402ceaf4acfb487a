//! Scratch directories holding tier files.

// A test cannot proceed without its scratch directory.
#![allow(clippy::expect_used)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

const CURRENT_FILE: &str = "current.redb";
const ARCHIVE_FILE: &str = "archive.redb";
const ANCIENT_FILE: &str = "ancient.redb";

/// Scratch directory for one test, removed on drop.
///
/// Tier files are created lazily by whatever opens them; `TestDir` only
/// hands out paths.
///
/// ```
/// use tierdb_test_utils::TestDir;
///
/// let dir = TestDir::new();
/// let (current, archive, _ancient) = dir.tier_paths();
/// assert_ne!(current, archive);
/// ```
#[derive(Debug)]
pub struct TestDir {
    root: TempDir,
}

impl TestDir {
    /// Creates an empty scratch directory.
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses to create a temporary directory.
    #[must_use]
    pub fn new() -> Self {
        Self { root: tempfile::Builder::new().prefix("tierdb-").tempdir().expect("create tempdir") }
    }

    /// Root of the scratch directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// `name` resolved inside the scratch directory.
    #[must_use]
    pub fn join<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        self.path().join(name)
    }

    /// Distinct file paths for the current tier, the archive tier and the
    /// ancient store, in that order.
    #[must_use]
    pub fn tier_paths(&self) -> (PathBuf, PathBuf, PathBuf) {
        (self.join(CURRENT_FILE), self.join(ARCHIVE_FILE), self.join(ANCIENT_FILE))
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}
