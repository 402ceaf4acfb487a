//! Iteration across both tiers.

use tierdb_store::{KvIterator, KvPair, Result};

/// Iterator over a prefix in both tiers: the archive first, then current.
///
/// Each tier yields keys in ascending order, but the two sequences are
/// concatenated, not merged. A key archived while still present in current
/// (for example after an interrupted archiver chunk) is yielded twice, once
/// per tier. Callers that need one globally sorted stream must sort or merge
/// the output themselves.
#[derive(Debug)]
pub struct MergedIterator {
    archive: Option<KvIterator>,
    current: KvIterator,
}

impl MergedIterator {
    pub(crate) fn new(archive: Option<KvIterator>, current: KvIterator) -> Self {
        Self { archive, current }
    }

    /// Releases both underlying read views.
    pub fn release(&mut self) {
        if let Some(archive) = self.archive.as_mut() {
            archive.release();
        }
        self.archive = None;
        self.current.release();
    }
}

impl Iterator for MergedIterator {
    type Item = Result<KvPair>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(archive) = self.archive.as_mut() {
            match archive.next() {
                Some(item) => return Some(item),
                None => self.archive = None,
            }
        }
        self.current.next()
    }
}
