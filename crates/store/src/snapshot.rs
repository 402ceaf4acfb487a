//! Consistent read-only snapshots.

use std::fmt;

use snafu::{OptionExt, ResultExt, ensure};

use crate::{
    error::{NotFoundSnafu, Result, SnapshotReleasedSnafu, StorageSnafu},
    kv::KvReadTable,
    traits::KeyValueReader,
};

/// A read-only view of a store as of the moment it was taken.
///
/// Writes committed afterwards are invisible through the snapshot. Reads
/// after [`release`](Self::release) fail with
/// [`Error::SnapshotReleased`](crate::Error::SnapshotReleased).
pub struct Snapshot {
    table: Option<KvReadTable>,
    released: bool,
}

impl Snapshot {
    pub(crate) fn new(table: Option<KvReadTable>) -> Self {
        Self { table, released: false }
    }

    /// Returns true if `key` was present when the snapshot was taken.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotReleased` after release.
    pub fn has(&self, key: &[u8]) -> Result<bool> {
        ensure!(!self.released, SnapshotReleasedSnafu);
        match &self.table {
            Some(table) => Ok(table.get(key).context(StorageSnafu)?.is_some()),
            None => Ok(false),
        }
    }

    /// Returns the value `key` had when the snapshot was taken.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it was absent and `SnapshotReleased` after release.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        ensure!(!self.released, SnapshotReleasedSnafu);
        let table = self.table.as_ref().context(NotFoundSnafu)?;
        let value = table.get(key).context(StorageSnafu)?.context(NotFoundSnafu)?;
        Ok(value.value().to_vec())
    }

    /// Releases the snapshot. Idempotent.
    pub fn release(&mut self) {
        self.table = None;
        self.released = true;
    }

    /// Returns true once released.
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot").field("released", &self.released).finish()
    }
}

impl KeyValueReader for Snapshot {
    fn has(&self, key: &[u8]) -> Result<bool> {
        Snapshot::has(self, key)
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        Snapshot::get(self, key)
    }
}
