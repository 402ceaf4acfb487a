//! Prefix iteration over a point-in-time view.

use std::fmt;

use redb::Range;
use snafu::ResultExt;

use crate::{
    error::{Error, Result, StorageSnafu},
    kv::KvReadTable,
    traits::KvPair,
};

/// Iterator over the keys carrying a prefix, in ascending byte order.
///
/// Holds a read transaction until it is exhausted, released or dropped.
/// While it is held, compaction of the store cannot run.
pub struct KvIterator {
    range: Option<Range<'static, &'static [u8], &'static [u8]>>,
    prefix: Vec<u8>,
}

impl KvIterator {
    pub(crate) fn new(
        table: Option<KvReadTable>,
        prefix: &[u8],
        start: Option<&[u8]>,
    ) -> Result<Self> {
        let seek = match start {
            Some(start) if start > prefix => start,
            _ => prefix,
        };
        let range = match table {
            Some(table) => Some(table.range(seek..).context(StorageSnafu)?),
            None => None,
        };
        Ok(Self { range, prefix: prefix.to_vec() })
    }

    /// An iterator that yields nothing.
    pub fn empty() -> Self {
        Self { range: None, prefix: Vec::new() }
    }

    /// Releases the underlying read view. Later calls to `next` return `None`.
    pub fn release(&mut self) {
        self.range = None;
    }
}

impl Iterator for KvIterator {
    type Item = Result<KvPair>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.range.as_mut()?.next();
        match entry {
            Some(Ok((key, value))) => {
                let key_bytes = key.value();
                if !key_bytes.starts_with(&self.prefix) {
                    self.range = None;
                    return None;
                }
                Some(Ok((key_bytes.to_vec(), value.value().to_vec())))
            },
            Some(Err(source)) => {
                self.range = None;
                Some(Err(Error::Storage { source }))
            },
            None => {
                self.range = None;
                None
            },
        }
    }
}

impl fmt::Debug for KvIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvIterator")
            .field("prefix", &self.prefix)
            .field("released", &self.range.is_none())
            .finish()
    }
}
