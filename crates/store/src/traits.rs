//! Capability traits.
//!
//! Components depend on the narrowest capability they need: a replay source
//! only needs [`KeyValueReader`] plus [`Iteratee`], the archiver needs the full
//! key-value surface. The key-value traits are implemented by both
//! [`KvStore`](crate::KvStore) and the tiered database; the ancient traits by
//! [`AncientStore`](crate::AncientStore) and the tiered database, which
//! forwards them to its attached ancient store.

use std::sync::Arc;

use crate::{ancient::AncientWriteOp, batch::Batch, error::Result};

/// A key and its value, as yielded by iterators.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Point lookups.
pub trait KeyValueReader {
    /// Returns true if `key` is present.
    fn has(&self, key: &[u8]) -> Result<bool>;

    /// Returns the value under `key`, or [`Error::NotFound`](crate::Error::NotFound).
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;
}

/// Single-key mutation.
pub trait KeyValueWriter {
    /// Stores `value` under `key`.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Removes `key`; removing an absent key succeeds.
    fn delete(&self, key: &[u8]) -> Result<()>;
}

/// Range removal.
pub trait KeyValueRangeDeleter {
    /// Removes every key in `[start, end)`; `None` means unbounded.
    fn delete_range(&self, start: &[u8], end: Option<&[u8]>) -> Result<()>;
}

/// Ordered iteration.
pub trait Iteratee {
    /// Iterator type yielded by [`new_iterator`](Self::new_iterator).
    type Iter: Iterator<Item = Result<KvPair>>;

    /// Iterates keys carrying `prefix`, starting at `max(prefix, start)`.
    fn new_iterator(&self, prefix: &[u8], start: Option<&[u8]>) -> Result<Self::Iter>;
}

/// Batch creation.
pub trait Batcher {
    /// Creates an empty batch.
    fn new_batch(&self) -> Batch;
}

/// Read access to an append-only ancient store.
pub trait AncientReader {
    /// Returns true if `table` holds an item at `index`.
    fn has_ancient(&self, table: &str, index: u64) -> Result<bool>;

    /// Returns the item at `index` of `table`.
    fn ancient(&self, table: &str, index: u64) -> Result<Vec<u8>>;

    /// Returns up to `count` consecutive items of `table` from `start`,
    /// stopping early once `max_bytes` would be exceeded (`0` = unlimited).
    /// At least one item is returned when `start` is in range.
    fn ancient_range(
        &self,
        table: &str,
        start: u64,
        count: u64,
        max_bytes: u64,
    ) -> Result<Vec<Vec<u8>>>;

    /// Exclusive upper bound of stored items.
    fn ancients(&self) -> Result<u64>;

    /// Inclusive lower bound of stored items.
    fn tail(&self) -> Result<u64>;

    /// Total bytes stored in `table`.
    fn ancient_size(&self, table: &str) -> Result<u64>;
}

macro_rules! forward_reads {
    ($($ptr:ty),*) => {$(
        impl<T: KeyValueReader + ?Sized> KeyValueReader for $ptr {
            fn has(&self, key: &[u8]) -> Result<bool> {
                (**self).has(key)
            }

            fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
                (**self).get(key)
            }
        }

        impl<T: Iteratee + ?Sized> Iteratee for $ptr {
            type Iter = T::Iter;

            fn new_iterator(&self, prefix: &[u8], start: Option<&[u8]>) -> Result<Self::Iter> {
                (**self).new_iterator(prefix, start)
            }
        }
    )*};
}

forward_reads!(&T, Arc<T>);

/// Write access to an append-only ancient store.
pub trait AncientWriter {
    /// Applies every mutation staged by `f` atomically and returns the number
    /// of bytes appended. Nothing is applied if `f` fails.
    fn modify_ancients<F>(&self, f: F) -> Result<u64>
    where
        F: FnOnce(&mut AncientWriteOp) -> Result<()>;

    /// Discards items at indices `>= n`. Returns the previous upper bound.
    fn truncate_head(&self, n: u64) -> Result<u64>;

    /// Discards the `n` oldest items. Returns the previous tail.
    fn truncate_tail(&self, n: u64) -> Result<u64>;

    /// Flushes ancient data to durable storage.
    fn sync_ancient(&self) -> Result<()>;
}
