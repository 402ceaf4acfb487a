//! Atomic write batches.

use std::{fmt, sync::Arc};

use snafu::ResultExt;

use crate::{
    error::{InjectedCrashSnafu, Result, StorageSnafu},
    kv::StoreInner,
    metrics,
    traits::KeyValueWriter,
};

/// One staged batch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Store `value` under `key`.
    Put {
        /// Target key.
        key: Vec<u8>,
        /// Value to store.
        value: Vec<u8>,
    },
    /// Remove `key`.
    Delete {
        /// Target key.
        key: Vec<u8>,
    },
}

/// An ordered list of puts and deletes applied atomically by [`write`](Self::write).
///
/// Staging never touches the store. `write` applies every operation in one
/// transaction: readers observe all of them or none. Later operations on the
/// same key win.
pub struct Batch {
    store: Arc<StoreInner>,
    ops: Vec<BatchOp>,
    size: usize,
}

impl Batch {
    pub(crate) fn new(store: Arc<StoreInner>) -> Self {
        Self { store, ops: Vec::new(), size: 0 }
    }

    /// Stages a put.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.size += key.len() + value.len();
        self.ops.push(BatchOp::Put { key: key.to_vec(), value: value.to_vec() });
    }

    /// Stages a delete.
    pub fn delete(&mut self, key: &[u8]) {
        self.size += key.len();
        self.ops.push(BatchOp::Delete { key: key.to_vec() });
    }

    /// Total key and value bytes staged.
    pub fn value_size(&self) -> usize {
        self.size
    }

    /// Number of staged operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Staged operations in order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Applies every staged operation in one transaction.
    ///
    /// The batch keeps its contents; call [`reset`](Self::reset) to reuse it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnly`](crate::Error::ReadOnly) or
    /// [`Error::Closed`](crate::Error::Closed) for unusable handles. If an
    /// attached crash injector fires, the transaction is aborted and
    /// [`Error::InjectedCrash`](crate::Error::InjectedCrash) is returned.
    pub fn write(&self) -> Result<()> {
        let injector = self.store.crash_injector();
        self.store.write(|table| {
            for op in &self.ops {
                match op {
                    BatchOp::Put { key, value } => {
                        table.insert(key.as_slice(), value.as_slice()).context(StorageSnafu)?;
                    },
                    BatchOp::Delete { key } => {
                        table.remove(key.as_slice()).context(StorageSnafu)?;
                    },
                }
                if let Some(injector) = &injector {
                    if injector.on_batch_op() {
                        return InjectedCrashSnafu { point: injector.crash_point().to_string() }
                            .fail();
                    }
                }
            }
            Ok(())
        })?;
        metrics::record_batch_commit(self.ops.len(), self.size);
        Ok(())
    }

    /// Clears all staged operations.
    pub fn reset(&mut self) {
        self.ops.clear();
        self.size = 0;
    }

    /// Re-issues the staged operations, in order, against `writer`.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first error from `writer`.
    pub fn replay<W: KeyValueWriter + ?Sized>(&self, writer: &W) -> Result<()> {
        for op in &self.ops {
            match op {
                BatchOp::Put { key, value } => writer.put(key, value)?,
                BatchOp::Delete { key } => writer.delete(key)?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch").field("ops", &self.ops.len()).field("size", &self.size).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::{CrashInjector, CrashPoint, Error, KvStore};

    /// Writer that records what it was asked to do.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl KeyValueWriter for Recorder {
        fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
            self.seen.lock().push(format!(
                "put {}={}",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(value)
            ));
            Ok(())
        }

        fn delete(&self, key: &[u8]) -> Result<()> {
            self.seen.lock().push(format!("del {}", String::from_utf8_lossy(key)));
            Ok(())
        }
    }

    #[test]
    fn test_write_applies_all_ops() {
        let store = KvStore::open_in_memory().unwrap();
        store.put(b"gone", b"x").unwrap();

        let mut batch = store.new_batch();
        batch.put(b"a", b"1");
        batch.put(b"b", b"2");
        batch.delete(b"gone");
        assert_eq!(batch.len(), 3);
        batch.write().unwrap();

        assert_eq!(store.get(b"a").unwrap(), b"1");
        assert_eq!(store.get(b"b").unwrap(), b"2");
        assert!(!store.has(b"gone").unwrap());
    }

    #[test]
    fn test_later_ops_on_same_key_win() {
        let store = KvStore::open_in_memory().unwrap();
        let mut batch = store.new_batch();
        batch.put(b"k", b"first");
        batch.put(b"k", b"second");
        batch.write().unwrap();
        assert_eq!(store.get(b"k").unwrap(), b"second");

        batch.reset();
        batch.put(b"k", b"third");
        batch.delete(b"k");
        batch.write().unwrap();
        assert!(!store.has(b"k").unwrap());
    }

    #[test]
    fn test_value_size_and_reset() {
        let store = KvStore::open_in_memory().unwrap();
        let mut batch = store.new_batch();
        batch.put(b"key", b"value");
        batch.delete(b"xy");
        assert_eq!(batch.value_size(), 3 + 5 + 2);

        batch.reset();
        assert!(batch.is_empty());
        assert_eq!(batch.value_size(), 0);
    }

    #[test]
    fn test_empty_batch_write_is_noop() {
        let store = KvStore::open_in_memory().unwrap();
        store.new_batch().write().unwrap();
        assert_eq!(store.stat().unwrap().entries, 0);
    }

    #[test]
    fn test_injected_crash_leaves_no_partial_state() {
        let store = KvStore::open_in_memory().unwrap();
        store.set_crash_injector(Some(CrashInjector::armed(CrashPoint::DuringBatchWrite {
            after_ops: 2,
        })));

        let mut batch = store.new_batch();
        for i in 0..5u8 {
            batch.put(&[i], b"v");
        }
        let err = batch.write().unwrap_err();
        assert!(matches!(err, Error::InjectedCrash { .. }));
        assert_eq!(store.stat().unwrap().entries, 0);

        // The injector fires once; a retry commits.
        batch.write().unwrap();
        assert_eq!(store.stat().unwrap().entries, 5);
    }

    #[test]
    fn test_replay_preserves_order() {
        let store = KvStore::open_in_memory().unwrap();
        let mut batch = store.new_batch();
        batch.put(b"a", b"1");
        batch.delete(b"a");
        batch.put(b"b", b"2");

        let recorder = Recorder::default();
        batch.replay(&recorder).unwrap();
        assert_eq!(*recorder.seen.lock(), vec!["put a=1", "del a", "put b=2"]);
    }
}
