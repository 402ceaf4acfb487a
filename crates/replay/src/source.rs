//! Legacy datasets the replayer reads from.
//!
//! A [`ReplaySource`] exposes a tip height and, per height, the records of
//! the canonical block there. Two layouts are supported:
//!
//! - [`ChainSource`]: the binary chain schema, with the tip in the legacy
//!   `LastBlock` marker.
//! - [`SequentialSource`]: one `<prefix><decimal height>` record per height,
//!   tip at the highest height present.

use std::path::Path;

use snafu::{OptionExt, ResultExt};
use tierdb_store::{Iteratee, KeyValueReader, KvPair, KvStore};
use tierdb_tiered::KeyFamily;
use tierdb_types::{
    Hash, decode_height, hash_from_slice,
    config::StoreConfig,
    schema::{LEGACY_HEAD_KEY, body_key, canonical_hash_key, header_key, receipts_key, td_key},
};

use crate::error::{Result, StoreSnafu, VerificationSnafu};

/// One block as read from a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBlock {
    /// Block height.
    pub height: u64,
    /// Block hash, if the layout carries one.
    pub hash: Option<Hash>,
    /// Parent hash, if the layout carries one.
    pub parent_hash: Option<Hash>,
    /// Records to copy into the destination, keyed as in the source.
    pub records: Vec<KvPair>,
}

/// A read-only dataset addressable by block height.
pub trait ReplaySource {
    /// Highest height in the dataset, or `None` if it is empty.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the underlying reader.
    fn tip(&self) -> Result<Option<u64>>;

    /// The canonical block at `height`, or `None` if it is absent.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the underlying reader and `Verification`
    /// for records too malformed to address the rest of the block.
    fn block(&self, height: u64) -> Result<Option<SourceBlock>>;
}

fn get_optional<R: KeyValueReader + ?Sized>(reader: &R, key: &[u8]) -> Result<Option<Vec<u8>>> {
    match reader.get(key) {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e).context(StoreSnafu),
    }
}

/// Source in the binary chain schema.
///
/// The tip is read from the `LastBlock` marker. A block exists when both its
/// canonical hash and its header are present; body, receipts and total
/// difficulty are copied when present. The first 32 bytes of a header are the
/// parent hash.
#[derive(Debug)]
pub struct ChainSource<R> {
    reader: R,
}

impl<R> ChainSource<R> {
    /// Wraps an open reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// The wrapped reader.
    pub fn reader(&self) -> &R {
        &self.reader
    }
}

impl ChainSource<KvStore> {
    /// Opens the dataset at `path` read-only.
    ///
    /// # Errors
    ///
    /// Returns `MissingPath` if nothing exists at `path`, and open errors
    /// otherwise.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = KvStore::open_read_only(path, &StoreConfig::default()).context(StoreSnafu)?;
        Ok(Self::new(store))
    }
}

impl<R: KeyValueReader> ReplaySource for ChainSource<R> {
    fn tip(&self) -> Result<Option<u64>> {
        let Some(bytes) = get_optional(&self.reader, LEGACY_HEAD_KEY)? else {
            return Ok(None);
        };
        let tip = decode_height(&bytes)
            .context(tierdb_store::error::CodecSnafu { what: "legacy head" })
            .context(StoreSnafu)?;
        Ok(Some(tip))
    }

    fn block(&self, height: u64) -> Result<Option<SourceBlock>> {
        let canonical_key = canonical_hash_key(height);
        let Some(hash_bytes) = get_optional(&self.reader, &canonical_key)? else {
            return Ok(None);
        };
        let hash = hash_from_slice(&hash_bytes).context(VerificationSnafu {
            height,
            reason: format!("canonical hash is {} bytes", hash_bytes.len()),
        })?;

        let key = header_key(height, &hash);
        let Some(header) = get_optional(&self.reader, &key)? else {
            return Ok(None);
        };
        let parent_hash = header.get(..32).and_then(hash_from_slice);
        let mut records = vec![(canonical_key, hash_bytes), (key, header)];

        for key in [body_key(height, &hash), receipts_key(height, &hash), td_key(height, &hash)] {
            if let Some(value) = get_optional(&self.reader, &key)? {
                records.push((key, value));
            }
        }

        Ok(Some(SourceBlock { height, hash: Some(hash), parent_hash, records }))
    }
}

/// Source of `<prefix><decimal height>` records, one per height.
///
/// These records carry no hashes, so block verification does not apply.
#[derive(Debug)]
pub struct SequentialSource<R> {
    reader: R,
    family: KeyFamily,
    prefix: Vec<u8>,
}

impl<R> SequentialSource<R> {
    /// Wraps an open reader whose records are keyed `<prefix><height>`.
    pub fn new(reader: R, prefix: impl Into<Vec<u8>>) -> Self {
        let prefix = prefix.into();
        Self { reader, family: KeyFamily::decimal(prefix.clone()), prefix }
    }

    fn key(&self, height: u64) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(height.to_string().as_bytes());
        key
    }
}

impl<R: KeyValueReader + Iteratee> ReplaySource for SequentialSource<R> {
    fn tip(&self) -> Result<Option<u64>> {
        // Decimal keys do not sort numerically, so the whole family is scanned.
        let mut tip = None;
        for entry in self.reader.new_iterator(&self.prefix, None).context(StoreSnafu)? {
            let (key, _) = entry.context(StoreSnafu)?;
            if let Some(height) = self.family.height_of(&key) {
                tip = tip.max(Some(height));
            }
        }
        Ok(tip)
    }

    fn block(&self, height: u64) -> Result<Option<SourceBlock>> {
        let key = self.key(height);
        Ok(get_optional(&self.reader, &key)?.map(|value| SourceBlock {
            height,
            hash: None,
            parent_hash: None,
            records: vec![(key, value)],
        }))
    }
}
