//! Chain key schema.
//!
//! Block records are keyed number-first so that every record family sorts by
//! height under plain byte-order iteration:
//!
//! | record             | key                                | value          |
//! |--------------------|------------------------------------|----------------|
//! | canonical hash     | `h` ++ be(height)                  | 32-byte hash   |
//! | header             | `h` ++ be(height) ++ hash          | encoded header |
//! | body               | `b` ++ be(height) ++ hash          | encoded body   |
//! | receipts           | `r` ++ be(height) ++ hash          | receipts       |
//! | total difficulty   | `t` ++ be(height) ++ hash          | difficulty     |
//!
//! Canonical-hash and header keys share the `h` prefix and are told apart by
//! length. Marker records live outside these families and never parse as
//! block keys.

use crate::{
    codec::{HEIGHT_LEN, encode_height},
    hash::Hash,
};

/// Marker holding the externally supplied chain head height (big-endian u64).
pub const CHAIN_HEAD_HEIGHT_KEY: &[u8] = b"chain-head-height";

/// Head marker written by legacy datasets (big-endian u64).
pub const LEGACY_HEAD_KEY: &[u8] = b"LastBlock";

/// Replay checkpoint: last replayed height, inclusive (big-endian u64).
pub const LAST_REPLAYED_HEIGHT_KEY: &[u8] = b"LastReplayedHeight";

/// Prefix shared by canonical-hash and header keys.
pub const HEADER_PREFIX: u8 = b'h';

/// Prefix of block body keys.
pub const BODY_PREFIX: u8 = b'b';

/// Prefix of receipt keys.
pub const RECEIPTS_PREFIX: u8 = b'r';

/// Prefix of total-difficulty keys.
pub const TD_PREFIX: u8 = b't';

/// Length of a canonical-hash key.
pub const CANONICAL_KEY_LEN: usize = 1 + HEIGHT_LEN;

/// Length of a header, body, receipts or difficulty key.
pub const BLOCK_KEY_LEN: usize = 1 + HEIGHT_LEN + 32;

/// The family a block key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Canonical hash at a height.
    CanonicalHash,
    /// Block header.
    Header,
    /// Block body.
    Body,
    /// Block receipts.
    Receipts,
    /// Total difficulty.
    TotalDifficulty,
}

/// Key of the canonical hash at `height`.
pub fn canonical_hash_key(height: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(CANONICAL_KEY_LEN);
    key.push(HEADER_PREFIX);
    key.extend_from_slice(&encode_height(height));
    key
}

/// Key of the header of block `(height, hash)`.
pub fn header_key(height: u64, hash: &Hash) -> Vec<u8> {
    block_key(HEADER_PREFIX, height, hash)
}

/// Key of the body of block `(height, hash)`.
pub fn body_key(height: u64, hash: &Hash) -> Vec<u8> {
    block_key(BODY_PREFIX, height, hash)
}

/// Key of the receipts of block `(height, hash)`.
pub fn receipts_key(height: u64, hash: &Hash) -> Vec<u8> {
    block_key(RECEIPTS_PREFIX, height, hash)
}

/// Key of the total difficulty of block `(height, hash)`.
pub fn td_key(height: u64, hash: &Hash) -> Vec<u8> {
    block_key(TD_PREFIX, height, hash)
}

fn block_key(prefix: u8, height: u64, hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(BLOCK_KEY_LEN);
    key.push(prefix);
    key.extend_from_slice(&encode_height(height));
    key.extend_from_slice(hash);
    key
}

/// Classifies a key of the chain schema and extracts its embedded height.
///
/// Returns `None` for keys outside the schema (markers, arbitrary caller keys).
pub fn parse_block_key(key: &[u8]) -> Option<(RecordKind, u64)> {
    let kind = match (key.first()?, key.len()) {
        (&HEADER_PREFIX, CANONICAL_KEY_LEN) => RecordKind::CanonicalHash,
        (&HEADER_PREFIX, BLOCK_KEY_LEN) => RecordKind::Header,
        (&BODY_PREFIX, BLOCK_KEY_LEN) => RecordKind::Body,
        (&RECEIPTS_PREFIX, BLOCK_KEY_LEN) => RecordKind::Receipts,
        (&TD_PREFIX, BLOCK_KEY_LEN) => RecordKind::TotalDifficulty,
        _ => return None,
    };
    let height: [u8; HEIGHT_LEN] = key.get(1..1 + HEIGHT_LEN)?.try_into().ok()?;
    Some((kind, u64::from_be_bytes(height)))
}

/// Height embedded in a chain-schema key, if any.
#[inline]
pub fn block_height_of(key: &[u8]) -> Option<u64> {
    parse_block_key(key).map(|(_, height)| height)
}
