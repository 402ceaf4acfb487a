//! Deterministic chain fixtures.
//!
//! Blocks are derived from their height alone, so a test can regenerate the
//! exact records it wrote without keeping them around.

use tierdb_types::{
    Hash, ZERO_HASH, encode_height,
    schema::{
        CHAIN_HEAD_HEIGHT_KEY, LEGACY_HEAD_KEY, body_key, canonical_hash_key, header_key,
        receipts_key, td_key,
    },
    sha256,
};

/// A key and its value.
pub type Record = (Vec<u8>, Vec<u8>);

/// Hash of the fixture block at `height`.
#[must_use]
pub fn block_hash(height: u64) -> Hash {
    sha256(format!("block-{height}").as_bytes())
}

/// One fixture block with all of its record payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBlock {
    /// Block height.
    pub height: u64,
    /// Block hash.
    pub hash: Hash,
    /// Parent hash; zero for genesis.
    pub parent_hash: Hash,
    /// Encoded header: parent hash followed by big-endian height.
    pub header: Vec<u8>,
    /// Body payload.
    pub body: Vec<u8>,
    /// Receipts payload.
    pub receipts: Vec<u8>,
    /// Total difficulty, big-endian.
    pub difficulty: Vec<u8>,
}

impl ChainBlock {
    /// Builds the fixture block at `height`.
    #[must_use]
    pub fn at(height: u64) -> Self {
        let parent_hash = if height == 0 { ZERO_HASH } else { block_hash(height - 1) };
        let mut header = parent_hash.to_vec();
        header.extend_from_slice(&encode_height(height));
        Self {
            height,
            hash: block_hash(height),
            parent_hash,
            header,
            body: format!("body-{height}").into_bytes(),
            receipts: format!("receipts-{height}").into_bytes(),
            difficulty: encode_height(height + 1).to_vec(),
        }
    }

    /// Every schema record of this block: canonical hash, header, body,
    /// receipts and total difficulty.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        vec![
            (canonical_hash_key(self.height), self.hash.to_vec()),
            (header_key(self.height, &self.hash), self.header.clone()),
            (body_key(self.height, &self.hash), self.body.clone()),
            (receipts_key(self.height, &self.hash), self.receipts.clone()),
            (td_key(self.height, &self.hash), self.difficulty.clone()),
        ]
    }
}

/// All records for blocks `0..=tip`.
#[must_use]
pub fn chain_records(tip: u64) -> Vec<Record> {
    (0..=tip).flat_map(|height| ChainBlock::at(height).records()).collect()
}

/// Chain-head marker record announcing `height`.
#[must_use]
pub fn chain_head_record(height: u64) -> Record {
    (CHAIN_HEAD_HEIGHT_KEY.to_vec(), encode_height(height).to_vec())
}

/// Legacy head marker record announcing `height`.
#[must_use]
pub fn legacy_head_record(height: u64) -> Record {
    (LEGACY_HEAD_KEY.to_vec(), encode_height(height).to_vec())
}

/// Plain `block-<height>` records for `0..count`, valued `data-<height>`.
#[must_use]
pub fn sequential_records(count: u64) -> Vec<Record> {
    (0..count)
        .map(|height| {
            (format!("block-{height}").into_bytes(), format!("data-{height}").into_bytes())
        })
        .collect()
}
