//! Block hash helpers.
//!
//! The engine treats block hashes as opaque 32-byte values supplied by callers.
//! SHA-256 is only used to derive deterministic hashes for fixtures and tools.

use sha2::{Digest, Sha256};

/// A 32-byte block hash.
pub type Hash = [u8; 32];

/// Zero hash: 32 zero bytes. The parent hash of the genesis block.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Computes the SHA-256 hash of arbitrary data.
#[inline]
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Returns true if every byte of `hash` is zero.
///
/// An empty slice counts as zero.
#[inline]
pub fn is_zero_hash(hash: &[u8]) -> bool {
    hash.iter().all(|b| *b == 0)
}

/// Converts a slice into a [`Hash`], returning `None` unless it is 32 bytes.
#[inline]
pub fn hash_from_slice(bytes: &[u8]) -> Option<Hash> {
    bytes.try_into().ok()
}

/// Hex-encodes the first four bytes of a hash for log output.
pub fn short_hex(hash: &[u8]) -> String {
    hex::encode(&hash[..hash.len().min(4)])
}
