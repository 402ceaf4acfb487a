//! Archive eligibility policies.
//!
//! The archiver asks its policy, key by key, whether a record in the current
//! tier is finalized. [`HeightScoped`] reads the block height embedded in the
//! key and archives only records below the finalized height; records whose
//! key carries no recognizable height stay in current.

use std::fmt;

use tierdb_types::schema::block_height_of;

/// Decides which current-tier keys the archiver migrates.
///
/// Eligible records must not be written again once eligible. The archiver
/// deletes a moved key from current without comparing its value, so a write
/// landing between the archive commit and the delete is lost.
pub trait ArchivePolicy: Send + Sync + fmt::Debug {
    /// Returns true if `key` belongs to a block below `finalized_height`.
    fn should_archive(&self, key: &[u8], finalized_height: u64) -> bool;
}

/// Archives every key, regardless of height.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveAll;

impl ArchivePolicy for ArchiveAll {
    fn should_archive(&self, _key: &[u8], _finalized_height: u64) -> bool {
        true
    }
}

/// A key layout carrying a block height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFamily {
    /// Binary chain schema: one-byte family prefix, big-endian height and,
    /// for block records, the block hash.
    Chain,
    /// `<prefix><decimal height>`, e.g. `block-42`.
    Decimal {
        /// Bytes preceding the height digits.
        prefix: Vec<u8>,
    },
}

impl KeyFamily {
    /// A decimal family with the given prefix.
    pub fn decimal(prefix: impl Into<Vec<u8>>) -> Self {
        Self::Decimal { prefix: prefix.into() }
    }

    /// Height embedded in `key`, if `key` belongs to this family.
    pub fn height_of(&self, key: &[u8]) -> Option<u64> {
        match self {
            Self::Chain => block_height_of(key),
            Self::Decimal { prefix } => {
                let digits = key.strip_prefix(prefix.as_slice())?;
                if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
                    return None;
                }
                std::str::from_utf8(digits).ok()?.parse().ok()
            },
        }
    }
}

/// Archives keys whose embedded height is below the finalized height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeightScoped {
    families: Vec<KeyFamily>,
}

impl HeightScoped {
    /// Policy recognizing the given key families, tried in order.
    pub fn new(families: Vec<KeyFamily>) -> Self {
        Self { families }
    }

    /// Policy for the chain schema plus `block-<n>` keys.
    pub fn chain() -> Self {
        Self::new(vec![KeyFamily::Chain, KeyFamily::decimal("block-")])
    }

    /// Height of `key` under the first family that recognizes it.
    pub fn height_of(&self, key: &[u8]) -> Option<u64> {
        self.families.iter().find_map(|family| family.height_of(key))
    }
}

impl Default for HeightScoped {
    fn default() -> Self {
        Self::chain()
    }
}

impl ArchivePolicy for HeightScoped {
    fn should_archive(&self, key: &[u8], finalized_height: u64) -> bool {
        self.height_of(key).is_some_and(|height| height < finalized_height)
    }
}
