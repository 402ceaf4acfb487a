//! Proptest strategies for storage tests.
//!
//! Keys are drawn from a small alphabet so that generated operation sequences
//! hit the same keys repeatedly: overwrites, deletes of present keys, and
//! prefix scans with more than one match.
//!
//! # Usage
//!
//! ```no_run
//! use tierdb_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(ops in strategies::arb_kv_ops()) {
//!         // apply ops to a store and to a model, compare
//!     }
//! }
//! ```

use proptest::prelude::*;

/// One generated store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    /// Store a value.
    Put(Vec<u8>, Vec<u8>),
    /// Remove a key.
    Delete(Vec<u8>),
}

/// Generates a key of 1-4 bytes drawn from `a..=d`.
pub fn arb_key() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(b'a'..=b'd', 1..=4)
}

/// Generates a value of 0-63 random bytes.
pub fn arb_value() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..64)
}

/// Generates a put (3 in 4) or delete (1 in 4).
pub fn arb_kv_op() -> impl Strategy<Value = KvOp> {
    prop_oneof![
        3 => (arb_key(), arb_value()).prop_map(|(k, v)| KvOp::Put(k, v)),
        1 => arb_key().prop_map(KvOp::Delete),
    ]
}

/// Generates 1-40 mutations.
pub fn arb_kv_ops() -> impl Strategy<Value = Vec<KvOp>> {
    proptest::collection::vec(arb_kv_op(), 1..40)
}

/// Generates a sequence of ancient-store actions: `true` appends a block,
/// `false` truncates.
pub fn arb_ancient_actions() -> impl Strategy<Value = Vec<(bool, u8)>> {
    proptest::collection::vec((prop::bool::weighted(0.7), any::<u8>()), 1..30)
}

/// Generates a replay scenario: chain length, batch size and the batch after
/// which the first run crashes.
pub fn arb_replay_plan() -> impl Strategy<Value = (u64, u64, u32)> {
    (1u64..40, 1u64..8, 1u32..6)
}
