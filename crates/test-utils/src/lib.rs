//! Shared test utilities for tierdb crates.
//!
//! - [`TestDir`]: scratch directory handing out tier file paths
//! - [`assert_eventually`]: polls a background job's effect until a deadline
//! - [`chain`]: deterministic chain-schema and sequential fixtures
//! - [`strategies`]: proptest generators for store, ancient and replay tests

#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::disallowed_methods))]

mod test_dir;
pub use test_dir::TestDir;

mod assertions;
pub use assertions::assert_eventually;

pub mod chain;
pub use chain::{ChainBlock, block_hash, chain_records, sequential_records};

pub mod strategies;
