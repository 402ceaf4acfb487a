//! Core types for the tierdb chain-data storage engine.
//!
//! This crate provides the pieces every other layer agrees on:
//! - Configuration structs with validating builders
//! - Big-endian height codec used by markers, checkpoints and ancient keys
//! - The chain key schema (canonical hash, header, body, receipts, difficulty)
//! - Block hash helpers

#![warn(missing_docs)]

pub mod codec;
pub mod config;
pub mod hash;
pub mod schema;

pub use codec::{CodecError, decode_height, encode_height};
pub use hash::{Hash, ZERO_HASH, hash_from_slice, is_zero_hash, sha256, short_hex};
