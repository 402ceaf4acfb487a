//! tierdb-store: embedded key-value and ancient storage.
//!
//! Every tier of the tierdb engine sits on a [`KvStore`]: one redb file with
//! a single byte-keyed table. On top of it, [`AncientStore`] keeps finalized
//! block data in append-only, index-addressed tables.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │          Capability traits (traits.rs)        │
//! │  reader · writer · range deleter · iteratee   │
//! │  batcher · ancient reader · ancient writer    │
//! └──────────┬─────────────────────┬──────────────┘
//!            │                     │
//! ┌──────────▼──────────┐ ┌────────▼──────────────┐
//! │      KvStore        │ │     AncientStore      │
//! │ batch · iterator ·  │ │ lockstep tables over  │
//! │ snapshot · reclaim  │ │ its own KvStore file  │
//! └──────────┬──────────┘ └────────┬──────────────┘
//!            │                     │
//! ┌──────────▼─────────────────────▼──────────────┐
//! │          redb (one file per store)            │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use tierdb_store::KvStore;
//!
//! let store = KvStore::open_in_memory()?;
//!
//! let mut batch = store.new_batch();
//! batch.put(b"block-1", b"payload");
//! batch.put(b"block-2", b"payload");
//! batch.write()?;
//!
//! for entry in store.new_iterator(b"block-", None)? {
//!     let (key, _value) = entry?;
//!     println!("{}", String::from_utf8_lossy(&key));
//! }
//! # Ok::<(), tierdb_store::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod ancient;
mod batch;
mod crash;
pub mod error;
mod iterator;
mod kv;
pub mod metrics;
mod reclaim;
mod snapshot;
mod traits;

pub use ancient::{AncientStore, AncientWriteOp, TableMeta};
pub use batch::{Batch, BatchOp};
pub use crash::{CrashInjector, CrashPoint};
pub use error::{Error, Result};
pub use iterator::KvIterator;
pub use kv::{KvStore, StoreStats};
pub use snapshot::Snapshot;
pub use traits::{
    AncientReader, AncientWriter, Batcher, Iteratee, KeyValueRangeDeleter, KeyValueReader,
    KeyValueWriter, KvPair,
};
