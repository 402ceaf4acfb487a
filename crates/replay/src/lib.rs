//! tierdb-replay: resumable import of legacy datasets.
//!
//! A [`Replayer`] copies a [`ReplaySource`] height by height into the current
//! tier of a [`TieredDatabase`](tierdb_tiered::TieredDatabase). Progress is
//! checkpointed in the destination with every batch, so an interrupted run
//! resumes where it left off.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tierdb_replay::{ChainSource, Replayer};
//! use tierdb_tiered::TieredDatabase;
//! use tierdb_types::config::{ReplayConfig, TieredConfig};
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let source = ChainSource::open("/data/legacy.redb")?;
//! let config = TieredConfig::builder().current_path("/data/current.redb").build()?;
//! let destination = Arc::new(TieredDatabase::open(&config)?);
//!
//! let replayer = Replayer::builder()
//!     .source(source)
//!     .destination(destination)
//!     .config(ReplayConfig::builder().batch_size(1_000).build()?)
//!     .build();
//! let report = replayer.replay()?;
//! println!("replayed {} blocks up to {}", report.replayed, report.end_height);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
mod progress;
mod replayer;
mod source;

pub use error::{ReplayError, Result};
pub use replayer::{ReplayReport, ReplayStatus, Replayer};
pub use source::{ChainSource, ReplaySource, SequentialSource, SourceBlock};
