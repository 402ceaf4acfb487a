//! tierdb-tiered: current/archive tiering for chain data.
//!
//! A [`TieredDatabase`] puts a read-write current tier in front of an archive
//! tier and, optionally, an ancient store. The [`Archiver`] migrates finalized
//! records from current to archive in the background; the [`Freezer`] moves
//! canonical blocks into the ancient store.
//!
//! ## Data Flow
//!
//! ```text
//!  writes ──► current ──Archiver──► archive
//!                │                     │
//!                └──────Freezer──────► ancient
//!
//!  reads  ──► current ─NotFound─► archive
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tierdb_tiered::{Archiver, TieredDatabase};
//! use tierdb_types::config::{ArchiverConfig, TieredConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TieredConfig::builder()
//!     .current_path("/data/current.redb")
//!     .archive_path("/data/archive.redb")
//!     .build()?;
//! let db = Arc::new(TieredDatabase::open(&config)?);
//!
//! let archiver = Arc::new(
//!     Archiver::builder().database(Arc::clone(&db)).config(ArchiverConfig::default()).build(),
//! );
//! archiver.start();
//! // ... serve traffic ...
//! archiver.stop().await;
//! db.close()?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod archiver;
mod database;
mod freezer;
mod iterator;
mod policy;

pub use archiver::{ArchiveReport, Archiver, ArchiverStats};
pub use database::{ReadStats, TieredDatabase, TieredStats};
pub use freezer::{FreezeReport, Freezer};
pub use iterator::MergedIterator;
pub use policy::{ArchiveAll, ArchivePolicy, HeightScoped, KeyFamily};
