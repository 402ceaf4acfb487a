//! Error types for the key-value and ancient stores.

use std::{io, path::PathBuf};

use snafu::Snafu;
use tierdb_types::CodecError;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`KvStore`](crate::KvStore),
/// [`AncientStore`](crate::AncientStore) and the capability traits.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Key absent. A normal negative result, not a failure.
    #[snafu(display("Key not found"))]
    NotFound,

    /// Ancient item absent.
    #[snafu(display("Ancient item {index} not found in table {table}"))]
    AncientNotFound {
        /// Table that was queried.
        table: String,
        /// Item index that was queried.
        index: u64,
    },

    /// The handle does not provide this capability.
    #[snafu(display("Operation not supported: {operation}"))]
    Unsupported {
        /// The rejected operation.
        operation: String,
    },

    /// Mutation attempted through a read-only handle.
    #[snafu(display("Store is read-only"))]
    ReadOnly,

    /// Operation issued after `close()`.
    #[snafu(display("Store is closed"))]
    Closed,

    /// Read issued through a snapshot after `release()`.
    #[snafu(display("Snapshot has been released"))]
    SnapshotReleased,

    /// Table name not registered with the ancient store.
    #[snafu(display("Unknown ancient table: {table}"))]
    UnknownTable {
        /// The unregistered table name.
        table: String,
    },

    /// Read below the ancient tail.
    #[snafu(display("Index {index} of table {table} is outside [{tail}, {ancients})"))]
    OutOfBounds {
        /// Table that was queried.
        table: String,
        /// Requested index.
        index: u64,
        /// Current inclusive lower bound.
        tail: u64,
        /// Current exclusive upper bound.
        ancients: u64,
    },

    /// An operation would break, or found broken, a structural invariant.
    #[snafu(display("Invariant violation: {message}"))]
    InvariantViolation {
        /// Description of the violated invariant.
        message: String,
    },

    /// A shared read-only handle was requested on a path that does not exist.
    #[snafu(display("No store exists at {}", path.display()))]
    MissingPath {
        /// The missing path.
        path: PathBuf,
    },

    /// A simulated crash fired by a [`CrashInjector`](crate::CrashInjector).
    #[snafu(display("Injected crash at {point}"))]
    InjectedCrash {
        /// Name of the crash point that fired.
        point: String,
    },

    /// The backend could not open the database file.
    #[snafu(display("Failed to open store at {}: {source}", path.display()))]
    Open {
        /// Path that failed to open.
        path: PathBuf,
        /// The underlying redb error.
        source: redb::DatabaseError,
    },

    /// Transaction could not be started.
    #[snafu(display("Transaction error: {source}"))]
    Transaction {
        /// The underlying redb error.
        source: redb::TransactionError,
    },

    /// Table could not be opened.
    #[snafu(display("Table error: {source}"))]
    Table {
        /// The underlying redb error.
        source: redb::TableError,
    },

    /// Backend read or write failed.
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// The underlying redb error.
        source: redb::StorageError,
    },

    /// Transaction commit failed.
    #[snafu(display("Commit error: {source}"))]
    Commit {
        /// The underlying redb error.
        source: redb::CommitError,
    },

    /// Compaction failed.
    #[snafu(display("Compaction error: {source}"))]
    Compaction {
        /// The underlying redb error.
        source: redb::CompactionError,
    },

    /// A persisted value could not be decoded.
    #[snafu(display("Decoding {what} failed: {source}"))]
    Codec {
        /// What was being decoded.
        what: String,
        /// The underlying codec error.
        source: CodecError,
    },

    /// Filesystem error outside the backend.
    #[snafu(display("I/O error: {source}"))]
    Io {
        /// The underlying I/O error.
        source: io::Error,
    },
}

impl Error {
    /// Returns true for the "absent" conditions ([`Error::NotFound`] and
    /// [`Error::AncientNotFound`]).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound | Self::AncientNotFound { .. })
    }

    /// Returns true if the error reports a violated invariant.
    ///
    /// These indicate corruption or a caller bug and are never retried.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }

    /// Returns true for [`Error::Unsupported`] and [`Error::ReadOnly`].
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. } | Self::ReadOnly)
    }
}

impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Self::Io { source }
    }
}
