//! Replay error types.

use snafu::Snafu;

/// Result type alias for replay operations.
pub type Result<T, E = ReplayError> = std::result::Result<T, E>;

/// Errors returned by the [`Replayer`](crate::Replayer) and replay sources.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReplayError {
    /// Source or destination storage failed.
    #[snafu(display("Storage error: {source}"))]
    Store {
        /// The underlying storage error.
        source: tierdb_store::Error,
    },

    /// The source has no head marker and no blocks.
    #[snafu(display("Replay source is empty"))]
    EmptySource,

    /// The source has no canonical block at a height below its tip.
    #[snafu(display("Block {height} missing from replay source"))]
    MissingBlock {
        /// Height of the missing block.
        height: u64,
    },

    /// A block failed structural verification.
    #[snafu(display("Block {height} failed verification: {reason}"))]
    Verification {
        /// Height of the offending block.
        height: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// The checkpoint differs from the replay target after a run.
    #[snafu(display("Replay tip mismatch: expected {expected}, checkpoint at {found:?}"))]
    TipMismatch {
        /// Target height.
        expected: u64,
        /// Persisted checkpoint, if any.
        found: Option<u64>,
    },

    /// A record of the tip block differs between source and destination.
    #[snafu(display("Tip block {height} differs from source at key {key}"))]
    TipRecordMismatch {
        /// Tip height.
        height: u64,
        /// Hex of the differing key.
        key: String,
    },

    /// A simulated crash fired after a checkpoint commit.
    #[snafu(display("Injected crash after checkpoint {height}"))]
    InjectedCrash {
        /// Checkpoint committed before the crash.
        height: u64,
    },
}

impl ReplayError {
    /// Returns true for errors confined to one block, which
    /// `continue_on_error` may skip.
    pub fn is_block_error(&self) -> bool {
        matches!(self, Self::MissingBlock { .. } | Self::Verification { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ReplayError::Verification { height: 7, reason: "zero hash".into() };
        assert_eq!(err.to_string(), "Block 7 failed verification: zero hash");
        let err = ReplayError::TipMismatch { expected: 9, found: Some(4) };
        assert_eq!(err.to_string(), "Replay tip mismatch: expected 9, checkpoint at Some(4)");
    }

    #[test]
    fn test_block_errors() {
        assert!(ReplayError::MissingBlock { height: 1 }.is_block_error());
        assert!(!ReplayError::EmptySource.is_block_error());
        assert!(!ReplayError::InjectedCrash { height: 4 }.is_block_error());
    }
}
