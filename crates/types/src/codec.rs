//! Big-endian height encoding.
//!
//! Heights are stored as 8-byte big-endian integers everywhere they appear in a
//! key or a marker value, so that plain lexicographic iteration enumerates them
//! in ascending numeric order.

use snafu::Snafu;

/// Encoded size of a height.
pub const HEIGHT_LEN: usize = 8;

/// Error type for codec operations.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum CodecError {
    /// The encoded height did not have exactly eight bytes.
    #[snafu(display("Invalid height encoding: expected {HEIGHT_LEN} bytes, got {len}"))]
    InvalidHeightLength {
        /// Length of the rejected input.
        len: usize,
    },
}

/// Encodes a height as 8 big-endian bytes.
#[inline]
pub fn encode_height(height: u64) -> [u8; HEIGHT_LEN] {
    height.to_be_bytes()
}

/// Decodes an 8-byte big-endian height.
///
/// # Errors
///
/// Returns [`CodecError::InvalidHeightLength`] if `bytes` is not exactly eight
/// bytes long.
pub fn decode_height(bytes: &[u8]) -> Result<u64, CodecError> {
    let array: [u8; HEIGHT_LEN] =
        bytes.try_into().map_err(|_| CodecError::InvalidHeightLength { len: bytes.len() })?;
    Ok(u64::from_be_bytes(array))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_height_roundtrip_edges() {
        for height in [0, 1, 255, 256, u64::from(u32::MAX), u64::MAX] {
            assert_eq!(decode_height(&encode_height(height)).unwrap(), height);
        }
    }

    #[test]
    fn test_height_encoding_is_big_endian() {
        assert_eq!(encode_height(1), [0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(encode_height(0x0102), [0, 0, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_lexicographic_order_matches_numeric_order() {
        let heights = [0u64, 9, 10, 255, 256, 1_000_000, u64::MAX - 1];
        for pair in heights.windows(2) {
            assert!(encode_height(pair[0]) < encode_height(pair[1]));
        }
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert_eq!(decode_height(&[]), Err(CodecError::InvalidHeightLength { len: 0 }));
        assert_eq!(decode_height(&[0; 7]), Err(CodecError::InvalidHeightLength { len: 7 }));
        let err = decode_height(&[0; 9]).unwrap_err();
        assert!(err.to_string().contains("got 9"));
    }
}
