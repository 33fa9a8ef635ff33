//! Error types for the replay parser.
//!
//! This module defines the error hierarchy for every failure case the
//! decoder pipeline can hit: I/O failures, container validation, the
//! size-prefix and tree-blob codecs, bit-level exhaustion, per-packet
//! semantic failures, and multi-part stitching conflicts.
//!
//! Two classes of errors exist by convention (enforced by the callers,
//! not the types): *stream-fatal* errors abort the current decode
//! (`BadMagic`, `BadSizePrefix`, truncation of a declared region,
//! decompression failures of the packet stream), while *packet-level*
//! errors are demoted to `parse_error` on the affected packet and the
//! stream continues.

use thiserror::Error;

/// The main error type for replay parsing operations.
///
/// # Example
///
/// ```
/// use wrpl_parser::error::{ReplayError, Result};
///
/// fn example_operation() -> Result<()> {
///     Err(ReplayError::PacketMalformed {
///         reason: "missing required field".to_string(),
///     })
/// }
/// ```
#[derive(Error, Debug)]
pub enum ReplayError {
    /// An I/O error occurred while reading or writing replay data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bytes demanded by a declared size are not present.
    ///
    /// This typically indicates a truncated replay file or fragment.
    #[error("truncated data: expected {expected} bytes, but only {available} available")]
    Truncated {
        /// The number of bytes that were expected to be available.
        expected: usize,
        /// The actual number of bytes available.
        available: usize,
    },

    /// The file's magic bytes do not match the replay container magic.
    #[error("wrong magic bytes: expected {expected}, found {found}")]
    BadMagic {
        /// The expected magic bytes (as hex string for display).
        expected: String,
        /// The actual bytes found at the start of the file (as hex string).
        found: String,
    },

    /// A size prefix in the packet stream used a reserved leading pattern.
    #[error("invalid size prefix byte 0x{first:02X}")]
    BadSizePrefix {
        /// The offending first byte of the prefix.
        first: u8,
    },

    /// A tree blob carried an unknown variant tag or failed structural
    /// validation.
    #[error("invalid tree blob: {reason}")]
    BadTreeHeader {
        /// A description of what makes the blob invalid.
        reason: String,
    },

    /// A tree blob variant that requires external data (a name dictionary
    /// or a zstd dictionary) and cannot be decoded standalone.
    #[error("unsupported tree blob variant: {variant}")]
    Unsupported {
        /// The name of the unsupported variant.
        variant: &'static str,
    },

    /// A semantic packet parser could not satisfy its schema.
    ///
    /// Attached to the raw packet as `parse_error`; never fatal to the
    /// stream.
    #[error("malformed packet payload: {reason}")]
    PacketMalformed {
        /// A description of the schema violation.
        reason: String,
    },

    /// A bit-level read ran past the end of the buffer.
    #[error("bit reader exhausted: requested {requested} bits, {available} available")]
    Eof {
        /// The number of bits requested.
        requested: usize,
        /// The number of bits that were actually available.
        available: usize,
    },

    /// Decompression of a zlib, zstd or LZ4 region failed.
    #[error("decompression failed: {reason}")]
    Decompression {
        /// A description of the decompression failure.
        reason: String,
    },

    /// Multi-part stitching found fragments from different sessions.
    #[error("multiple sessions {first:016x} and {second:016x} in fragment set")]
    SessionMismatch {
        /// The session id of the first fragment.
        first: u64,
        /// The conflicting session id.
        second: u64,
    },

    /// Multi-part stitching found no part 0 (or no server fragments at all).
    #[error("no replay part 0 found in fragment set")]
    MissingPartZero,

    /// Server fragment part numbers are not consecutive.
    ///
    /// Server parts after part 0 must form the sequence 1, 3, 5, ….
    #[error("found part {found} but previous server part was {previous}")]
    FragmentGap {
        /// The last accepted part number.
        previous: i32,
        /// The out-of-sequence part number.
        found: i32,
    },

    /// A replay handed to the writer is internally inconsistent.
    #[error("invalid replay: {reason}")]
    InvalidReplay {
        /// A description of the inconsistency.
        reason: String,
    },
}

impl ReplayError {
    /// Creates a `Truncated` error with the given sizes.
    #[must_use]
    pub fn truncated(expected: usize, available: usize) -> Self {
        ReplayError::Truncated { expected, available }
    }

    /// Creates a `BadMagic` error from the expected and found byte slices.
    ///
    /// The bytes are converted to hex strings for human-readable display.
    ///
    /// # Example
    ///
    /// ```
    /// use wrpl_parser::error::ReplayError;
    ///
    /// let err = ReplayError::bad_magic(&[0xE5, 0xAC, 0x00, 0x10], &[0x00; 4]);
    /// assert!(err.to_string().contains("wrong magic"));
    /// ```
    #[must_use]
    pub fn bad_magic(expected: &[u8], found: &[u8]) -> Self {
        ReplayError::BadMagic {
            expected: bytes_to_hex(expected),
            found: bytes_to_hex(found),
        }
    }

    /// Creates an `Eof` error with the given bit counts.
    #[must_use]
    pub fn eof(requested: usize, available: usize) -> Self {
        ReplayError::Eof { requested, available }
    }

    /// Creates a `PacketMalformed` error with the given reason.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        ReplayError::PacketMalformed { reason: reason.into() }
    }

    /// Creates a `BadTreeHeader` error with the given reason.
    #[must_use]
    pub fn bad_tree(reason: impl Into<String>) -> Self {
        ReplayError::BadTreeHeader { reason: reason.into() }
    }

    /// Creates a `Decompression` error with the given reason.
    #[must_use]
    pub fn decompression(reason: impl Into<String>) -> Self {
        ReplayError::Decompression { reason: reason.into() }
    }
}

/// Converts a byte slice to a hexadecimal string representation.
///
/// Slices of 8 bytes or less format as space-separated hex values;
/// longer slices show the first 8 bytes followed by the total count.
fn bytes_to_hex(bytes: &[u8]) -> String {
    if bytes.len() <= 8 {
        bytes
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        let prefix: String = bytes[..8]
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{prefix}... ({} bytes total)", bytes.len())
    }
}

/// A specialized Result type for replay parsing operations.
pub type Result<T> = std::result::Result<T, ReplayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReplayError::truncated(1226, 40);
        assert!(err.to_string().contains("expected 1226 bytes"));
        assert!(err.to_string().contains("40 available"));

        let err = ReplayError::BadSizePrefix { first: 0xC1 };
        assert!(err.to_string().contains("0xC1"));

        let err = ReplayError::Unsupported { variant: "SLIM_ZSTD" };
        assert!(err.to_string().contains("SLIM_ZSTD"));

        let err = ReplayError::SessionMismatch {
            first: 0xDEAD,
            second: 0xBEEF,
        };
        assert!(err.to_string().contains("000000000000dead"));
        assert!(err.to_string().contains("000000000000beef"));

        let err = ReplayError::eof(16, 3);
        assert!(err.to_string().contains("16 bits"));
    }

    #[test]
    fn test_bad_magic_helper() {
        let err = ReplayError::bad_magic(&[0xE5, 0xAC, 0x00, 0x10], b"BAD!");
        match err {
            ReplayError::BadMagic { expected, found } => {
                assert_eq!(expected, "E5 AC 00 10");
                assert_eq!(found, "42 41 44 21");
            }
            _ => panic!("expected BadMagic variant"),
        }
    }

    #[test]
    fn test_bytes_to_hex_long() {
        let bytes = [0u8; 20];
        let result = bytes_to_hex(&bytes);
        assert!(result.contains("..."));
        assert!(result.contains("20 bytes total"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "test");
        let err: ReplayError = io_err.into();
        assert!(matches!(err, ReplayError::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ReplayError>();
    }
}
