//! Error types for btnet-protocol.

use thiserror::Error;

/// Errors raised while parsing or validating a device line.
///
/// All of these abort the current device session; the worker tears the
/// connection down and retries after its error wait.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Length token did not match the line content.
    #[error("length check failed: line is {actual} chars, token says {expected}")]
    LengthMismatch {
        /// Length claimed by the token.
        expected: usize,
        /// Actual character count of the pre-token content.
        actual: usize,
    },

    /// CRC token did not match the line content.
    #[error("crc16 check failed: computed {computed:04x}, token says {token:04x}")]
    ChecksumMismatch {
        /// Checksum computed over the pre-token content.
        computed: u16,
        /// Checksum claimed by the token.
        token: u16,
    },

    /// Integrity token was not a decimal length or hex checksum.
    #[error("unparseable integrity token: {0:?}")]
    BadToken(String),

    /// DATA value field was not a number.
    #[error("unparseable sample value: {0:?}")]
    BadValue(String),

    /// DATA line too short to carry a sample.
    #[error("malformed DATA line: {0:?}")]
    MalformedData(String),
}
