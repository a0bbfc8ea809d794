//! Error types for chorus-wire.

use thiserror::Error;

/// Result type for chorus-wire operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a received frame is thrown away.
///
/// Every variant is a transport-level corruption: the caller drops the frame
/// and never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Frame length does not match the fixed layout for its version.
    #[error("wrong frame length: expected {expected}, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    /// Trailing XOR checksum does not match the frame contents.
    #[error("checksum mismatch: computed {computed:#04x}, frame carries {carried:#04x}")]
    Corrupt { computed: u8, carried: u8 },

    /// Leading version byte is not a protocol we speak.
    #[error("unknown protocol version {0:#04x}")]
    UnknownVersion(u8),

    /// A field holds a value outside its domain (bad enum code, bad flag,
    /// component count outside 1..=8, non-finite float).
    #[error("invalid value {value:#04x} in field `{field}`")]
    InvalidField { field: &'static str, value: u32 },
}

/// Errors from peer bookkeeping.
#[derive(Debug, Error)]
pub enum Error {
    /// Frame could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A bounded table is full and the policy is to reject newcomers.
    #[error("{what} is full ({capacity} entries)")]
    CapacityExceeded { what: &'static str, capacity: usize },
}
