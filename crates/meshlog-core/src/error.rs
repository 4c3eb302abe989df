//! Error types for meshlog

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Meshlog core error types
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    /// Entry stream ended in the middle of a record
    #[error("truncated entry: {0}")]
    Truncated(&'static str),

    /// Length prefix does not fit in a u64
    #[error("length prefix overflows u64")]
    VarintOverflow,

    /// Declared entry length exceeds the frame limit
    #[error("entry of {0} bytes exceeds maximum frame size")]
    Oversized(u64),

    /// Instant cannot be represented in the protocol encoding
    #[error("timestamp out of range")]
    TimestampOutOfRange,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
