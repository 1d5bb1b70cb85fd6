//! Error types for protocol operations

use thiserror::Error;

/// Protocol-specific errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// I/O error on the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record larger than the codec accepts
    #[error("Record too large: {size} bytes (max: {max})")]
    RecordTooLarge {
        /// Actual record size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Stream ended in the middle of a record
    #[error("Stream ended inside a record ({buffered} bytes buffered)")]
    TruncatedRecord {
        /// Bytes received for the unfinished record
        buffered: usize,
    },

    /// Frame does not follow the `id SEP command [SEP payload]` layout
    #[error("Invalid frame format: {0}")]
    InvalidFrame(&'static str),

    /// Payload could not be decoded into the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Value could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// Whether the error came from the transport rather than from the bytes
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::TruncatedRecord { .. })
    }
}
