//! Codec error types

use thiserror::Error;

/// yEnc codec and article envelope errors
#[derive(Error, Debug)]
pub enum Error {
    /// IO error from the caller's reader or writer, propagated unchanged
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// End of article without finding any binary data (`=ybegin` never seen)
    #[error("no binary data")]
    DataMissing,

    /// Truncated or corrupted article (missing `=yend`, size mismatch, partial line at EOF)
    #[error("data corruption detected: {0}")]
    DataCorruption(String),

    /// Decoded data does not match the `crc32`/`pcrc32` declared in the trailer
    #[error("crc32 mismatch: expected {expected:#010x} but got {actual:#010x}")]
    CrcMismatch {
        /// CRC-32 declared in the `=yend` trailer
        expected: u32,
        /// CRC-32 computed over the decoded bytes
        actual: u32,
    },

    /// Destination buffer is smaller than the source being decoded
    #[error("destination must be at least the length of source")]
    DestinationTooSmall,

    /// Input is uuencoded; detection is supported but decoding is not
    #[error("data is uuencoded")]
    Uu,

    /// Invalid encoder metadata
    #[error("invalid metadata: {0}")]
    InvalidMeta(String),
}

/// Result type alias using the codec [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
