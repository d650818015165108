//! Error types for the dct-watermark crate.

use crate::ledger::LedgerError;

/// Errors that can occur while embedding, extracting or verifying a watermark.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A block transform produced a non-finite value.
    #[error("transform failed for block ({block_x}, {block_y})")]
    Transform {
        /// Block column in the scan grid.
        block_x: u32,
        /// Block row in the scan grid.
        block_y: u32,
    },

    /// No window of the bitstream matched the preamble closely enough.
    #[error("sync preamble not found (best match {best_score}/{preamble_len})")]
    SyncNotFound {
        /// Number of matching bits at the best window.
        best_score: usize,
        /// Length of the preamble in bits.
        preamble_len: usize,
    },

    /// The bitstream ends before the declared frame does.
    #[error("insufficient bits: frame needs {needed}, only {available} available")]
    InsufficientBits {
        /// Bits required by the frame.
        needed: usize,
        /// Bits actually available.
        available: usize,
    },

    /// Neither the structured parse nor the field fallback recovered a payload.
    #[error("payload parse failed: {0}")]
    PayloadParse(String),

    /// The serialized payload does not fit the 16-bit length field.
    #[error("payload of {len} bytes exceeds the {max} byte frame limit")]
    PayloadTooLarge {
        /// Serialized payload length in bytes.
        len: usize,
        /// Maximum length the frame can declare.
        max: usize,
    },

    /// The ledger collaborator failed or is not configured.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(#[from] LedgerError),

    /// Payload serialization failed.
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image processing (load, save, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let io_err = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io_err.to_string().contains("gone"));

        let sync = Error::SyncNotFound {
            best_score: 11,
            preamble_len: 16,
        };
        assert!(sync.to_string().contains("11/16"));

        let short = Error::InsufficientBits {
            needed: 472,
            available: 64,
        };
        let msg = short.to_string();
        assert!(msg.contains("472"));
        assert!(msg.contains("64"));

        let block = Error::Transform {
            block_x: 3,
            block_y: 7,
        };
        assert!(block.to_string().contains("(3, 7)"));
    }

    #[test]
    fn ledger_errors_convert() {
        let err: Error = LedgerError::NotConfigured.into();
        assert!(matches!(err, Error::LedgerUnavailable(_)));
        assert!(err.to_string().starts_with("ledger unavailable"));
    }
}
