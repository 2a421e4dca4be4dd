//! Error types for the streaming ZIP decoder

use std::io;

/// Result type for decode operations
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Error types that can occur while decoding a ZIP archive
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error surfaced by the producer
    Io(io::Error),
    /// The producer ended before a required field finished arriving
    TruncatedStream,
    /// A 4-byte signature at a member boundary was none of local file
    /// header, central directory header, or end of central directory
    UnexpectedSignature(u32),
    /// Compression method other than stored (0) or deflate (8)
    UnsupportedCompression(u16),
    /// A general-purpose flag bit the decoder cannot honour (e.g. encryption)
    UnsupportedFlag(u16),
    /// A base size field was the ZIP64 sentinel `0xFFFFFFFF` but the ZIP64
    /// extra field did not carry a replacement value
    MissingZip64Field,
    /// A declared or descriptor-reported size disagreed with the number of
    /// bytes actually produced or consumed
    LengthMismatch,
    /// The deflate stream was malformed
    DecompressionError(flate2::DecompressError),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Io(e) => write!(f, "I/O error: {}", e),
            DecodeError::TruncatedStream => {
                write!(f, "input ended before a required field completed")
            }
            DecodeError::UnexpectedSignature(sig) => {
                write!(f, "unexpected signature at member boundary: 0x{:08x}", sig)
            }
            DecodeError::UnsupportedCompression(method) => {
                write!(f, "unsupported compression method: {}", method)
            }
            DecodeError::UnsupportedFlag(flags) => {
                write!(f, "unsupported general-purpose flag bits: 0x{:04x}", flags)
            }
            DecodeError::MissingZip64Field => write!(
                f,
                "ZIP64 extra field missing a size the local header deferred to it"
            ),
            DecodeError::LengthMismatch => write!(
                f,
                "declared size disagreed with bytes actually produced or consumed"
            ),
            DecodeError::DecompressionError(e) => write!(f, "deflate error: {}", e),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<io::Error> for DecodeError {
    fn from(err: io::Error) -> Self {
        DecodeError::Io(err)
    }
}

impl From<flate2::DecompressError> for DecodeError {
    fn from(err: flate2::DecompressError) -> Self {
        DecodeError::DecompressionError(err)
    }
}
