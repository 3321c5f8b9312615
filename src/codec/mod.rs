//! Stream decoders applied to archive entries.
//!
//! The extraction pipeline only sees the [`Codec`] trait. [`NwaDecoder`] turns
//! NWA streams into WAV files; [`Passthrough`] returns its input untouched.

pub mod nwa;

pub use nwa::NwaDecoder;

use thiserror::Error;

/// The interface the extractor uses to transform one entry's bytes.
///
/// Decoding is synchronous and may be CPU heavy; callers run it on a
/// blocking thread.
pub trait Codec: Send + Sync {
    /// Take a whole encoded stream and return the decoded output file bytes.
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Simply copies the data byte-for-byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Codec for Passthrough {
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(data.to_vec())
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid stream header: {0}")]
    InvalidHeader(String),

    #[error("stream truncated: needed {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("bit stream ended after {decoded} of {expected} samples")]
    ShortBlock { decoded: usize, expected: usize },

    #[error("unsupported stream: {0}")]
    Unsupported(String),

    #[error("malformed stream")]
    Io(#[from] std::io::Error),

    #[error("WAV encoding failed")]
    Wav(#[from] hound::Error),
}
