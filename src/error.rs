use std::path::PathBuf;

use thiserror::Error;

use crate::archive::ContainerKind;
use crate::codec::CodecError;

/// Everything that can stop an extraction run.
///
/// All variants are terminal for the run that produced them. Outputs already
/// written by sibling entries are left in place.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Header entry count is zero or negative.
    #[error("invalid {kind} archive: entry count = {count}")]
    MalformedContainer { kind: ContainerKind, count: i32 },

    /// The index table ends before all declared records could be read.
    #[error(
        "truncated {kind} index at entry {entry}: expected {expected} bytes, got {actual}"
    )]
    TruncatedIndex {
        kind: ContainerKind,
        entry: usize,
        expected: usize,
        actual: usize,
    },

    #[error("failed to read {kind} index")]
    IndexReadFailed {
        kind: ContainerKind,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid table[{index}]: off {offset}, size {size}")]
    InvalidEntry { index: usize, offset: i32, size: i32 },

    #[error("short read for entry {index}: expected {expected} bytes, got {actual}")]
    ShortRead {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("failed to read entry {index}")]
    ReadFailed {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode entry {index}")]
    DecodeFailed {
        index: usize,
        #[source]
        source: CodecError,
    },

    #[error("failed to write '{}'", path.display())]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open '{}'", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{}' is not a .nwa/.nwk/.ovk file", path.display())]
    UnknownContainer { path: PathBuf },

    #[error("extraction task failed")]
    TaskFailed(#[from] tokio::task::JoinError),
}

impl ExtractError {
    /// Entry index the error refers to, if it is tied to one.
    pub fn entry_index(&self) -> Option<usize> {
        match self {
            ExtractError::TruncatedIndex { entry, .. } => Some(*entry),
            ExtractError::InvalidEntry { index, .. }
            | ExtractError::ShortRead { index, .. }
            | ExtractError::ReadFailed { index, .. }
            | ExtractError::DecodeFailed { index, .. } => Some(*index),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
