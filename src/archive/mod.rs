//! RealLive audio container parsing and extraction.
//!
//! ## Architecture
//!
//! - [`structures`]: container kinds, index records and extraction descriptors
//! - [`parser`]: decoding of the index table at the start of NWK/OVK archives
//! - [`extractor`]: per-entry dispatch and the concurrent coordinator
//!
//! ## Containers
//!
//! An `.nwa` file is a single stream and has no index. `.nwk` and `.ovk`
//! archives begin with an entry count and a table of `(size, offset, id)`
//! records pointing into the rest of the file. NWK entries are NWA streams
//! and are decoded to WAV; OVK entries are complete Ogg files and are
//! copied verbatim.
//!
//! Each entry is extracted by its own task with its own file handle. Entries
//! never overlap in the output namespace because names come from the
//! record's sequence id.

mod extractor;
mod parser;
mod structures;

pub use extractor::{ArchiveExtractor, dispatch, read_slice};
pub use parser::{HEADER_SIZE, index_len, parse_index};
pub use structures::*;
