//! # nwa-extract
//!
//! Extracts voice and music streams from the audio containers used by the
//! RealLive visual-novel engine and converts them to playable files.
//!
//! ## Features
//!
//! - `.nwa` music streams decoded to WAV
//! - `.nwk` voice archives split into one WAV per entry
//! - `.ovk` voice archives split into one Ogg file per entry
//! - Every archive entry extracted concurrently, each with its own file handle
//! - Batch extraction of whole directories from the command line
//!
//! ## Example
//!
//! ```no_run
//! use nwa_extract::{ArchiveExtractor, ExtractConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ExtractConfig::new("voice/z0001.ovk", None, None)?;
//!     let extractor = ArchiveExtractor::open(&config)?;
//!
//!     let report = extractor.run().await?;
//!     for entry in &report.written {
//!         println!("{}", entry.path.display());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod io;

pub use archive::{ArchiveExtractor, ContainerKind, ExtractReport, IndexRecord, IndexTable};
pub use cli::Cli;
pub use codec::{Codec, CodecError, NwaDecoder, Passthrough};
pub use config::{ExtractConfig, OutputPolicy};
pub use error::ExtractError;
pub use io::{LocalFileReader, ReadAt};
