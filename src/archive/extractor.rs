use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::codec::{Codec, NwaDecoder};
use crate::config::{ExtractConfig, OutputPolicy};
use crate::error::{ExtractError, Result};
use crate::io::{LocalFileReader, ReadAt};

use super::parser::{HEADER_SIZE, index_len, parse_index};
use super::structures::{
    ContainerKind, ExtractReport, ExtractionDescriptor, ExtractionOutcome, IndexTable,
    WrittenEntry,
};

/// Archive extractor.
///
/// Owns the backing source, the codec and the output policy for one
/// container, and runs every entry of it to completion.
pub struct ArchiveExtractor<R: ReadAt> {
    reader: Arc<R>,
    codec: Arc<dyn Codec>,
    input: PathBuf,
    kind: ContainerKind,
    policy: OutputPolicy,
    max_in_flight: Option<usize>,
}

impl ArchiveExtractor<LocalFileReader> {
    /// Open the container named by `config` with the NWA decoder.
    pub fn open(config: &ExtractConfig) -> Result<Self> {
        let reader = LocalFileReader::new(&config.input).map_err(|source| {
            ExtractError::SourceUnavailable {
                path: config.input.clone(),
                source,
            }
        })?;
        Ok(Self::new(Arc::new(reader), Arc::new(NwaDecoder::new()), config))
    }
}

impl<R: ReadAt + 'static> ArchiveExtractor<R> {
    pub fn new(reader: Arc<R>, codec: Arc<dyn Codec>, config: &ExtractConfig) -> Self {
        Self {
            reader,
            codec,
            input: config.input.clone(),
            kind: config.kind,
            policy: config.output_policy(),
            max_in_flight: config.max_in_flight,
        }
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Load and parse the index table of a multi-stream archive.
    pub async fn read_index(&self) -> Result<IndexTable> {
        let mut head = [0u8; HEADER_SIZE];
        let got = self
            .reader
            .read_at(0, &mut head)
            .await
            .map_err(|source| self.unavailable(source))?;
        let count = if got == HEADER_SIZE {
            i32::from_le_bytes(head)
        } else {
            0
        };

        // Never allocate past the end of the source for a bogus count
        let len = index_len(self.kind, count).min(self.reader.size()) as usize;
        let mut buf = vec![0u8; len];
        let got = self
            .reader
            .read_at(0, &mut buf)
            .await
            .map_err(|source| self.unavailable(source))?;
        buf.truncate(got);

        parse_index(&mut Cursor::new(buf), self.kind)
    }

    /// Extract every entry of the container.
    ///
    /// Single-stream input is decoded as a whole into one file. Multi-stream
    /// input gets one concurrent unit per index entry; the call returns only
    /// after every unit has finished. If any unit fails, the error of the
    /// lowest failing entry index is returned and files written by other
    /// units are left in place.
    pub async fn run(&self) -> Result<ExtractReport> {
        if !self.kind.is_multi_stream() {
            return self.extract_single().await;
        }

        let table = self.read_index().await?;
        info!(
            "{}: {} entries in {} archive",
            self.input.display(),
            table.len(),
            self.kind
        );

        let descriptors = table.descriptors(&self.policy)?;
        self.extract_entries(descriptors).await
    }

    async fn extract_single(&self) -> Result<ExtractReport> {
        let size = self.reader.size() as usize;
        let data = read_slice(self.reader.as_ref(), 0, 0, size).await?;
        let decoded = decode(&self.codec, 0, data).await?;

        let path = self.policy.single_destination();
        write_output(&path, &decoded).await?;
        info!("{} -> {}", self.input.display(), path.display());

        Ok(ExtractReport {
            kind: self.kind,
            entries: 1,
            written: vec![WrittenEntry {
                index: 0,
                path,
                bytes: decoded.len() as u64,
            }],
        })
    }

    async fn extract_entries(&self, descriptors: Vec<ExtractionDescriptor>) -> Result<ExtractReport> {
        let total = descriptors.len();
        let failed = Arc::new(AtomicBool::new(false));
        let limiter = self.max_in_flight.map(|n| Arc::new(Semaphore::new(n.max(1))));
        let mut units = JoinSet::new();

        for descriptor in descriptors {
            let reader = Arc::clone(&self.reader);
            let codec = Arc::clone(&self.codec);
            let failed = Arc::clone(&failed);
            let limiter = limiter.clone();

            units.spawn(async move {
                let index = descriptor.index;
                let _permit = match limiter {
                    Some(limiter) => limiter.acquire_owned().await.ok(),
                    None => None,
                };

                if failed.load(Ordering::Acquire) {
                    return (index, Ok(ExtractionOutcome::Skipped));
                }

                let result = dispatch(reader.as_ref(), &codec, &descriptor).await;
                if result.is_err() {
                    failed.store(true, Ordering::Release);
                }
                (index, result.map(ExtractionOutcome::Written))
            });
        }

        let mut written = Vec::with_capacity(total);
        let mut skipped = 0;
        let mut completed = 0;
        let mut first_error: Option<(usize, ExtractError)> = None;

        while let Some(joined) = units.join_next().await {
            completed += 1;
            let (index, result) = match joined {
                Ok(unit) => unit,
                Err(e) => (usize::MAX, Err(ExtractError::TaskFailed(e))),
            };

            match result {
                Ok(ExtractionOutcome::Written(entry)) => written.push(entry),
                Ok(ExtractionOutcome::Skipped) => skipped += 1,
                Err(e) => {
                    warn!("entry {}: {}", index, e);
                    if first_error.as_ref().is_none_or(|(seen, _)| index < *seen) {
                        first_error = Some((index, e));
                    }
                }
            }
        }
        debug_assert_eq!(completed, total);

        if skipped > 0 {
            warn!("{} entries skipped after an earlier failure", skipped);
        }
        if let Some((_, e)) = first_error {
            return Err(e);
        }

        written.sort_by_key(|w| w.index);
        Ok(ExtractReport {
            kind: self.kind,
            entries: total,
            written,
        })
    }

    fn unavailable(&self, source: std::io::Error) -> ExtractError {
        ExtractError::SourceUnavailable {
            path: self.input.clone(),
            source,
        }
    }
}

/// Extract one archive entry to its destination.
///
/// Reads exactly the entry's byte range with a fresh handle, runs the codec
/// when the container kind requires it and writes the result in full.
pub async fn dispatch<R: ReadAt + ?Sized>(
    reader: &R,
    codec: &Arc<dyn Codec>,
    descriptor: &ExtractionDescriptor,
) -> Result<WrittenEntry> {
    descriptor.validate()?;

    let index = descriptor.index;
    let data = read_slice(reader, index, descriptor.offset(), descriptor.size()).await?;
    let data = if descriptor.requires_decode() {
        decode(codec, index, data).await?
    } else {
        data
    };

    write_output(&descriptor.destination, &data).await?;
    debug!(
        "entry {} (id {}): {} bytes at {} -> {}",
        index,
        descriptor.record.sequence_id,
        descriptor.size(),
        descriptor.offset(),
        descriptor.destination.display()
    );

    Ok(WrittenEntry {
        index,
        path: descriptor.destination.clone(),
        bytes: data.len() as u64,
    })
}

/// Read exactly `len` bytes at `offset`; anything less is a short read.
pub async fn read_slice<R: ReadAt + ?Sized>(
    reader: &R,
    index: usize,
    offset: u64,
    len: usize,
) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let actual = reader
        .read_at(offset, &mut buf)
        .await
        .map_err(|source| ExtractError::ReadFailed { index, source })?;

    if actual != len {
        return Err(ExtractError::ShortRead {
            index,
            expected: len,
            actual,
        });
    }
    Ok(buf)
}

async fn decode(codec: &Arc<dyn Codec>, index: usize, data: Vec<u8>) -> Result<Vec<u8>> {
    let codec = Arc::clone(codec);
    tokio::task::spawn_blocking(move || codec.decode(&data))
        .await?
        .map_err(|source| ExtractError::DecodeFailed { index, source })
}

async fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    write_staged(path, data, |file| file).await
}

/// Write `data` to a `.part` sibling and rename it over `path` once complete.
///
/// On any failure the partial file is removed, so the destination is either
/// fully written or untouched.
async fn write_staged<W, F>(path: &Path, data: &[u8], wrap: F) -> Result<()>
where
    W: AsyncWrite + Unpin,
    F: FnOnce(fs::File) -> W,
{
    let failed = |source| ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    // Create parent directories if needed
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.map_err(failed)?;
        }
    }

    let part = part_path(path);
    let mut file = wrap(fs::File::create(&part).await.map_err(failed)?);
    let written: std::io::Result<()> = async {
        file.write_all(data).await?;
        file.flush().await
    }
    .await;
    drop(file);

    let result = match written {
        Ok(()) => fs::rename(&part, path).await,
        Err(e) => Err(e),
    };
    if let Err(source) = result {
        if let Err(e) = fs::remove_file(&part).await {
            warn!("cannot remove {}: {}", part.display(), e);
        }
        return Err(failed(source));
    }

    Ok(())
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}
