use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::OutputPolicy;
use crate::error::{ExtractError, Result};

/// The three container formats shipped by RealLive games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// A single NWA stream with no index.
    Nwa,
    /// Koe voice archive: 12-byte records, every entry is an NWA stream.
    Nwk,
    /// Ogg voice archive: 16-byte records, every entry is a complete Ogg file.
    Ovk,
}

impl ContainerKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }

    /// Size of one index record, zero for the unindexed single-stream kind.
    pub fn record_size(&self) -> usize {
        match self {
            ContainerKind::Nwa => 0,
            ContainerKind::Nwk => 12,
            ContainerKind::Ovk => 16,
        }
    }

    pub fn is_multi_stream(&self) -> bool {
        !matches!(self, ContainerKind::Nwa)
    }

    /// Whether entry bytes go through the codec before being written.
    pub fn requires_decode(&self) -> bool {
        match self {
            ContainerKind::Nwa | ContainerKind::Nwk => true,
            ContainerKind::Ovk => false,
        }
    }

    pub fn output_extension(&self) -> &'static str {
        match self {
            ContainerKind::Nwa | ContainerKind::Nwk => "wav",
            ContainerKind::Ovk => "ogg",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerKind::Nwa => "nwa",
            ContainerKind::Nwk => "nwk",
            ContainerKind::Ovk => "ovk",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nwa" => Ok(ContainerKind::Nwa),
            "nwk" => Ok(ContainerKind::Nwk),
            "ovk" => Ok(ContainerKind::Ovk),
            other => Err(format!("unknown container kind '{other}' (expected nwa, nwk or ovk)")),
        }
    }
}

/// One record of a multi-stream index table.
///
/// `sequence_id` names the output file and `original_size` is informational;
/// neither is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    pub size: i32,
    pub offset: i32,
    pub sequence_id: i32,
    pub original_size: i32,
}

impl IndexRecord {
    pub fn is_valid(&self) -> bool {
        self.offset > 0 && self.size > 0
    }
}

/// Index table of a multi-stream archive, in on-disk order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTable {
    kind: ContainerKind,
    records: Vec<IndexRecord>,
}

impl IndexTable {
    pub(crate) fn new(kind: ContainerKind, records: Vec<IndexRecord>) -> Self {
        Self { kind, records }
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }

    /// Build one descriptor per record.
    ///
    /// Every record is checked before anything is returned, so a single bad
    /// record fails the whole table and no entry gets extracted.
    pub fn descriptors(&self, policy: &OutputPolicy) -> Result<Vec<ExtractionDescriptor>> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let descriptor = ExtractionDescriptor {
                    index,
                    record: *record,
                    kind: self.kind,
                    destination: policy.destination_for(record.sequence_id),
                };
                descriptor.validate()?;
                Ok(descriptor)
            })
            .collect()
    }
}

/// Everything one extraction unit needs to produce one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionDescriptor {
    pub index: usize,
    pub record: IndexRecord,
    pub kind: ContainerKind,
    pub destination: PathBuf,
}

impl ExtractionDescriptor {
    pub fn validate(&self) -> Result<()> {
        if !self.record.is_valid() {
            return Err(ExtractError::InvalidEntry {
                index: self.index,
                offset: self.record.offset,
                size: self.record.size,
            });
        }
        Ok(())
    }

    pub fn offset(&self) -> u64 {
        self.record.offset.max(0) as u64
    }

    pub fn size(&self) -> usize {
        self.record.size.max(0) as usize
    }

    pub fn requires_decode(&self) -> bool {
        self.kind.requires_decode()
    }
}

/// One output file produced by a successful extraction unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenEntry {
    pub index: usize,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Result of a single extraction unit that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Written(WrittenEntry),
    /// The unit saw an earlier failure before starting and did nothing.
    Skipped,
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    pub kind: ContainerKind,
    /// Entries in the archive (1 for single-stream input).
    pub entries: usize,
    /// Outputs in table order.
    pub written: Vec<WrittenEntry>,
}

impl ExtractReport {
    pub fn bytes_written(&self) -> u64 {
        self.written.iter().map(|w| w.bytes).sum()
    }
}
