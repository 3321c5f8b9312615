//! Run configuration, built once at the process boundary.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::archive::ContainerKind;
use crate::error::{ExtractError, Result};

/// Everything the extractor needs to know about one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractConfig {
    pub input: PathBuf,
    /// Output path without extension; entry outputs append `-<id>.<ext>`.
    pub output_base: PathBuf,
    pub kind: ContainerKind,
    /// Cap on concurrently running extraction units, `None` for one per entry.
    pub max_in_flight: Option<usize>,
}

impl ExtractConfig {
    /// Build a config for `input`.
    ///
    /// The kind comes from `kind` when given, otherwise from the file
    /// extension. The output base defaults to the input path minus its
    /// extension.
    pub fn new(
        input: impl Into<PathBuf>,
        output: Option<PathBuf>,
        kind: Option<ContainerKind>,
    ) -> Result<Self> {
        let input = input.into();
        let kind = match kind {
            Some(kind) => kind,
            None => ContainerKind::from_path(&input)
                .ok_or_else(|| ExtractError::UnknownContainer { path: input.clone() })?,
        };
        let output_base = output.unwrap_or_else(|| input.with_extension(""));

        Ok(Self {
            input,
            output_base,
            kind,
            max_in_flight: None,
        })
    }

    pub fn with_max_in_flight(mut self, limit: Option<usize>) -> Self {
        self.max_in_flight = limit.filter(|n| *n > 0);
        self
    }

    /// One config per recognized container directly inside `dir`, sorted by
    /// file name, with outputs placed in `out_dir`.
    pub fn for_directory(dir: &Path, out_dir: &Path) -> Result<Vec<Self>> {
        let unavailable = |source| ExtractError::SourceUnavailable {
            path: dir.to_path_buf(),
            source,
        };

        let mut inputs = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(unavailable)? {
            let path = entry.map_err(unavailable)?.path();
            if path.is_file() && ContainerKind::from_path(&path).is_some() {
                inputs.push(path);
            }
        }
        inputs.sort();

        inputs
            .into_iter()
            .map(|input| {
                let stem = input.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
                let output = out_dir.join(stem);
                Self::new(input, Some(output), None)
            })
            .collect()
    }

    pub fn output_policy(&self) -> OutputPolicy {
        OutputPolicy::new(self.output_base.clone(), self.kind)
    }
}

/// Output naming and decode decision for one container kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPolicy {
    base: PathBuf,
    kind: ContainerKind,
}

impl OutputPolicy {
    pub fn new(base: impl Into<PathBuf>, kind: ContainerKind) -> Self {
        Self {
            base: base.into(),
            kind,
        }
    }

    /// `<base>-<sequence_id>.<ext>` for one archive entry.
    pub fn destination_for(&self, sequence_id: i32) -> PathBuf {
        self.with_suffix(&format!("-{}.{}", sequence_id, self.kind.output_extension()))
    }

    /// `<base>.<ext>` for a single-stream container.
    pub fn single_destination(&self) -> PathBuf {
        self.with_suffix(&format!(".{}", self.kind.output_extension()))
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        // Appended to the raw name so dots in the base stay untouched
        let mut name = OsString::from(self.base.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }
}
