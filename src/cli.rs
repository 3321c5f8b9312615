use clap::Parser;
use std::path::PathBuf;

use crate::archive::ContainerKind;

#[derive(Parser, Debug)]
#[command(name = "nwa-extract")]
#[command(version)]
#[command(about = "Extract RealLive .nwa/.nwk/.ovk audio to WAV and Ogg files", long_about = None)]
#[command(after_help = "Examples:\n  \
  nwa-extract bgm01.nwa                 decode to bgm01.wav\n  \
  nwa-extract z0001.nwk -o out/z0001    write out/z0001-<id>.wav for every entry\n  \
  nwa-extract -l z0001.ovk              list the index table\n  \
  nwa-extract koe/ -o wav/              extract every container in koe/ into wav/")]
pub struct Cli {
    /// Container file, or a directory of containers
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output base name (output directory when INPUT is a directory)
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Container kind, overriding the file extension
    #[arg(short = 'k', long = "kind", value_name = "nwa|nwk|ovk")]
    pub kind: Option<ContainerKind>,

    /// Maximum number of entries extracted at once (default: all)
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    pub jobs: Option<usize>,

    /// List the index table instead of extracting
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// Verbose output (-vv => trace)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode, warnings and errors only
    #[arg(short = 'q', conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    pub fn is_batch(&self) -> bool {
        self.input.is_dir()
    }

    /// Default log directive for the chosen verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match (self.quiet, self.verbose) {
            (true, _) => tracing::Level::WARN,
            (false, 0) => tracing::Level::INFO,
            (false, 1) => tracing::Level::DEBUG,
            (false, _) => tracing::Level::TRACE,
        }
    }
}
