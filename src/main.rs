//! Main entry point for the nwa-extract CLI application.
//!
//! This binary extracts RealLive audio containers, either a single file or
//! every container found in a directory.

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nwa_extract::{ArchiveExtractor, Cli, ExtractConfig, ExtractReport, LocalFileReader};

/// Application entry point.
///
/// Parses command-line arguments, sets up logging and dispatches to list,
/// single-file or batch mode. Any failure exits with a non-zero status.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(cli.log_level().into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if cli.is_batch() {
        return process_directory(&cli).await;
    }

    let config = ExtractConfig::new(&cli.input, cli.output.clone(), cli.kind)?
        .with_max_in_flight(cli.jobs);
    let extractor = ArchiveExtractor::open(&config)?;

    if cli.list {
        return list_entries(&extractor).await;
    }

    let report = extractor
        .run()
        .await
        .with_context(|| format!("failed to extract {}", config.input.display()))?;
    print_summary(&report);

    Ok(())
}

/// Extract every recognized container in a directory.
///
/// Containers are processed one after another; a failure is logged and the
/// batch moves on, but the process still exits non-zero at the end.
async fn process_directory(cli: &Cli) -> Result<()> {
    let out_dir = cli.output.clone().unwrap_or_else(|| cli.input.clone());
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("cannot create {}", out_dir.display()))?;

    let configs = ExtractConfig::for_directory(&cli.input, &out_dir)?;
    if configs.is_empty() {
        bail!("no .nwa/.nwk/.ovk files in {}", cli.input.display());
    }

    let total = configs.len();
    let mut failures = 0usize;
    for (i, config) in configs.into_iter().enumerate() {
        let config = config.with_max_in_flight(cli.jobs);
        info!("[{}/{}] {}", i + 1, total, config.input.display());

        let result = match ArchiveExtractor::open(&config) {
            Ok(extractor) => extractor.run().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(report) => print_summary(&report),
            Err(e) => {
                failures += 1;
                error!("{}: {:#}", config.input.display(), anyhow::Error::new(e));
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} containers failed", failures, total);
    }
    Ok(())
}

/// Print the index table of a multi-stream archive.
async fn list_entries(extractor: &ArchiveExtractor<LocalFileReader>) -> Result<()> {
    if !extractor.kind().is_multi_stream() {
        bail!("{} files have no index table", extractor.kind());
    }

    let table = extractor.read_index().await?;

    println!(
        "{:>6}  {:>8}  {:>10}  {:>10}  {:>10}",
        "Entry", "Id", "Offset", "Size", "Original"
    );
    println!("{}", "-".repeat(52));

    let mut total = 0u64;
    for (i, record) in table.records().iter().enumerate() {
        println!(
            "{:>6}  {:>8}  {:>10}  {:>10}  {:>10}",
            i, record.sequence_id, record.offset, record.size, record.original_size
        );
        total += record.size.max(0) as u64;
    }

    println!("{}", "-".repeat(52));
    println!("{} entries, {}", table.len(), format_size(total));

    Ok(())
}

fn print_summary(report: &ExtractReport) {
    info!(
        "extracted {} of {} {} entries ({})",
        report.written.len(),
        report.entries,
        report.kind,
        format_size(report.bytes_written())
    );
}

/// Format a byte size into a human-readable string.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
