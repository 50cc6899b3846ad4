use anyhow::{Context, Result};
use clap::Parser;
use pkgshelf::config::DEFAULT_ARCHIVE_EXTENSION;
use pkgshelf::{CancellationToken, RefreshPipeline, ShelfConfig};
use std::path::PathBuf;
use tracing::{Level, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "shelf-update")]
#[command(about = "Extract metadata and thumbnails from cached package archives")]
struct Args {
    /// Directory holding the archives (searched recursively)
    #[arg(long, env = "PKGSHELF_ARCHIVE_DIR")]
    archive_dir: PathBuf,

    /// Directory holding the extracted metadata cache
    #[arg(long, env = "PKGSHELF_CACHE_DIR")]
    cache_dir: PathBuf,

    /// Parent directory for extraction scratch space (defaults to the system temp directory)
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Archive file extension
    #[arg(long, default_value = DEFAULT_ARCHIVE_EXTENSION)]
    extension: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let mut config =
        ShelfConfig::new(&args.archive_dir, &args.cache_dir).with_archive_extension(&args.extension);
    if let Some(scratch_dir) = args.scratch_dir {
        config = config.with_scratch_dir(scratch_dir);
    }

    let token = CancellationToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    println!("Updating metadata from: {}", config.archive_dir.display());

    let pipeline = RefreshPipeline::new(&config).with_cancellation(token);
    let report = pipeline
        .refresh_all(&config.archive_dir, |progress| {
            println!(
                "  [{}/{}] {}",
                progress.completed, progress.total, progress.name
            );
        })
        .with_context(|| format!("Failed to update metadata from {}", config.archive_dir.display()))?;

    if report.cancelled {
        println!("Cancelled.");
    }

    for failure in &report.failures {
        eprintln!("Warning: {}", failure);
    }

    println!(
        "Processed {} of {} archives ({} already cached): {} metadata, {} thumbnails",
        report.processed,
        report.total,
        report.skipped,
        report.metadata_written,
        report.icons_written
    );

    Ok(())
}
