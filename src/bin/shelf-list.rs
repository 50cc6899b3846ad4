use anyhow::{Context, Result};
use clap::Parser;
use pkgshelf::config::DEFAULT_ARCHIVE_EXTENSION;
use pkgshelf::{CatalogFilter, PackageCatalog, PackageInfo, ShelfConfig};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "shelf-list")]
#[command(about = "List cached package archives with their metadata")]
struct Args {
    /// Directory holding the archives (searched recursively)
    #[arg(long, env = "PKGSHELF_ARCHIVE_DIR")]
    archive_dir: PathBuf,

    /// Directory holding the extracted metadata cache
    #[arg(long, env = "PKGSHELF_CACHE_DIR")]
    cache_dir: PathBuf,

    /// Archive file extension
    #[arg(long, default_value = DEFAULT_ARCHIVE_EXTENSION)]
    extension: String,

    /// Only show packages whose name contains this keyword (case-insensitive)
    #[arg(short, long, default_value = "")]
    search: String,

    /// Only show favorites
    #[arg(short, long)]
    favorites: bool,

    /// Toggle the favorite flag of a package before listing
    #[arg(long, value_name = "NAME")]
    toggle_favorite: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let config =
        ShelfConfig::new(&args.archive_dir, &args.cache_dir).with_archive_extension(&args.extension);

    let mut catalog = PackageCatalog::new(&config);
    catalog
        .refresh(&config.archive_dir)
        .with_context(|| format!("Failed to scan {}", config.archive_dir.display()))?;

    if let Some(name) = &args.toggle_favorite {
        let favorite = catalog
            .toggle_favorite(name)
            .with_context(|| format!("Failed to toggle favorite for {}", name))?;
        println!("{} {}", if favorite { "Added favorite:" } else { "Removed favorite:" }, name);
    }

    let filter = CatalogFilter::keyword(&args.search).favorites_only(args.favorites);
    let shown = catalog.apply_filter(filter).to_vec();
    let (count, total) = catalog.counts();

    println!("Search ({}/{})", count, total);
    for info in &shown {
        print_info(info);
    }

    Ok(())
}

fn print_info(info: &PackageInfo) {
    let modified = info
        .modified
        .map(format_timestamp)
        .unwrap_or_else(|| "N/A".to_string());

    println!(
        "{} {:<40} {:>10}  v{:<12} {:<16} {}  {}",
        if info.is_favorite { "*" } else { " " },
        info.name,
        info.size_label,
        info.version.as_deref().unwrap_or("-"),
        info.store_content_path().unwrap_or_else(|| "-".to_string()),
        if info.thumbnail.is_some() { "icon" } else { "----" },
        modified
    );
}

fn format_timestamp(ts: u64) -> String {
    use chrono::DateTime;

    if let Some(datetime) = DateTime::from_timestamp(ts as i64, 0) {
        datetime.format("%Y-%m-%d %H:%M").to_string()
    } else {
        "N/A".to_string()
    }
}
