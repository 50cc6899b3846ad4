//! Fills the metadata store from the archives themselves.
//!
//! For every archive without a cached icon the pipeline pulls the JSON blob
//! out of the gzip header, then inflates the payload and copies the icon entry
//! out through a per-archive scratch directory. A failure on one archive is
//! recorded and the batch moves on.
//!
//! Scratch directories live under a private per-pass directory created inside
//! the configured scratch root. Only that pass directory is ever removed, so a
//! scratch root shared with other data is left alone.

use crate::cancel::CancellationToken;
use crate::catalog::scan_archives;
use crate::config::ShelfConfig;
use crate::store::MetadataStore;
use crate::{ArchiveRecord, ItemFailure, Result, ShelfError, gzip_extra, tar_select};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

const PASS_SCRATCH_PREFIX: &str = ".pkgshelf-refresh-";

/// How the pipeline opens an archive, once for the header and once for the
/// decompressed tar payload.
pub trait ArchiveSource {
    type Header: Read + Seek;
    type Payload: Read;

    fn open_header(&self, path: &Path) -> io::Result<Self::Header>;
    fn open_payload(&self, path: &Path) -> io::Result<Self::Payload>;
}

/// Plain files on disk, payload inflated with flate2.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipArchiveSource;

impl ArchiveSource for GzipArchiveSource {
    type Header = File;
    type Payload = GzDecoder<BufReader<File>>;

    fn open_header(&self, path: &Path) -> io::Result<File> {
        File::open(path)
    }

    fn open_payload(&self, path: &Path) -> io::Result<Self::Payload> {
        Ok(GzDecoder::new(BufReader::new(File::open(path)?)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RefreshProgress<'a> {
    pub completed: usize,
    pub total: usize,
    pub name: &'a str,
}

impl RefreshProgress<'_> {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub total: usize,
    /// Archives that were opened and walked.
    pub processed: usize,
    /// Archives skipped because an icon was already cached.
    pub skipped: usize,
    pub metadata_written: usize,
    pub icons_written: usize,
    pub failures: Vec<ItemFailure>,
    pub cancelled: bool,
}

pub struct RefreshPipeline<S = GzipArchiveSource> {
    source: S,
    store: MetadataStore,
    scratch_root: PathBuf,
    extension: String,
    icon_entry_name: String,
    cancel: Option<CancellationToken>,
}

impl RefreshPipeline<GzipArchiveSource> {
    pub fn new(config: &ShelfConfig) -> Self {
        Self::with_source(config, GzipArchiveSource)
    }
}

impl<S: ArchiveSource> RefreshPipeline<S> {
    pub fn with_source(config: &ShelfConfig, source: S) -> Self {
        Self {
            source,
            store: config.store(),
            scratch_root: config.scratch_dir.clone(),
            extension: config.archive_extension.clone(),
            icon_entry_name: config.icon_entry_name.clone(),
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Runs one pass over `archive_dir`, calling `on_progress` after each
    /// archive. Only a missing archive directory or an uncreatable cache root
    /// is returned as an error.
    pub fn refresh_all<F>(&self, archive_dir: &Path, mut on_progress: F) -> Result<RefreshReport>
    where
        F: FnMut(&RefreshProgress<'_>),
    {
        let records = scan_archives(archive_dir, &self.extension)?;
        self.store.ensure_root()?;

        let mut report = RefreshReport {
            total: records.len(),
            ..Default::default()
        };
        info!("Refreshing metadata for {} archives", records.len());

        let mut pass_scratch: Option<TempDir> = None;
        for (index, record) in records.iter().enumerate() {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                warn!("Metadata refresh cancelled after {} of {}", index, records.len());
                report.cancelled = true;
                break;
            }

            if let Err(e) = self.refresh_one(record, &mut pass_scratch, &mut report) {
                warn!("Failed to refresh {}: {}", record.name, e);
                report.failures.push(ItemFailure::new(&record.name, &e));
            }

            on_progress(&RefreshProgress {
                completed: index + 1,
                total: records.len(),
                name: &record.name,
            });
        }

        if let Some(scratch) = pass_scratch {
            let path = scratch.path().to_path_buf();
            match scratch.close() {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
        info!(
            "Metadata refresh done: {} processed, {} skipped, {} failures",
            report.processed,
            report.skipped,
            report.failures.len()
        );
        Ok(report)
    }

    fn refresh_one(
        &self,
        record: &ArchiveRecord,
        pass_scratch: &mut Option<TempDir>,
        report: &mut RefreshReport,
    ) -> Result<()> {
        if self.store.has_icon(&record.name) {
            debug!("Icon already cached for {}, skipping", record.name);
            report.skipped += 1;
            return Ok(());
        }

        match self.extract_metadata(record) {
            Ok(()) => report.metadata_written += 1,
            Err(e @ ShelfError::NoExtensionField) => {
                warn!("No metadata for {}: {}", record.name, e);
                report.failures.push(ItemFailure::new(&record.name, &e));
            }
            // An unreadable header means the payload cannot be inflated either,
            // so InvalidFormat ends the archive here as a single failure.
            Err(e) => return Err(e),
        }

        if self.extract_icon(record, pass_scratch)? {
            report.icons_written += 1;
        }
        report.processed += 1;
        Ok(())
    }

    fn extract_metadata(&self, record: &ArchiveRecord) -> Result<()> {
        let bytes = {
            let mut header = self
                .source
                .open_header(&record.path)
                .map_err(|e| ShelfError::io("Failed to open archive", &record.path, e))?;
            gzip_extra::read_extension_field(&mut header)?
        };
        self.store.write_metadata_raw(&record.name, &bytes)
    }

    /// Returns whether an icon was found and cached. The scratch directory is
    /// removed when it goes out of scope, whichever way this returns.
    fn extract_icon(&self, record: &ArchiveRecord, pass_scratch: &mut Option<TempDir>) -> Result<bool> {
        let pass_dir = match pass_scratch {
            Some(dir) => dir.path().to_path_buf(),
            None => pass_scratch.insert(self.pass_scratch_dir()?).path().to_path_buf(),
        };
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}-", record.name))
            .tempdir_in(&pass_dir)
            .map_err(|e| ShelfError::io("Failed to create scratch directory", &pass_dir, e))?;

        let payload = self
            .source
            .open_payload(&record.path)
            .map_err(|e| ShelfError::io("Failed to open archive", &record.path, e))?;
        let extracted = tar_select::extract_one(payload, scratch.path(), &self.icon_entry_name)?;

        let found = match extracted {
            Some(icon) => {
                self.store.import_icon(&record.name, &icon)?;
                true
            }
            None => {
                debug!("{} has no {}", record.name, self.icon_entry_name);
                false
            }
        };

        if let Err(e) = scratch.close() {
            warn!("Failed to remove scratch directory for {}: {}", record.name, e);
        }
        Ok(found)
    }

    fn pass_scratch_dir(&self) -> Result<TempDir> {
        fs::create_dir_all(&self.scratch_root)
            .map_err(|e| ShelfError::io("Failed to create scratch directory", &self.scratch_root, e))?;
        tempfile::Builder::new()
            .prefix(PASS_SCRATCH_PREFIX)
            .tempdir_in(&self.scratch_root)
            .map_err(|e| ShelfError::io("Failed to create scratch directory", &self.scratch_root, e))
    }
}
