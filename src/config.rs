//! Injected configuration for the catalog and the refresh pipeline.
//!
//! Platform default locations are resolved by whoever builds a [`ShelfConfig`];
//! nothing in here guesses paths.

use crate::store::MetadataStore;
use std::path::{Path, PathBuf};

/// File names used inside each per-archive cache directory.
pub struct CacheLayout;

impl CacheLayout {
    pub const INFO_FILE: &'static str = "info.json";
    pub const ICON_FILE: &'static str = "icon.png";
    pub const FAVORITE_MARKER: &'static str = "fav";
}

pub const DEFAULT_ARCHIVE_EXTENSION: &str = "unitypackage";
pub const DEFAULT_ICON_ENTRY: &str = ".icon.png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelfConfig {
    pub archive_dir: PathBuf,
    pub cache_dir: PathBuf,
    /// Parent of the per-pass extraction directory. Defaults to the system
    /// temp directory so it never shares a name with a cached package.
    pub scratch_dir: PathBuf,
    pub archive_extension: String,
    pub icon_entry_name: String,
}

impl ShelfConfig {
    pub fn new(archive_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
            cache_dir: cache_dir.into(),
            scratch_dir: std::env::temp_dir(),
            archive_extension: DEFAULT_ARCHIVE_EXTENSION.to_string(),
            icon_entry_name: DEFAULT_ICON_ENTRY.to_string(),
        }
    }

    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir.into();
        self
    }

    pub fn with_archive_extension(mut self, extension: &str) -> Self {
        self.archive_extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn with_icon_entry_name(mut self, name: &str) -> Self {
        self.icon_entry_name = name.to_string();
        self
    }

    pub fn store(&self) -> MetadataStore {
        MetadataStore::new(&self.cache_dir)
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }
}
