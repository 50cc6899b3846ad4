//! Side-cache of extracted package artifacts.
//!
//! Layout, one directory per archive name:
//!
//! ```text
//! <root>/<name>/info.json   cached header metadata
//! <root>/<name>/icon.png    thumbnail copied out of the archive
//! <root>/<name>/fav         zero-byte favorite marker
//! ```

use crate::config::CacheLayout;
use crate::{PackageMetadata, Result, ShelfError, is_cache_safe_name};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .map_err(|e| ShelfError::io("Failed to create cache directory", &self.root, e))
    }

    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Creates `<root>/<name>`. Names that would resolve anywhere else are rejected.
    pub fn ensure_dir(&self, name: &str) -> Result<PathBuf> {
        if !is_cache_safe_name(name) {
            return Err(ShelfError::InvalidName(name.to_string()));
        }
        let dir = self.package_dir(name);
        fs::create_dir_all(&dir)
            .map_err(|e| ShelfError::io("Failed to create package directory", &dir, e))?;
        Ok(dir)
    }

    /// `None` when nothing has been cached yet. A cache file that cannot be
    /// read or parsed yields empty metadata instead of an error.
    pub fn read_metadata(&self, name: &str) -> Option<PackageMetadata> {
        if !is_cache_safe_name(name) {
            return None;
        }
        let path = self.package_dir(name).join(CacheLayout::INFO_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return Some(PackageMetadata::default());
            }
        };

        match PackageMetadata::from_json(&bytes) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                let err = ShelfError::MalformedMetadata {
                    path,
                    reason: e.to_string(),
                };
                warn!("{}", err);
                Some(PackageMetadata::default())
            }
        }
    }

    pub fn write_metadata_raw(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let dir = self.ensure_dir(name)?;
        replace_file(&dir.join(CacheLayout::INFO_FILE), bytes)
    }

    pub fn icon_path(&self, name: &str) -> PathBuf {
        self.package_dir(name).join(CacheLayout::ICON_FILE)
    }

    pub fn has_icon(&self, name: &str) -> bool {
        is_cache_safe_name(name) && self.icon_path(name).is_file()
    }

    pub fn read_icon(&self, name: &str) -> Option<Vec<u8>> {
        if !is_cache_safe_name(name) {
            return None;
        }
        let path = self.icon_path(name);
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn write_icon(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let dir = self.ensure_dir(name)?;
        replace_file(&dir.join(CacheLayout::ICON_FILE), bytes)
    }

    /// Copies an extracted icon file into the cache, overwriting any previous one.
    pub fn import_icon(&self, name: &str, source: &Path) -> Result<()> {
        let bytes =
            fs::read(source).map_err(|e| ShelfError::io("Failed to read extracted icon", source, e))?;
        self.write_icon(name, &bytes)
    }

    pub fn is_favorite(&self, name: &str) -> bool {
        is_cache_safe_name(name)
            && self
                .package_dir(name)
                .join(CacheLayout::FAVORITE_MARKER)
                .is_file()
    }

    pub fn set_favorite(&self, name: &str, favorite: bool) -> Result<()> {
        if !is_cache_safe_name(name) {
            return Err(ShelfError::InvalidName(name.to_string()));
        }
        let marker = self.package_dir(name).join(CacheLayout::FAVORITE_MARKER);

        if favorite {
            if marker.is_file() {
                return Ok(());
            }
            self.ensure_dir(name)?;
            File::create(&marker)
                .map_err(|e| ShelfError::io("Failed to create favorite marker", &marker, e))?;
            debug!("Marked {} as favorite", name);
        } else {
            match fs::remove_file(&marker) {
                Ok(()) => debug!("Cleared favorite on {}", name),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ShelfError::io("Failed to remove favorite marker", &marker, e));
                }
            }
        }

        Ok(())
    }
}

/// Size label in decimal megabytes, e.g. `"1.5 MB"`.
pub fn size_label(archive_path: &Path) -> Result<String> {
    let meta = fs::metadata(archive_path)
        .map_err(|e| ShelfError::io("Failed to stat archive", archive_path, e))?;
    Ok(format_size_label(meta.len()))
}

/// Halves round away from zero, so 1,250,000 bytes is `"1.3 MB"`.
pub fn format_size_label(bytes: u64) -> String {
    let tenths = (bytes as f64 / 100_000.0).round();
    format!("{:.1} MB", tenths / 10.0)
}

// Write beside the target then rename over it, so readers never see a torn file.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)
        .map_err(|e| ShelfError::io("Failed to create temp file", dir, e))?;
    temp.write_all(bytes)
        .map_err(|e| ShelfError::io("Failed to write temp file", temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| ShelfError::io("Failed to sync temp file", temp.path(), e))?;
    temp.persist(path)
        .map_err(|e| ShelfError::io("Failed to replace file", path, e.error))?;
    Ok(())
}
