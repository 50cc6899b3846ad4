//! In-memory index of the archives on disk joined with their cached metadata.
//!
//! The catalog keeps three views. `all_records` is the last full scan,
//! `filtered_records` is what the current filter selected from it, and
//! `displayed_infos` is the join of the filtered records with the cache, in
//! the same order. Filters always start again from the full scan.

use crate::config::ShelfConfig;
use crate::store::{MetadataStore, format_size_label};
use crate::{ArchiveRecord, Result, ShelfError, archive_name};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// One archive as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub archive_path: PathBuf,
    pub size_label: String,
    pub id: Option<String>,
    pub version: Option<String>,
    /// Cached thumbnail location; the bytes are loaded on demand.
    pub thumbnail: Option<PathBuf>,
    pub is_favorite: bool,
    pub modified: Option<u64>,
}

impl PackageInfo {
    /// Store page path for this package, available once its content id is known.
    pub fn store_content_path(&self) -> Option<String> {
        self.id.as_deref().map(|id| format!("/content/{}", id))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CatalogState {
    #[default]
    Uninitialized,
    Scanned,
    Filtered,
}

/// Keyword and favorites filter; both active means intersection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    pub keyword: String,
    pub favorites_only: bool,
}

impl CatalogFilter {
    pub fn keyword(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            favorites_only: false,
        }
    }

    pub fn favorites_only(mut self, favorites_only: bool) -> Self {
        self.favorites_only = favorites_only;
        self
    }

    pub fn is_identity(&self) -> bool {
        self.keyword.is_empty() && !self.favorites_only
    }
}

pub struct PackageCatalog {
    store: MetadataStore,
    extension: String,
    all_records: Vec<ArchiveRecord>,
    filtered_records: Vec<ArchiveRecord>,
    infos: HashMap<String, PackageInfo>,
    displayed_infos: Vec<PackageInfo>,
    filter: CatalogFilter,
    state: CatalogState,
}

impl PackageCatalog {
    pub fn new(config: &ShelfConfig) -> Self {
        Self::with_store(config.store(), &config.archive_extension)
    }

    pub fn with_store(store: MetadataStore, extension: &str) -> Self {
        Self {
            store,
            extension: extension.to_string(),
            all_records: Vec::new(),
            filtered_records: Vec::new(),
            infos: HashMap::new(),
            displayed_infos: Vec::new(),
            filter: CatalogFilter::default(),
            state: CatalogState::Uninitialized,
        }
    }

    /// Rescans `archive_dir` and rebuilds every view, clearing any filter.
    ///
    /// A missing directory leaves the previous contents untouched.
    pub fn refresh(&mut self, archive_dir: &Path) -> Result<()> {
        let records = scan_archives(archive_dir, &self.extension)?;

        self.infos = records
            .iter()
            .map(|record| (record.name.clone(), self.load_info(record)))
            .collect();
        self.all_records = records;
        self.filter = CatalogFilter::default();
        self.set_filtered(self.all_records.clone());
        self.state = CatalogState::Scanned;

        info!(
            "Catalog refreshed: {} archives in {}",
            self.all_records.len(),
            archive_dir.display()
        );
        Ok(())
    }

    /// Case-insensitive substring match on archive names, over the full scan.
    pub fn search(&self, keyword: &str) -> Vec<ArchiveRecord> {
        search_within(&self.all_records, keyword)
    }

    /// Keeps only favorites from `records`, preserving their order.
    pub fn filter_favorites(&self, records: &[ArchiveRecord]) -> Vec<ArchiveRecord> {
        records
            .iter()
            .filter(|record| self.store.is_favorite(&record.name))
            .cloned()
            .collect()
    }

    /// Applies `filter` to the full scan and recomputes the displayed list.
    pub fn apply_filter(&mut self, filter: CatalogFilter) -> &[PackageInfo] {
        let mut records = self.search(&filter.keyword);
        if filter.favorites_only {
            records = self.filter_favorites(&records);
        }

        if self.state != CatalogState::Uninitialized {
            self.state = if filter.is_identity() {
                CatalogState::Scanned
            } else {
                CatalogState::Filtered
            };
        }
        self.filter = filter;
        self.set_filtered(records);
        &self.displayed_infos
    }

    pub fn clear_filter(&mut self) -> &[PackageInfo] {
        self.apply_filter(CatalogFilter::default())
    }

    /// Flips the favorite flag of `name` and returns the new state.
    ///
    /// Only the flag is updated in the views; an active favorites filter is
    /// not re-run.
    pub fn toggle_favorite(&mut self, name: &str) -> Result<bool> {
        if !self.infos.contains_key(name) {
            return Err(ShelfError::PackageNotFound(name.to_string()));
        }

        let favorite = !self.store.is_favorite(name);
        self.store.set_favorite(name, favorite)?;

        if let Some(info) = self.infos.get_mut(name) {
            info.is_favorite = favorite;
        }
        for info in self.displayed_infos.iter_mut().filter(|info| info.name == name) {
            info.is_favorite = favorite;
        }

        debug!("Favorite for {} is now {}", name, favorite);
        Ok(favorite)
    }

    pub fn thumbnail_bytes(&self, name: &str) -> Option<Vec<u8>> {
        self.store.read_icon(name)
    }

    pub fn get(&self, name: &str) -> Option<&PackageInfo> {
        self.infos.get(name)
    }

    pub fn all_records(&self) -> &[ArchiveRecord] {
        &self.all_records
    }

    pub fn filtered_records(&self) -> &[ArchiveRecord] {
        &self.filtered_records
    }

    pub fn displayed_infos(&self) -> &[PackageInfo] {
        &self.displayed_infos
    }

    pub fn filter(&self) -> &CatalogFilter {
        &self.filter
    }

    pub fn state(&self) -> CatalogState {
        self.state
    }

    /// `(shown, total)` for a "Search (n/m)" style counter.
    pub fn counts(&self) -> (usize, usize) {
        (self.filtered_records.len(), self.all_records.len())
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    fn set_filtered(&mut self, records: Vec<ArchiveRecord>) {
        self.displayed_infos = records
            .iter()
            .filter_map(|record| self.infos.get(&record.name).cloned())
            .collect();
        self.filtered_records = records;
    }

    fn load_info(&self, record: &ArchiveRecord) -> PackageInfo {
        let (id, version) = self
            .store
            .read_metadata(&record.name)
            .map(|metadata| (metadata.id, metadata.version))
            .unwrap_or_default();

        PackageInfo {
            name: record.name.clone(),
            archive_path: record.path.clone(),
            size_label: format_size_label(record.size),
            id,
            version,
            thumbnail: self
                .store
                .has_icon(&record.name)
                .then(|| self.store.icon_path(&record.name)),
            is_favorite: self.store.is_favorite(&record.name),
            modified: record.modified,
        }
    }
}

/// Compose variant of [`PackageCatalog::search`]: filters an arbitrary record list.
pub fn search_within(records: &[ArchiveRecord], keyword: &str) -> Vec<ArchiveRecord> {
    if keyword.is_empty() {
        return records.to_vec();
    }

    let needle = keyword.to_lowercase();
    records
        .iter()
        .filter(|record| record.name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// Recursively lists archives with the given extension, sorted by file name
/// within each directory. Later archives whose name repeats an earlier one
/// are ignored.
pub fn scan_archives(dir: &Path, extension: &str) -> Result<Vec<ArchiveRecord>> {
    if !dir.is_dir() {
        return Err(ShelfError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut records = Vec::new();
    let mut seen = HashSet::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() || !has_extension(entry.path(), extension) {
            continue;
        }

        let path = entry.path();
        let Some(name) = archive_name(path) else {
            warn!("Ignoring archive with unusable name: {}", path.display());
            continue;
        };
        if !seen.insert(name.clone()) {
            warn!("Ignoring duplicate archive name {} at {}", name, path.display());
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Failed to stat {}: {}", path.display(), e);
                continue;
            }
        };
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs());

        records.push(ArchiveRecord {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
            modified,
        });
    }

    debug!("Found {} archives under {}", records.len(), dir.display());
    Ok(records)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        archives: TempDir,
        cache: TempDir,
    }

    impl Fixture {
        fn new(names: &[&str]) -> Self {
            let archives = TempDir::new().unwrap();
            for name in names {
                fs::write(archives.path().join(name), b"archive").unwrap();
            }
            Self {
                archives,
                cache: TempDir::new().unwrap(),
            }
        }

        fn catalog(&self) -> PackageCatalog {
            let mut catalog =
                PackageCatalog::with_store(MetadataStore::new(self.cache.path()), "archive");
            catalog.refresh(self.archives.path()).unwrap();
            catalog
        }
    }

    fn names(records: &[ArchiveRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_refresh_scans_recursively_in_stable_order() {
        let fixture = Fixture::new(&["Zeta.archive", "Alpha.archive", "notes.txt"]);
        let nested = fixture.archives.path().join("Publisher");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("Beta.ARCHIVE"), b"archive").unwrap();

        let catalog = fixture.catalog();
        assert_eq!(names(catalog.all_records()), vec!["Alpha", "Beta", "Zeta"]);
        assert_eq!(catalog.state(), CatalogState::Scanned);
        assert_eq!(catalog.displayed_infos().len(), 3);
    }

    #[test]
    fn test_missing_directory_keeps_previous_state() {
        let fixture = Fixture::new(&["Foo.archive"]);
        let mut catalog = fixture.catalog();

        let err = catalog
            .refresh(&fixture.archives.path().join("missing"))
            .unwrap_err();
        assert!(matches!(err, ShelfError::DirectoryNotFound(_)));
        assert_eq!(names(catalog.all_records()), vec!["Foo"]);
        assert_eq!(catalog.displayed_infos().len(), 1);
    }

    #[test]
    fn test_uncached_archive_still_listed() {
        let fixture = Fixture::new(&["Foo.archive"]);
        let catalog = fixture.catalog();

        let info = &catalog.displayed_infos()[0];
        assert_eq!(info.name, "Foo");
        assert_eq!(info.size_label, "0.0 MB");
        assert!(info.id.is_none());
        assert!(info.version.is_none());
        assert!(info.thumbnail.is_none());
        assert!(!info.is_favorite);
        assert!(info.store_content_path().is_none());
    }

    #[test]
    fn test_join_picks_up_cached_metadata() {
        let fixture = Fixture::new(&["Foo.archive"]);
        let store = MetadataStore::new(fixture.cache.path());
        store.write_metadata_raw("Foo", br#"{"id":"42","version":"1.0"}"#).unwrap();
        store.write_icon("Foo", b"png").unwrap();

        let catalog = fixture.catalog();
        let info = catalog.get("Foo").unwrap();
        assert_eq!(info.id.as_deref(), Some("42"));
        assert_eq!(info.version.as_deref(), Some("1.0"));
        assert_eq!(info.thumbnail.as_deref(), Some(store.icon_path("Foo").as_path()));
        assert_eq!(info.store_content_path().as_deref(), Some("/content/42"));
        assert_eq!(catalog.thumbnail_bytes("Foo").unwrap(), b"png");
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let fixture = Fixture::new(&["FooBar.archive", "Other.archive"]);
        let catalog = fixture.catalog();

        assert_eq!(names(&catalog.search("FOO")), vec!["FooBar"]);
        assert_eq!(catalog.search("FOO"), catalog.search("foo"));
        assert_eq!(catalog.search(""), catalog.all_records());
    }

    #[test]
    fn test_favorites_filter_composes_with_search() {
        let fixture = Fixture::new(&["FooOne.archive", "FooTwo.archive", "Bar.archive"]);
        let mut catalog = fixture.catalog();
        catalog.toggle_favorite("FooTwo").unwrap();
        catalog.toggle_favorite("Bar").unwrap();

        let shown = catalog.apply_filter(CatalogFilter::keyword("foo").favorites_only(true));
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].name, "FooTwo");
        assert_eq!(catalog.state(), CatalogState::Filtered);
        assert_eq!(catalog.counts(), (1, 3));

        let favorites = catalog.filter_favorites(catalog.all_records());
        assert_eq!(names(&favorites), vec!["Bar", "FooTwo"]);

        catalog.clear_filter();
        assert_eq!(catalog.state(), CatalogState::Scanned);
        assert_eq!(catalog.displayed_infos().len(), 3);
    }

    #[test]
    fn test_displayed_follows_filtered_order() {
        let fixture = Fixture::new(&["Apple.archive", "Banana.archive", "Cherry.archive"]);
        let mut catalog = fixture.catalog();

        catalog.apply_filter(CatalogFilter::keyword("an"));
        let displayed: Vec<_> = catalog.displayed_infos().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(displayed, names(catalog.filtered_records()));
        assert_eq!(displayed, vec!["Banana"]);
    }

    #[test]
    fn test_toggle_favorite_twice_restores_state() {
        let fixture = Fixture::new(&["Foo.archive"]);
        let mut catalog = fixture.catalog();
        let marker = fixture.cache.path().join("Foo").join("fav");

        assert!(catalog.toggle_favorite("Foo").unwrap());
        assert!(marker.exists());
        assert!(catalog.displayed_infos()[0].is_favorite);

        assert!(!catalog.toggle_favorite("Foo").unwrap());
        assert!(!marker.exists());
        assert!(!catalog.displayed_infos()[0].is_favorite);
        assert!(!catalog.get("Foo").unwrap().is_favorite);
    }

    #[test]
    fn test_toggle_unknown_package() {
        let fixture = Fixture::new(&["Foo.archive"]);
        let mut catalog = fixture.catalog();
        assert!(matches!(
            catalog.toggle_favorite("Nope"),
            Err(ShelfError::PackageNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_names_keep_first() {
        let fixture = Fixture::new(&["Foo.archive"]);
        let nested = fixture.archives.path().join("z");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("Foo.archive"), b"second copy").unwrap();

        let catalog = fixture.catalog();
        assert_eq!(catalog.all_records().len(), 1);
        assert_eq!(catalog.all_records()[0].path, fixture.archives.path().join("Foo.archive"));
    }

    #[test]
    fn test_names_that_escape_the_cache_are_skipped() {
        let fixture = Fixture::new(&["...archive", ".hidden.archive", "Foo.archive"]);
        let catalog = fixture.catalog();
        assert_eq!(names(catalog.all_records()), vec![".hidden", "Foo"]);
    }
}
