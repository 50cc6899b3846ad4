//! Catalog of locally cached `.unitypackage` archives.
//!
//! Metadata is recovered from the gzip header's extra field without inflating
//! the payload, the thumbnail is copied out of the tar stream on its own, and
//! both are kept in a flat side-cache so repeated listing stays cheap.

pub mod cancel;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gzip_extra;
pub mod pipeline;
pub mod store;
pub mod tar_select;

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

pub use cancel::CancellationToken;
pub use catalog::{CatalogFilter, CatalogState, PackageCatalog, PackageInfo};
pub use config::{CacheLayout, ShelfConfig};
pub use error::{FailureKind, ItemFailure, Result, ShelfError};
pub use pipeline::{ArchiveSource, GzipArchiveSource, RefreshPipeline, RefreshProgress, RefreshReport};
pub use store::{MetadataStore, format_size_label, size_label};

/// An archive file found during a directory scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub modified: Option<u64>,
}

/// Join key shared by the scan, the cache and the catalog: file name minus extension.
///
/// Names that could not be used as a single cache directory component
/// (`.`, `..`) yield `None`.
pub fn archive_name(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .filter(|stem| is_cache_safe_name(stem))
}

/// Whether `name` maps to exactly one directory directly under the cache root.
pub fn is_cache_safe_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Content metadata embedded in the archive header and cached as `info.json`.
///
/// Every field is optional; a document missing a field (or holding `null`)
/// simply leaves it unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageMetadata {
    #[serde(deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub version: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<Labeled>,
    pub category: Option<Labeled>,
    pub link: Option<Link>,
    #[serde(rename = "pubdate")]
    pub upload_timestamp: Option<String>,
    #[serde(rename = "publishnotes")]
    pub publish_notes: Option<String>,
    #[serde(rename = "unity_version")]
    pub compatible_runtime_version: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub upload_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub version_id: Option<String>,
}

/// `{id, label}` pair used for both publisher and category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Labeled {
    #[serde(deserialize_with = "lenient_string")]
    pub id: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Link {
    #[serde(deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl PackageMetadata {
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

// Identifiers show up as both strings and bare numbers in the wild.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(serde_json::Number),
    }

    Ok(
        Option::<StringOrNumber>::deserialize(deserializer)?.map(|value| match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        }),
    )
}
