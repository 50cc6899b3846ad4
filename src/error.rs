//! Error types for the archive catalog.
//!
//! Only directory-level failures reach callers as hard errors. Everything that
//! goes wrong for a single archive is folded into an [`ItemFailure`] and the
//! batch keeps going.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShelfError {
    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Not a gzip archive: {0}")]
    InvalidFormat(String),

    #[error("Gzip header has no extension field")]
    NoExtensionField,

    #[error("Malformed metadata in {path}: {reason}")]
    MalformedMetadata { path: PathBuf, reason: String },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Package name cannot be used as a cache directory: {0:?}")]
    InvalidName(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl ShelfError {
    pub fn io(message: impl Into<String>, path: &Path, source: std::io::Error) -> Self {
        ShelfError::Io {
            message: message.into(),
            path: Some(path.to_path_buf()),
            source: Some(source),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ShelfError::DirectoryNotFound(_) => FailureKind::DirectoryNotFound,
            ShelfError::InvalidFormat(_) => FailureKind::InvalidFormat,
            ShelfError::NoExtensionField => FailureKind::NoExtensionField,
            ShelfError::MalformedMetadata { .. } => FailureKind::MalformedMetadata,
            ShelfError::Io { .. } => FailureKind::Io,
            ShelfError::PackageNotFound(_) => FailureKind::PackageNotFound,
            ShelfError::InvalidName(_) => FailureKind::InvalidName,
            ShelfError::Cancelled => FailureKind::Cancelled,
        }
    }
}

impl From<std::io::Error> for ShelfError {
    fn from(err: std::io::Error) -> Self {
        ShelfError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, ShelfError>;

/// Coarse classification of a failure, suitable for summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    DirectoryNotFound,
    InvalidFormat,
    NoExtensionField,
    MalformedMetadata,
    Io,
    PackageNotFound,
    InvalidName,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::DirectoryNotFound => "directory not found",
            FailureKind::InvalidFormat => "invalid format",
            FailureKind::NoExtensionField => "no extension field",
            FailureKind::MalformedMetadata => "malformed metadata",
            FailureKind::Io => "io failure",
            FailureKind::PackageNotFound => "package not found",
            FailureKind::InvalidName => "invalid name",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// A per-archive failure absorbed by a batch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub name: String,
    pub kind: FailureKind,
    pub message: String,
}

impl ItemFailure {
    pub fn new(name: &str, err: &ShelfError) -> Self {
        Self {
            name: name.to_string(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.name, self.message, self.kind)
    }
}
