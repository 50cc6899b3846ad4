//! Copies a single named entry out of a tar stream.
//!
//! The whole stream is walked, but only entries whose final path component
//! matches the target are written; everything else is read past and dropped.

use crate::{Result, ShelfError};
use filetime::FileTime;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::{debug, warn};

/// Extracts every regular entry named `target` into `destination`, keeping its
/// relative directory. Returns the path of the last one written, or `None`
/// when the archive holds no such entry.
pub fn extract_one<R: Read>(reader: R, destination: &Path, target: &str) -> Result<Option<PathBuf>> {
    let mut archive = Archive::new(reader);
    let mut written = None;

    let entries = archive
        .entries()
        .map_err(|e| ShelfError::io("Failed to read tar stream", destination, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ShelfError::io("Failed to read tar entry", destination, e))?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let raw_name = String::from_utf8_lossy(&entry.path_bytes()).to_string();
        let relative = sanitize_entry_path(&raw_name);
        if relative.file_name().is_none_or(|name| name != target) {
            continue;
        }

        let out_path = destination.join(&relative);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ShelfError::io("Failed to create directory", parent, e))?;
        }

        {
            let mut file = File::create(&out_path)
                .map_err(|e| ShelfError::io("Failed to create file", &out_path, e))?;
            io::copy(&mut entry, &mut file)
                .map_err(|e| ShelfError::io("Failed to copy tar entry", &out_path, e))?;
        }

        // Header mtime is seconds since the Unix epoch, already UTC.
        match entry.header().mtime() {
            Ok(mtime) => {
                let time = FileTime::from_unix_time(mtime as i64, 0);
                if let Err(e) = filetime::set_file_mtime(&out_path, time) {
                    warn!("Failed to set mtime on {}: {}", out_path.display(), e);
                }
            }
            Err(e) => warn!("Unreadable mtime for {}: {}", raw_name, e),
        }

        debug!("Extracted {} to {}", raw_name, out_path.display());
        written = Some(out_path);
    }

    Ok(written)
}

/// Turns a tar entry name into a relative path that cannot leave the
/// destination: separators are normalized, and root, drive prefixes, `.` and
/// `..` components are dropped.
pub fn sanitize_entry_path(raw: &str) -> PathBuf {
    let normalized = raw.replace('\\', "/");
    let mut clean = PathBuf::new();

    for (index, part) in normalized.split('/').enumerate() {
        match part {
            "" | "." | ".." => continue,
            _ if index == 0 && is_drive_prefix(part) => continue,
            _ => clean.push(part),
        }
    }

    clean
}

fn is_drive_prefix(part: &str) -> bool {
    let bytes = part.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tar::{Builder, EntryType, Header};
    use tempfile::TempDir;
    use walkdir::WalkDir;

    fn file_header(size: usize, mtime: u64) -> Header {
        let mut header = Header::new_gnu();
        header.set_size(size as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        header.set_entry_type(EntryType::Regular);
        header
    }

    fn append(builder: &mut Builder<Vec<u8>>, path: &str, data: &[u8]) {
        let mut header = file_header(data.len(), 1_500_000_000);
        builder.append_data(&mut header, path, data).unwrap();
    }

    // Writes the name straight into the header so unsafe paths survive.
    fn append_raw(builder: &mut Builder<Vec<u8>>, name: &str, data: &[u8]) {
        let mut header = file_header(data.len(), 1_500_000_000);
        let field = &mut header.as_old_mut().name;
        field[..name.len()].copy_from_slice(name.as_bytes());
        header.set_cksum();
        builder.append(&header, data).unwrap();
    }

    fn files_under(dir: &Path) -> Vec<PathBuf> {
        WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .collect()
    }

    #[test]
    fn test_extracts_only_target_entry() {
        let mut builder = Builder::new(Vec::new());
        append(&mut builder, "a.txt", b"alpha");
        append(&mut builder, "dir/.icon.png", b"\x89PNG icon bytes");
        append(&mut builder, "dir/b.txt", b"beta");
        let tar = builder.into_inner().unwrap();

        let tmp = TempDir::new().unwrap();
        let written = extract_one(tar.as_slice(), tmp.path(), ".icon.png").unwrap().unwrap();

        assert_eq!(written, tmp.path().join("dir").join(".icon.png"));
        assert_eq!(fs::read(&written).unwrap(), b"\x89PNG icon bytes");
        assert_eq!(files_under(tmp.path()), vec![written]);
    }

    #[test]
    fn test_preserves_entry_mtime() {
        let mut builder = Builder::new(Vec::new());
        append(&mut builder, ".icon.png", b"icon");
        let tar = builder.into_inner().unwrap();

        let tmp = TempDir::new().unwrap();
        let written = extract_one(tar.as_slice(), tmp.path(), ".icon.png").unwrap().unwrap();

        let meta = fs::metadata(&written).unwrap();
        assert_eq!(
            FileTime::from_last_modification_time(&meta).unix_seconds(),
            1_500_000_000
        );
    }

    #[test]
    fn test_missing_target_writes_nothing() {
        let mut builder = Builder::new(Vec::new());
        append(&mut builder, "a.txt", b"alpha");
        append(&mut builder, "icon.png", b"not hidden");
        let tar = builder.into_inner().unwrap();

        let tmp = TempDir::new().unwrap();
        assert!(extract_one(tar.as_slice(), tmp.path(), ".icon.png").unwrap().is_none());
        assert!(files_under(tmp.path()).is_empty());
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let mut builder = Builder::new(Vec::new());
        append(&mut builder, ".ICON.png", b"icon");
        let tar = builder.into_inner().unwrap();

        let tmp = TempDir::new().unwrap();
        assert!(extract_one(tar.as_slice(), tmp.path(), ".icon.png").unwrap().is_none());
    }

    #[test]
    fn test_directory_entries_are_skipped() {
        let mut builder = Builder::new(Vec::new());
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        builder.append_data(&mut header, ".icon.png/", io::empty()).unwrap();
        let tar = builder.into_inner().unwrap();

        let tmp = TempDir::new().unwrap();
        assert!(extract_one(tar.as_slice(), tmp.path(), ".icon.png").unwrap().is_none());
        assert!(files_under(tmp.path()).is_empty());
    }

    #[test]
    fn test_traversal_names_stay_inside_destination() {
        let mut builder = Builder::new(Vec::new());
        append_raw(&mut builder, "/../../evil.png", b"evil one");
        append_raw(&mut builder, "C:\\evil.png", b"evil two");
        let tar = builder.into_inner().unwrap();

        let outer = TempDir::new().unwrap();
        let destination = outer.path().join("scratch").join("pkg");
        fs::create_dir_all(&destination).unwrap();

        let written = extract_one(tar.as_slice(), &destination, "evil.png").unwrap().unwrap();
        assert!(written.starts_with(&destination));
        assert_eq!(fs::read(&written).unwrap(), b"evil two");

        for file in files_under(outer.path()) {
            assert!(file.starts_with(&destination), "escaped: {}", file.display());
        }
    }

    #[test]
    fn test_sanitize_entry_path() {
        assert_eq!(sanitize_entry_path("/../../evil.png"), PathBuf::from("evil.png"));
        assert_eq!(sanitize_entry_path("C:\\evil.png"), PathBuf::from("evil.png"));
        assert_eq!(
            sanitize_entry_path("./dir\\sub/../.icon.png"),
            PathBuf::from("dir").join("sub").join(".icon.png")
        );
        assert_eq!(sanitize_entry_path(".."), PathBuf::new());
    }
}
