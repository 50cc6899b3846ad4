//! Reads the metadata blob embedded in a gzip member header.
//!
//! Package archives stash their JSON metadata in the optional FEXTRA field of
//! the gzip header, so it can be recovered from the first few bytes of the
//! file without inflating the payload.
//!
//! Header layout (RFC 1952):
//!
//! ```text
//! +---+---+---+---+---+---+---+---+---+---+---+---+=======//
//! |ID1|ID2|CM |FLG|     MTIME     |XFL|OS | XLEN  | extra...
//! +---+---+---+---+---+---+---+---+---+---+---+---+=======//
//! ```

use crate::{Result, ShelfError};
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
pub const FLG_FEXTRA: u8 = 0x04;

const FLG_OFFSET: u64 = 3;
const XLEN_OFFSET: u64 = 10;
const OPAQUE_PREFIX_LEN: usize = 4;

/// Returns the extra field payload with its 4-byte leading prefix removed.
///
/// The reader is only seeked and read; callers may rewind it or reopen the
/// file for decompression afterwards.
pub fn read_extension_field<R: Read + Seek>(reader: &mut R) -> Result<Vec<u8>> {
    let mut magic = [0u8; 2];
    read_at(reader, 0, &mut magic, "magic number")?;
    if magic != GZIP_MAGIC {
        return Err(ShelfError::InvalidFormat(format!(
            "bad magic {:02x} {:02x}",
            magic[0], magic[1]
        )));
    }

    let mut flag = [0u8; 1];
    read_at(reader, FLG_OFFSET, &mut flag, "flags")?;
    if flag[0] & FLG_FEXTRA == 0 {
        return Err(ShelfError::NoExtensionField);
    }

    let mut xlen = [0u8; 2];
    read_at(reader, XLEN_OFFSET, &mut xlen, "extra field length")?;
    let xlen = u16::from_le_bytes(xlen) as usize;
    if xlen < OPAQUE_PREFIX_LEN {
        return Err(ShelfError::InvalidFormat(format!(
            "extra field of {} bytes is shorter than its prefix",
            xlen
        )));
    }

    let mut extra = vec![0u8; xlen];
    read_exact(reader, &mut extra, "extra field")?;
    extra.drain(..OPAQUE_PREFIX_LEN);

    Ok(extra)
}

pub fn read_extension_field_from_path(path: &Path) -> Result<Vec<u8>> {
    let mut file =
        File::open(path).map_err(|e| ShelfError::io("Failed to open archive", path, e))?;
    read_extension_field(&mut file)
}

fn read_at<R: Read + Seek>(reader: &mut R, offset: u64, buf: &mut [u8], what: &str) -> Result<()> {
    reader.seek(SeekFrom::Start(offset))?;
    read_exact(reader, buf, what)
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => ShelfError::InvalidFormat(format!("header truncated in {}", what)),
        _ => e.into(),
    })
}
