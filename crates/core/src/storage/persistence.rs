//! Disk persistence primitives: checksummed framing and atomic file replacement.
//!
//! Vector files are laid out as `[magic "LEANNIDX"][payload][magic "LCR1"][u32 CRC32 BE]`.
//! Writes go to a `.tmp` sibling first and are renamed into place, so a reader
//! sees either the previous file or the new one, never a partial write.

use crate::config::SNAPSHOT_MAGIC;
use crate::error::{MemoryError, Result};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Magic bytes placed before the CRC32 footer.
const CRC_MAGIC: &[u8; 4] = b"LCR1";

/// Wraps `payload` with the file magic and a CRC32 footer.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let crc = crc32fast::hash(payload);
    let mut out = Vec::with_capacity(SNAPSHOT_MAGIC.len() + payload.len() + 8);
    out.extend_from_slice(SNAPSHOT_MAGIC);
    out.extend_from_slice(payload);
    out.extend_from_slice(CRC_MAGIC);
    out.extend_from_slice(&crc.to_be_bytes());
    out
}

/// Verifies magic and checksum and returns the payload slice.
/// A file without the CRC footer is accepted with a warning.
pub fn unframe<'a>(raw: &'a [u8], path: &Path) -> Result<&'a [u8]> {
    let body = raw.strip_prefix(SNAPSHOT_MAGIC.as_slice()).ok_or_else(|| {
        MemoryError::Corrupt(format!("{}: not a vector index file", path.display()))
    })?;

    if body.len() >= 8 && &body[body.len() - 8..body.len() - 4] == CRC_MAGIC {
        let payload = &body[..body.len() - 8];
        let stored_crc = u32::from_be_bytes([
            body[body.len() - 4],
            body[body.len() - 3],
            body[body.len() - 2],
            body[body.len() - 1],
        ]);
        let computed_crc = crc32fast::hash(payload);
        if computed_crc != stored_crc {
            return Err(MemoryError::Corrupt(format!(
                "{}: CRC32 mismatch (expected {:#010x}, got {:#010x})",
                path.display(),
                stored_crc,
                computed_crc
            )));
        }
        tracing::debug!("Snapshot CRC32 verified: {:#010x}", stored_crc);
        Ok(payload)
    } else {
        tracing::warn!(path = ?path, "vector file has no CRC32 footer");
        Ok(body)
    }
}

/// `<path>.tmp`
pub fn tmp_path(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}

/// `path` with `suffix` appended to its file name.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Writes `bytes` to the temp sibling of `path` and syncs it. Returns the temp path.
/// The parent directory is created if needed.
pub fn write_tmp(path: &Path, bytes: &[u8]) -> io::Result<PathBuf> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = tmp_path(path);
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
    }
    Ok(tmp)
}

/// Reads `path`, mapping "does not exist" to `None`.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Best-effort removal of a leftover temp file.
pub fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = ?path, error = %e, "failed to remove temp file");
        }
    }
}
