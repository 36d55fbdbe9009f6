use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{FinbotError, Result};

/// Replace `path` with `bytes` in one step: write a sibling temp file,
/// fsync it, then rename it over the target. Readers see either the old
/// file or the new one, never a partial write.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| FinbotError::Io(e.error))?;
    Ok(())
}

/// Create `path` with `bytes`, failing if it already exists.
pub fn write_once(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create_new(true).write(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Event labels end up in file names; keep them to `[A-Za-z0-9_-]`.
pub fn sanitize_label(event: &str) -> String {
    let cleaned: String = event
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "manual".to_string()
    } else {
        cleaned
    }
}

pub fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

/// `<dir>/<stem>_<nanos>_<event>.<ext>`
pub fn versioned_path(dir: &Path, stem: &str, event: &str, ext: &str) -> PathBuf {
    dir.join(format!("{stem}_{}_{}.{ext}", now_nanos(), sanitize_label(event)))
}

/// Split a versioned file name back into `(nanos, event)`.
pub fn parse_versioned_name(file_name: &str, stem: &str) -> Option<(u128, String)> {
    let rest = file_name.strip_prefix(stem)?.strip_prefix('_')?;
    let rest = rest.rsplit_once('.').map(|(base, _)| base).unwrap_or(rest);
    let (nanos, event) = rest.split_once('_')?;
    Some((nanos.parse().ok()?, event.to_string()))
}

pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
