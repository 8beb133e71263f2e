//! Temp-file-then-rename writes.
//!
//! The replacement is written to a temporary file in the destination's
//! directory, flushed to disk, then renamed over the destination. Readers see
//! either the old content or the new content, never a truncated file.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::StoreError;

/// A fully written replacement waiting to be renamed into place.
///
/// Dropping a `StagedWrite` without calling [`StagedWrite::commit`] deletes the
/// temporary file and leaves the destination exactly as it was.
#[derive(Debug)]
pub struct StagedWrite {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    /// Path of the temporary file holding the new content.
    pub fn temp_path(&self) -> &Path {
        self.tmp.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Rename the staged file over the destination.
    pub fn commit(self) -> Result<(), StoreError> {
        let target = self.target;
        self.tmp
            .persist(&target)
            .map_err(|e| StoreError::atomic(&target, e.error))?;
        Ok(())
    }
}

/// Write `bytes` to a temporary sibling of `target` and fsync it.
pub fn stage(target: &Path, bytes: &[u8]) -> Result<StagedWrite, StoreError> {
    let dir = parent_dir(target);
    std::fs::create_dir_all(&dir).map_err(|e| StoreError::atomic(target, e))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| StoreError::atomic(target, e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| StoreError::atomic(target, e))?;

    Ok(StagedWrite {
        tmp,
        target: target.to_path_buf(),
    })
}

/// Atomically replace `target` with `bytes`.
pub fn write_atomically(target: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    stage(target, bytes)?.commit()
}

/// Serialize `value` as pretty JSON (UTF-8, trailing newline).
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Atomically replace `target` with `value` serialized as pretty JSON.
pub fn write_json_atomically<T: Serialize + ?Sized>(
    target: &Path,
    value: &T,
) -> Result<(), StoreError> {
    write_atomically(target, &to_pretty_json(value)?)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
