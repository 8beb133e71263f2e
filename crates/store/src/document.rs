//! A small JSON document kept in memory and mirrored to one file.
//!
//! Every mutation is applied to a copy, written atomically, and only then
//! made visible, so a failed write leaves memory and disk in agreement.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::atomic::write_json_atomically;
use crate::error::StoreError;
use crate::partition::back_up_corrupt;

#[derive(Debug)]
pub(crate) struct JsonDocument<T> {
    path: PathBuf,
    value: Mutex<T>,
}

impl<T> JsonDocument<T>
where
    T: Clone + Default + PartialEq + Serialize + DeserializeOwned,
{
    /// Load from `path`. Missing and blank files are the default value; a
    /// malformed file is backed up and replaced by the default.
    pub(crate) fn open(path: &Path) -> Result<Self, StoreError> {
        let value = match std::fs::read(path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => T::default(),
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                Err(e) => {
                    let backup = back_up_corrupt(path)?;
                    tracing::error!(
                        path = %path.display(),
                        backup = %backup.display(),
                        error = %e,
                        "Malformed document backed up, starting empty"
                    );
                    T::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        Ok(Self {
            path: path.to_path_buf(),
            value: Mutex::new(value),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `f` and persist the result if it changed anything.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, StoreError> {
        let mut guard = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        let out = f(&mut next);
        if *guard != next {
            write_json_atomically(&self.path, &next)?;
            *guard = next;
        }
        Ok(out)
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }
}
