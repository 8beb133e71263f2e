use std::path::PathBuf;
use std::time::Duration;

/// Errors raised by the local record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading a file or taking its lock failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing or renaming the replacement file failed. The destination is untouched.
    #[error("Atomic write to {path} failed: {source}")]
    AtomicWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The partition lock was not acquired before the save deadline.
    #[error("Timed out after {waited:?} waiting for the lock on {path}")]
    LockTimeout { path: PathBuf, waited: Duration },

    /// Records could not be serialized for writing.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn atomic(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::AtomicWrite {
            path: path.into(),
            source,
        }
    }
}
