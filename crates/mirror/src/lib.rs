//! Best-effort mirror of annotation rows into per-worker review sheets.
//!
//! The sheets are where reviewers record verdicts; the service reads them
//! back to derive workflow status. Nothing here is authoritative over the
//! local store, and every failure is recoverable by the caller.

pub mod backend;
pub mod cache;
pub mod error;
pub mod google;
pub mod memory;

pub use backend::{SheetBackend, SheetHandle};
pub use cache::{MirrorCache, MirrorConfig, WriteOutcome};
pub use error::MirrorError;
pub use google::GoogleSheetsBackend;
pub use memory::{Fault, InMemorySheets};
