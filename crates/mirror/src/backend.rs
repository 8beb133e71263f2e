//! Remote tabular store interface.

use async_trait::async_trait;
use vqa_core::sheet::SheetHeader;

use crate::error::MirrorError;

/// A resolved worker sheet: its title and header row.
///
/// Resolving costs a round trip, so the cache keeps handles per worker and
/// only drops them when the backend reports the sheet missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetHandle {
    pub title: String,
    pub header: SheetHeader,
}

/// Operations the mirror needs from a spreadsheet service.
///
/// Row numbers are 1-based sheet rows; row 1 is the header.
#[async_trait]
pub trait SheetBackend: Send + Sync {
    /// Resolve the sheet of `worker_id`.
    async fn open(&self, worker_id: &str) -> Result<SheetHandle, MirrorError>;

    /// Every row of the sheet, header first, cells as display strings.
    async fn fetch_values(&self, sheet: &SheetHandle) -> Result<Vec<Vec<String>>, MirrorError>;

    /// Overwrite row `row_number` starting at the first column.
    async fn update_row(
        &self,
        sheet: &SheetHandle,
        row_number: usize,
        cells: Vec<String>,
    ) -> Result<(), MirrorError>;

    /// Append a row after the last non-empty row.
    async fn append_row(&self, sheet: &SheetHandle, cells: Vec<String>) -> Result<(), MirrorError>;
}
