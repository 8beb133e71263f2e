//! In-process sheet backend.
//!
//! Used when no spreadsheet is configured, and by tests. Supports injected
//! failures, artificial latency and per-operation call counters.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use vqa_core::sheet::{SheetHeader, CANONICAL_HEADER, COL_IMAGE_ID};
use vqa_core::types::DbId;

use crate::backend::{SheetBackend, SheetHandle};
use crate::error::MirrorError;

/// A failure the next remote call will return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    RateLimited,
    Unavailable,
    SheetNotFound,
}

impl Fault {
    fn into_error(self, title: &str) -> MirrorError {
        match self {
            Fault::RateLimited => MirrorError::RateLimited,
            Fault::Unavailable => MirrorError::Api {
                status: 503,
                body: "service unavailable".to_string(),
            },
            Fault::SheetNotFound => MirrorError::SheetNotFound(title.to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    open: AtomicUsize,
    fetch: AtomicUsize,
    update: AtomicUsize,
    append: AtomicUsize,
}

/// Snapshot of how often each operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub open: usize,
    pub fetch: usize,
    pub update: usize,
    pub append: usize,
}

#[derive(Debug)]
pub struct InMemorySheets {
    sheets: Mutex<HashMap<String, Vec<Vec<String>>>>,
    faults: Mutex<VecDeque<Fault>>,
    latency: Mutex<Option<Duration>>,
    auto_create: bool,
    counters: Counters,
}

impl Default for InMemorySheets {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySheets {
    /// Backend that creates a sheet with the canonical header on first open.
    pub fn new() -> Self {
        Self {
            sheets: Mutex::new(HashMap::new()),
            faults: Mutex::new(VecDeque::new()),
            latency: Mutex::new(None),
            auto_create: true,
            counters: Counters::default(),
        }
    }

    /// Backend where opening an unknown sheet fails with `SheetNotFound`.
    pub fn without_auto_create() -> Self {
        Self {
            auto_create: false,
            ..Self::new()
        }
    }

    /// Replace a worker's sheet with `values` (header row first).
    pub fn set_sheet(&self, worker_id: &str, values: Vec<Vec<String>>) {
        self.lock_sheets().insert(worker_id.to_string(), values);
    }

    pub fn remove_sheet(&self, worker_id: &str) {
        self.lock_sheets().remove(worker_id);
    }

    /// Current content of a worker's sheet.
    pub fn values(&self, worker_id: &str) -> Vec<Vec<String>> {
        self.lock_sheets().get(worker_id).cloned().unwrap_or_default()
    }

    /// Edit one cell of the row holding `item_id`, the way a reviewer would.
    ///
    /// Returns `false` when the sheet, row or column does not exist.
    pub fn set_cell(&self, worker_id: &str, item_id: DbId, column: &str, value: &str) -> bool {
        let mut sheets = self.lock_sheets();
        let Some(values) = sheets.get_mut(worker_id) else {
            return false;
        };
        let Some(header) = values.first().map(|h| SheetHeader::new(h.clone())) else {
            return false;
        };
        let (Some(id_col), Some(col)) = (header.position(COL_IMAGE_ID), header.position(column))
        else {
            return false;
        };
        let id = item_id.to_string();
        let Some(row) = values
            .iter_mut()
            .skip(1)
            .find(|row| row.get(id_col).map(|c| c.trim()) == Some(id.as_str()))
        else {
            return false;
        };
        if row.len() <= col {
            row.resize(col + 1, String::new());
        }
        row[col] = value.to_string();
        true
    }

    /// Queue a failure for the next remote call.
    pub fn fail_next(&self, fault: Fault) {
        self.faults
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(fault);
    }

    /// Delay every call by `latency` (observes tokio's clock).
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(|p| p.into_inner()) = latency;
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            open: self.counters.open.load(Ordering::SeqCst),
            fetch: self.counters.fetch.load(Ordering::SeqCst),
            update: self.counters.update.load(Ordering::SeqCst),
            append: self.counters.append.load(Ordering::SeqCst),
        }
    }

    fn lock_sheets(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Vec<String>>>> {
        self.sheets.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Common prologue of every call: latency, then any queued fault.
    async fn enter(&self, counter: &AtomicUsize, title: &str) -> Result<(), MirrorError> {
        counter.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let fault = self
            .faults
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        match fault {
            Some(fault) => Err(fault.into_error(title)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SheetBackend for InMemorySheets {
    async fn open(&self, worker_id: &str) -> Result<SheetHandle, MirrorError> {
        self.enter(&self.counters.open, worker_id).await?;
        let mut sheets = self.lock_sheets();
        if !sheets.contains_key(worker_id) {
            if !self.auto_create {
                return Err(MirrorError::SheetNotFound(worker_id.to_string()));
            }
            let header = CANONICAL_HEADER.iter().map(|c| c.to_string()).collect();
            sheets.insert(worker_id.to_string(), vec![header]);
        }
        let header = sheets
            .get(worker_id)
            .and_then(|v| v.first())
            .cloned()
            .unwrap_or_default();
        Ok(SheetHandle {
            title: worker_id.to_string(),
            header: SheetHeader::new(header),
        })
    }

    async fn fetch_values(&self, sheet: &SheetHandle) -> Result<Vec<Vec<String>>, MirrorError> {
        self.enter(&self.counters.fetch, &sheet.title).await?;
        self.lock_sheets()
            .get(&sheet.title)
            .cloned()
            .ok_or_else(|| MirrorError::SheetNotFound(sheet.title.clone()))
    }

    async fn update_row(
        &self,
        sheet: &SheetHandle,
        row_number: usize,
        cells: Vec<String>,
    ) -> Result<(), MirrorError> {
        self.enter(&self.counters.update, &sheet.title).await?;
        let mut sheets = self.lock_sheets();
        let values = sheets
            .get_mut(&sheet.title)
            .ok_or_else(|| MirrorError::SheetNotFound(sheet.title.clone()))?;
        if row_number < 1 {
            return Err(MirrorError::Api {
                status: 400,
                body: "row numbers start at 1".to_string(),
            });
        }
        if values.len() < row_number {
            values.resize(row_number, Vec::new());
        }
        values[row_number - 1] = cells;
        Ok(())
    }

    async fn append_row(&self, sheet: &SheetHandle, cells: Vec<String>) -> Result<(), MirrorError> {
        self.enter(&self.counters.append, &sheet.title).await?;
        let mut sheets = self.lock_sheets();
        let values = sheets
            .get_mut(&sheet.title)
            .ok_or_else(|| MirrorError::SheetNotFound(sheet.title.clone()))?;
        values.push(cells);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use vqa_core::sheet::COL_VERDICT;

    use super::*;

    #[tokio::test]
    async fn open_creates_canonical_sheet() {
        let sheets = InMemorySheets::new();
        let handle = sheets.open("w1").await.unwrap();
        assert_eq!(handle.header, SheetHeader::canonical());
        assert_eq!(sheets.values("w1").len(), 1);
    }

    #[tokio::test]
    async fn strict_backend_reports_missing_sheet() {
        let sheets = InMemorySheets::without_auto_create();
        assert_matches!(sheets.open("w1").await, Err(MirrorError::SheetNotFound(_)));
    }

    #[tokio::test]
    async fn queued_fault_is_returned_once() {
        let sheets = InMemorySheets::new();
        sheets.fail_next(Fault::RateLimited);
        assert_matches!(sheets.open("w1").await, Err(MirrorError::RateLimited));
        assert!(sheets.open("w1").await.is_ok());
        assert_eq!(sheets.calls().open, 2);
    }

    #[tokio::test]
    async fn set_cell_edits_row_by_item_id() {
        let sheets = InMemorySheets::new();
        let handle = sheets.open("w1").await.unwrap();
        let mut row = vec![String::new(); handle.header.len()];
        row[handle.header.position(COL_IMAGE_ID).unwrap()] = "42".to_string();
        sheets.append_row(&handle, row).await.unwrap();

        assert!(sheets.set_cell("w1", 42, COL_VERDICT, "통과"));
        assert!(!sheets.set_cell("w1", 43, COL_VERDICT, "통과"));
        let values = sheets.values("w1");
        assert_eq!(values[1][handle.header.position(COL_VERDICT).unwrap()], "통과");
    }
}
