//! Persistent worker assignment book.
//!
//! A JSON object mapping each worker id to its list of assignments.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{NaiveDate, TimeZone, Utc};
use vqa_core::assignment::{self, Assignment, AssignmentStatus, CompletionStats, WorkerProgress};
use vqa_core::types::DbId;

use crate::document::JsonDocument;
use crate::error::StoreError;

type Book = BTreeMap<String, Vec<Assignment>>;

#[derive(Debug)]
pub struct AssignmentBook {
    doc: JsonDocument<Book>,
}

impl AssignmentBook {
    /// Load the book from `path`. A missing file is an empty book.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let doc = JsonDocument::open(path)?;
        tracing::debug!(
            path = %doc.path().display(),
            workers = doc.read(Book::len),
            "Assignment book loaded"
        );
        Ok(Self { doc })
    }

    fn update<T>(&self, f: impl FnOnce(&mut Book) -> T) -> Result<T, StoreError> {
        self.doc.update(f)
    }

    fn read<T>(&self, f: impl FnOnce(&Book) -> T) -> T {
        self.doc.read(f)
    }

    /// Assign `image_ids` to `worker_id`. Ids the worker already holds are
    /// skipped. Returns how many were newly assigned.
    pub fn assign(&self, worker_id: &str, image_ids: &[DbId]) -> Result<usize, StoreError> {
        let now = Utc::now();
        let added = self.update(|book| {
            let list = book.entry(worker_id.to_string()).or_default();
            let mut added = 0;
            for &id in image_ids {
                if list.iter().all(|a| a.image_id != id) {
                    list.push(Assignment::new(id, now));
                    added += 1;
                }
            }
            added
        })?;
        tracing::info!(worker_id, added, "Images assigned");
        Ok(added)
    }

    /// Mark one assignment completed. Returns `false` when the worker does
    /// not hold the image or it was already completed.
    pub fn mark_completed(&self, worker_id: &str, image_id: DbId) -> Result<bool, StoreError> {
        let now = Utc::now();
        self.update(|book| {
            let Some(entry) = book
                .get_mut(worker_id)
                .and_then(|list| list.iter_mut().find(|a| a.image_id == image_id))
            else {
                return false;
            };
            if entry.status == AssignmentStatus::Completed {
                return false;
            }
            entry.status = AssignmentStatus::Completed;
            entry.completed_at = Some(now);
            true
        })
    }

    pub fn assignments(&self, worker_id: &str) -> Vec<Assignment> {
        self.read(|book| book.get(worker_id).cloned().unwrap_or_default())
    }

    /// Image ids assigned to `worker_id`, in assignment order.
    pub fn image_ids(&self, worker_id: &str) -> Vec<DbId> {
        self.read(|book| {
            book.get(worker_id)
                .map(|list| list.iter().map(|a| a.image_id).collect())
                .unwrap_or_default()
        })
    }

    pub fn workers(&self) -> Vec<String> {
        self.read(|book| book.keys().cloned().collect())
    }

    /// Completions of `worker_id` bucketed by day and hour in `tz`.
    pub fn completion_stats<Tz: TimeZone>(
        &self,
        worker_id: &str,
        tz: &Tz,
        date: Option<NaiveDate>,
    ) -> CompletionStats
    where
        Tz::Offset: std::fmt::Display,
    {
        self.read(|book| {
            book.get(worker_id)
                .map(|list| assignment::completion_stats(list, tz, date))
                .unwrap_or_default()
        })
    }

    pub fn progress(&self, worker_id: &str) -> WorkerProgress {
        self.read(|book| {
            book.get(worker_id)
                .map(|list| assignment::progress(list))
                .unwrap_or_default()
        })
    }
}
