//! Annotation service: the operations behind the HTTP surface.
//!
//! The local partition store is the source of truth. Each save is committed
//! there first; only then is the row mirrored to the worker's review sheet,
//! after every store lock is released. A mirror failure is reported next to
//! a successful save, never instead of it.
//!
//! Store and assignment-book calls do blocking file I/O and run on the
//! blocking pool.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use vqa_core::assignment::{
    self, parse_stats_date, validate_worker_id, Assignment, CompletionStats, Worker,
    WorkerProgress, WorkerRegistration,
};
use vqa_core::catalog::ImageCatalog;
use vqa_core::error::CoreError;
use vqa_core::export::{passed_records, ExportOutcome};
use vqa_core::record::{AnnotationDraft, AnnotationRecord, Partition};
use vqa_core::sheet::{RemoteRow, RowPatch, SAVED_AT_FORMAT};
use vqa_core::status::{sort_entries, ListSort, StatusCounts, StatusEntry, WorkItemStatus};
use vqa_core::types::DbId;
use vqa_mirror::{MirrorCache, WriteOutcome};
use vqa_store::{AssignmentBook, PartitionStore, StoreError, SweepReport, WorkerRegistry};

use crate::error::{AppError, AppResult};

/* --------------------------------------------------------------------------
   Outcomes
   -------------------------------------------------------------------------- */

/// Result of a successful save.
#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub item_id: DbId,
    pub partition: Partition,
    /// A record with the same id already existed in the target partition.
    pub updated: bool,
    /// The item moved here from the other partition.
    pub migrated: bool,
    /// A stale copy in the other partition awaits the dedup sweep.
    pub eviction_pending: bool,
    /// Where the row landed in the worker's sheet, when mirrored.
    pub mirror: Option<WriteOutcome>,
    /// Why mirroring failed. The save itself is durable regardless.
    pub mirror_error: Option<String>,
    pub worker_progress: Option<WorkerProgress>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkipOutcome {
    pub item_id: DbId,
    pub status: WorkItemStatus,
    pub row_number: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignOutcome {
    pub worker_id: String,
    pub added: usize,
    pub progress: WorkerProgress,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterOutcome {
    pub worker: Worker,
    pub is_new: bool,
}

/// Request body of an even distribution.
#[derive(Debug, Clone, Deserialize)]
pub struct DistributeRequest {
    pub workers: Vec<String>,
    /// Ids to split. Defaults to every catalog image nobody holds yet.
    #[serde(default)]
    pub image_ids: Option<Vec<DbId>>,
}

/// Per-worker count of newly assigned images.
#[derive(Debug, Clone, Serialize)]
pub struct DistributeOutcome {
    pub total: usize,
    pub assigned: BTreeMap<String, usize>,
}

/* --------------------------------------------------------------------------
   Service
   -------------------------------------------------------------------------- */

pub struct AnnotationService {
    store: Arc<PartitionStore>,
    mirror: Arc<MirrorCache>,
    catalog: Arc<dyn ImageCatalog>,
    assignments: Arc<AssignmentBook>,
    registry: Arc<WorkerRegistry>,
}

impl AnnotationService {
    pub fn new(
        store: Arc<PartitionStore>,
        mirror: Arc<MirrorCache>,
        catalog: Arc<dyn ImageCatalog>,
        assignments: Arc<AssignmentBook>,
        registry: Arc<WorkerRegistry>,
    ) -> Self {
        Self {
            store,
            mirror,
            catalog,
            assignments,
            registry,
        }
    }

    pub fn store(&self) -> &Arc<PartitionStore> {
        &self.store
    }

    /// Run a store operation on the blocking pool.
    async fn with_store<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&PartitionStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| AppError::InternalError(format!("store task failed: {e}")))?
            .map_err(AppError::from)
    }

    /// Run an assignment-book operation on the blocking pool.
    async fn with_book<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&AssignmentBook) -> Result<T, StoreError> + Send + 'static,
    {
        let book = Arc::clone(&self.assignments);
        tokio::task::spawn_blocking(move || f(&book))
            .await
            .map_err(|e| AppError::InternalError(format!("assignment task failed: {e}")))?
            .map_err(AppError::from)
    }

    async fn with_registry<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&WorkerRegistry) -> Result<T, StoreError> + Send + 'static,
    {
        let registry = Arc::clone(&self.registry);
        tokio::task::spawn_blocking(move || f(&registry))
            .await
            .map_err(|e| AppError::InternalError(format!("registry task failed: {e}")))?
            .map_err(AppError::from)
    }

    /* ---- save ---- */

    /// Validate, persist, then mirror one annotation.
    pub async fn save_annotation(&self, draft: AnnotationDraft) -> AppResult<SaveOutcome> {
        draft.validate()?;
        let worker_id = draft.worker_id.clone().filter(|w| !w.trim().is_empty());
        if let Some(worker_id) = &worker_id {
            validate_worker_id(worker_id)?;
        }

        let image = self.catalog.get(draft.image_id).ok_or(CoreError::NotFound {
            entity: "Image",
            id: draft.image_id,
        })?;
        let record = draft.into_record(&image)?;
        let item_id = record.item_id;

        let saved_at = Local::now().format(SAVED_AT_FORMAT).to_string();
        let patch = RowPatch::for_record(&record, &saved_at);

        let put = self.with_store(move |store| store.put(record)).await?;

        let mut outcome = SaveOutcome {
            item_id,
            partition: put.partition,
            updated: put.updated,
            migrated: put.migrated,
            eviction_pending: put.eviction_pending,
            mirror: None,
            mirror_error: None,
            worker_progress: None,
        };

        let Some(worker_id) = worker_id else {
            return Ok(outcome);
        };

        let completed = {
            let worker_id = worker_id.clone();
            self.with_book(move |book| book.mark_completed(&worker_id, item_id))
                .await
        };
        if let Err(e) = completed {
            tracing::warn!(item_id, worker_id = %worker_id, error = %e, "Failed to mark assignment completed");
        }

        match self.mirror.write(&worker_id, &patch).await {
            Ok(written) => outcome.mirror = Some(written),
            Err(e) => {
                tracing::warn!(item_id, worker_id = %worker_id, error = %e, "Saved locally but mirroring failed");
                outcome.mirror_error = Some(e.to_string());
            }
        }
        outcome.worker_progress = Some(self.assignments.progress(&worker_id));
        Ok(outcome)
    }

    /// The locally stored record for `item_id`.
    pub async fn find_record(&self, item_id: DbId) -> AppResult<AnnotationRecord> {
        self.with_store(move |store| store.find(item_id))
            .await?
            .ok_or(AppError::Core(CoreError::NotFound {
                entity: "Annotation",
                id: item_id,
            }))
    }

    /* ---- status ---- */

    async fn rows(&self, worker_id: &str, refresh: bool) -> AppResult<Vec<RemoteRow>> {
        validate_worker_id(worker_id)?;
        Ok(self.mirror.read(worker_id, refresh).await?)
    }

    /// Workflow status of one item in a worker's sheet.
    pub async fn get_status(
        &self,
        item_id: DbId,
        worker_id: &str,
        refresh: bool,
    ) -> AppResult<StatusEntry> {
        let rows = self.rows(worker_id, refresh).await?;
        let saved_locally = self.with_store(move |store| store.contains(item_id)).await?;
        let row = rows.iter().find(|r| r.item_id == item_id);
        let mut entry = StatusEntry::new(item_id, row, saved_locally);
        self.fill_assigned_at(worker_id, std::slice::from_mut(&mut entry));
        Ok(entry)
    }

    /// Every item of a worker with its status, optionally filtered.
    ///
    /// The item universe is the worker's assignments plus any row in their
    /// sheet; the local store only upgrades rowless items to `working`.
    pub async fn list_by_status(
        &self,
        worker_id: &str,
        status: Option<WorkItemStatus>,
        sort: ListSort,
        refresh: bool,
    ) -> AppResult<Vec<StatusEntry>> {
        let rows = self.rows(worker_id, refresh).await?;
        let local: HashSet<DbId> = self
            .with_store(|store| store.reload())
            .await?
            .into_iter()
            .map(|r| r.item_id)
            .collect();

        let by_id: HashMap<DbId, &RemoteRow> = rows.iter().map(|r| (r.item_id, r)).collect();
        let universe: BTreeSet<DbId> = self
            .assignments
            .image_ids(worker_id)
            .into_iter()
            .chain(by_id.keys().copied())
            .collect();

        let mut entries: Vec<StatusEntry> = universe
            .into_iter()
            .map(|id| StatusEntry::new(id, by_id.get(&id).copied(), local.contains(&id)))
            .filter(|e| status.map_or(true, |s| e.status == s))
            .collect();
        self.fill_assigned_at(worker_id, &mut entries);
        sort_entries(&mut entries, sort);

        tracing::debug!(worker_id, count = entries.len(), ?status, "Listed items by status");
        Ok(entries)
    }

    /// Items without a sheet assignment time take it from the assignment book.
    fn fill_assigned_at(&self, worker_id: &str, entries: &mut [StatusEntry]) {
        if entries.iter().all(|e| e.assigned_at.is_some()) {
            return;
        }
        let assigned: HashMap<DbId, String> = self
            .assignments
            .assignments(worker_id)
            .into_iter()
            .map(|a| {
                let at = a.assigned_at.with_timezone(&Local).format(SAVED_AT_FORMAT);
                (a.image_id, at.to_string())
            })
            .collect();
        for entry in entries.iter_mut().filter(|e| e.assigned_at.is_none()) {
            entry.assigned_at = assigned.get(&entry.item_id).cloned();
        }
    }

    /// Per-status counts over the worker's items.
    pub async fn statistics(&self, worker_id: &str, refresh: bool) -> AppResult<StatusCounts> {
        let entries = self
            .list_by_status(worker_id, None, ListSort::ImageId, refresh)
            .await?;
        Ok(StatusCounts::tally(entries.iter().map(|e| e.status)))
    }

    /// Mark an item skipped in the worker's sheet.
    ///
    /// Skipping lives only in the sheet, so a remote failure fails the call.
    pub async fn skip(&self, item_id: DbId, worker_id: &str) -> AppResult<SkipOutcome> {
        validate_worker_id(worker_id)?;
        let written = self.mirror.write(worker_id, &RowPatch::skip(item_id)).await?;
        tracing::info!(item_id, worker_id, row_number = written.row_number, "Item skipped");
        Ok(SkipOutcome {
            item_id,
            status: WorkItemStatus::Skipped,
            row_number: written.row_number,
        })
    }

    /// Rows a reviewer passed, converted back into records.
    pub async fn export_passed(&self, worker_id: &str, refresh: bool) -> AppResult<ExportOutcome> {
        let rows = self.rows(worker_id, refresh).await?;
        let outcome = passed_records(&rows);
        tracing::info!(
            worker_id,
            exported = outcome.records.len(),
            skipped = outcome.skipped.len(),
            "Exported passed rows"
        );
        Ok(outcome)
    }

    pub async fn invalidate(&self, worker_id: &str) -> AppResult<()> {
        validate_worker_id(worker_id)?;
        self.mirror.invalidate(worker_id).await;
        Ok(())
    }

    /* ---- assignments ---- */

    fn ensure_known_images(&self, image_ids: &[DbId]) -> AppResult<()> {
        let unknown: Vec<String> = image_ids
            .iter()
            .filter(|id| self.catalog.get(**id).is_none())
            .map(ToString::to_string)
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(format!("Unknown image ids: {}", unknown.join(", "))).into())
        }
    }

    pub async fn assign(&self, worker_id: &str, image_ids: Vec<DbId>) -> AppResult<AssignOutcome> {
        validate_worker_id(worker_id)?;
        self.ensure_known_images(&image_ids)?;

        let worker = worker_id.to_string();
        let added = self
            .with_book(move |book| book.assign(&worker, &image_ids))
            .await?;
        Ok(AssignOutcome {
            worker_id: worker_id.to_string(),
            added,
            progress: self.assignments.progress(worker_id),
        })
    }

    pub fn progress(&self, worker_id: &str) -> AppResult<WorkerProgress> {
        validate_worker_id(worker_id)?;
        Ok(self.assignments.progress(worker_id))
    }

    /// Every assignment of the worker, in assignment order.
    pub fn worker_assignments(&self, worker_id: &str) -> AppResult<Vec<Assignment>> {
        validate_worker_id(worker_id)?;
        Ok(self.assignments.assignments(worker_id))
    }

    /// Mark one assignment completed by hand.
    pub async fn complete(&self, worker_id: &str, image_id: DbId) -> AppResult<WorkerProgress> {
        validate_worker_id(worker_id)?;
        let worker = worker_id.to_string();
        let completed = self
            .with_book(move |book| book.mark_completed(&worker, image_id))
            .await?;
        if !completed {
            return Err(CoreError::NotFound {
                entity: "Open assignment",
                id: image_id,
            }
            .into());
        }
        tracing::info!(worker_id, image_id, "Assignment completed manually");
        Ok(self.assignments.progress(worker_id))
    }

    /// Completions per local day and hour, optionally for one `YYYY-MM-DD`.
    pub fn worker_stats(&self, worker_id: &str, date: Option<&str>) -> AppResult<CompletionStats> {
        validate_worker_id(worker_id)?;
        let date = date
            .filter(|d| !d.trim().is_empty())
            .map(parse_stats_date)
            .transpose()?;
        Ok(self.assignments.completion_stats(worker_id, &Local, date))
    }

    /// Split images evenly across `workers` (remainder to the first ones).
    pub async fn distribute(&self, request: DistributeRequest) -> AppResult<DistributeOutcome> {
        let image_ids = match request.image_ids {
            Some(ids) => {
                self.ensure_known_images(&ids)?;
                ids
            }
            None => {
                let held: HashSet<DbId> = self
                    .assignments
                    .workers()
                    .iter()
                    .flat_map(|w| self.assignments.image_ids(w))
                    .collect();
                self.catalog
                    .ids()
                    .into_iter()
                    .filter(|id| !held.contains(id))
                    .collect()
            }
        };

        let plan = assignment::distribute_evenly(&image_ids, &request.workers)?;
        let assigned = self
            .with_book(move |book| {
                plan.into_iter()
                    .map(|(worker, ids)| {
                        let added = book.assign(&worker, &ids)?;
                        Ok((worker, added))
                    })
                    .collect::<Result<BTreeMap<_, _>, StoreError>>()
            })
            .await?;

        tracing::info!(
            total = image_ids.len(),
            workers = request.workers.len(),
            "Images distributed"
        );
        Ok(DistributeOutcome {
            total: image_ids.len(),
            assigned,
        })
    }

    /* ---- worker registry ---- */

    pub fn workers(&self) -> Vec<Worker> {
        self.registry.list()
    }

    /// Register a worker, or rename one that already exists.
    pub async fn register_worker(&self, input: WorkerRegistration) -> AppResult<RegisterOutcome> {
        input.validate()?;
        let worker_id = input.worker_id.trim().to_string();
        let worker_name = input.worker_name.trim().to_string();
        let (worker, is_new) = self
            .with_registry(move |registry| registry.register(&worker_id, &worker_name))
            .await?;
        Ok(RegisterOutcome { worker, is_new })
    }

    /* ---- maintenance ---- */

    /// Run the dedup sweep over both partitions.
    pub async fn sweep(&self) -> AppResult<SweepReport> {
        let started = Utc::now();
        let report = self.with_store(|store| store.sweep()).await?;
        tracing::debug!(
            changed = report.changed(),
            elapsed_ms = (Utc::now() - started).num_milliseconds(),
            "Dedup sweep finished"
        );
        Ok(report)
    }
}
