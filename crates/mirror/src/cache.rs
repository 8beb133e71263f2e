//! TTL cache over the per-worker remote sheets.
//!
//! Reads inside the TTL never touch the remote. When the remote is throttled
//! or slow, readers get the last known rows instead of an error, however old
//! those rows are. Writes always go to the remote and then invalidate the
//! worker's entry so the next read sees them.
//!
//! Each worker has its own async mutex, so a slow sheet for one worker never
//! blocks reads for another, and concurrent reads of the same worker share a
//! single remote fetch. Writes to one sheet are serialized by a second mutex
//! and take the entry lock only briefly, so a throttled write never holds up
//! readers of the cached rows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use vqa_core::sheet::{parse_sheet, RemoteRow, RowPatch};

use crate::backend::{SheetBackend, SheetHandle};
use crate::error::MirrorError;

/// Default time a fetched sheet is trusted.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Default deadline for a single remote call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Tuning knobs for [`MirrorCache`].
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub ttl: Duration,
    pub request_timeout: Duration,
    /// Sleep before each retry of a rate-limited write; its length is the retry count.
    pub write_retry_delays: Vec<Duration>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            write_retry_delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
        }
    }
}

impl MirrorConfig {
    /// Longest a single [`MirrorCache::write`] can take: one sheet lookup,
    /// then a fetch and an upsert per attempt, plus every retry sleep.
    pub fn write_budget(&self) -> Duration {
        let attempts = self.write_retry_delays.len() as u32 + 1;
        let calls = 1 + 2 * attempts;
        self.request_timeout * calls + self.write_retry_delays.iter().sum::<Duration>()
    }
}

/// Where a written row landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct WriteOutcome {
    pub row_number: usize,
    pub appended: bool,
}

/// Cached state of one worker.
#[derive(Debug, Default)]
struct WorkerEntry {
    handle: Option<SheetHandle>,
    /// `None` until the first successful fetch.
    rows: Option<Vec<RemoteRow>>,
    /// `None` when never fetched or invalidated.
    fetched_at: Option<Instant>,
}

impl WorkerEntry {
    fn is_live(&self, ttl: Duration) -> bool {
        self.rows.is_some() && self.fetched_at.is_some_and(|t| t.elapsed() < ttl)
    }

    fn invalidate(&mut self) {
        self.fetched_at = None;
    }
}

/// Locks of one worker.
#[derive(Debug, Default)]
struct WorkerSlot {
    entry: Mutex<WorkerEntry>,
    /// Held for a whole upsert, retries included.
    writer: Mutex<()>,
}

pub struct MirrorCache {
    backend: Arc<dyn SheetBackend>,
    config: MirrorConfig,
    workers: RwLock<HashMap<String, Arc<WorkerSlot>>>,
}

impl MirrorCache {
    pub fn new(backend: Arc<dyn SheetBackend>, config: MirrorConfig) -> Self {
        Self {
            backend,
            config,
            workers: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    async fn slot(&self, worker_id: &str) -> Arc<WorkerSlot> {
        if let Some(slot) = self.workers.read().await.get(worker_id) {
            return Arc::clone(slot);
        }
        let mut workers = self.workers.write().await;
        Arc::clone(workers.entry(worker_id.to_string()).or_default())
    }

    /// Run one remote call under the request timeout.
    async fn call<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, MirrorError>>,
    ) -> Result<T, MirrorError> {
        tokio::time::timeout(self.config.request_timeout, fut)
            .await
            .map_err(|_| MirrorError::Timeout(self.config.request_timeout))?
    }

    /// The cached sheet handle, resolving it on first use.
    async fn handle(
        &self,
        entry: &mut WorkerEntry,
        worker_id: &str,
    ) -> Result<SheetHandle, MirrorError> {
        if let Some(handle) = &entry.handle {
            return Ok(handle.clone());
        }
        let handle = self.call(self.backend.open(worker_id)).await?;
        entry.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Fetch every value of the worker's sheet, refreshing the cached header.
    async fn fetch_values(
        &self,
        entry: &mut WorkerEntry,
        worker_id: &str,
    ) -> Result<Vec<Vec<String>>, MirrorError> {
        let handle = self.handle(entry, worker_id).await?;
        match self.call(self.backend.fetch_values(&handle)).await {
            Ok(values) => Ok(values),
            Err(e @ MirrorError::SheetNotFound(_)) => {
                tracing::warn!(worker_id, "Worker sheet disappeared, dropping cached handle");
                entry.handle = None;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Rows of the worker's sheet.
    ///
    /// A live entry is returned without a remote call unless `force_refresh`.
    /// On rate limiting or timeout the last known rows are returned (empty if
    /// there are none) and the entry's age is left alone, so the next read
    /// tries again. Other remote errors fall back to stale rows when there
    /// are any, and are returned otherwise.
    pub async fn read(
        &self,
        worker_id: &str,
        force_refresh: bool,
    ) -> Result<Vec<RemoteRow>, MirrorError> {
        let slot = self.slot(worker_id).await;
        let mut entry = slot.entry.lock().await;

        if !force_refresh && entry.is_live(self.config.ttl) {
            tracing::debug!(worker_id, "Mirror cache hit");
            return Ok(entry.rows.clone().unwrap_or_default());
        }

        match self.fetch_values(&mut entry, worker_id).await {
            Ok(values) => {
                let (header, rows) = parse_sheet(&values);
                if let Some(handle) = entry.handle.as_mut() {
                    if !header.is_empty() {
                        handle.header = header;
                    }
                }
                tracing::debug!(worker_id, rows = rows.len(), "Mirror cache refreshed");
                entry.rows = Some(rows.clone());
                entry.fetched_at = Some(Instant::now());
                Ok(rows)
            }
            Err(e) if e.is_throttle() => {
                tracing::warn!(worker_id, error = %e, "Remote sheet throttled, serving cached rows");
                Ok(entry.rows.clone().unwrap_or_default())
            }
            Err(e) => match &entry.rows {
                Some(rows) => {
                    tracing::warn!(worker_id, error = %e, "Remote sheet read failed, serving stale rows");
                    Ok(rows.clone())
                }
                None => Err(e),
            },
        }
    }

    /// Force the next [`MirrorCache::read`] of `worker_id` to refetch.
    pub async fn invalidate(&self, worker_id: &str) {
        let slot = self.workers.read().await.get(worker_id).cloned();
        if let Some(slot) = slot {
            slot.entry.lock().await.invalidate();
            tracing::debug!(worker_id, "Mirror cache invalidated");
        }
    }

    /// Upsert `patch` into the worker's sheet, then invalidate the entry.
    ///
    /// The row is located by a fresh full scan (never from the cache), so a
    /// row a reviewer inserted or moved since the last read is still found.
    /// Rate-limited attempts are retried after each configured delay.
    pub async fn write(&self, worker_id: &str, patch: &RowPatch) -> Result<WriteOutcome, MirrorError> {
        let slot = self.slot(worker_id).await;
        let _writer = slot.writer.lock().await;

        let mut delays = self.config.write_retry_delays.iter();
        let result = loop {
            match self.try_write(&slot, worker_id, patch).await {
                Err(MirrorError::RateLimited) => match delays.next() {
                    Some(delay) => {
                        tracing::warn!(
                            worker_id,
                            item_id = patch.item_id,
                            delay_ms = delay.as_millis() as u64,
                            "Remote sheet write rate limited, retrying"
                        );
                        tokio::time::sleep(*delay).await;
                    }
                    None => break Err(MirrorError::RateLimited),
                },
                other => break other,
            }
        };

        slot.entry.lock().await.invalidate();
        match &result {
            Ok(outcome) => tracing::info!(
                worker_id,
                item_id = patch.item_id,
                row_number = outcome.row_number,
                appended = outcome.appended,
                "Row mirrored to worker sheet"
            ),
            Err(e) => tracing::warn!(worker_id, item_id = patch.item_id, error = %e, "Row mirror failed"),
        }
        result
    }

    /// The sheet handle for a write, resolved without holding the entry lock
    /// across the remote call.
    async fn write_handle(
        &self,
        slot: &WorkerSlot,
        worker_id: &str,
    ) -> Result<SheetHandle, MirrorError> {
        let cached = slot.entry.lock().await.handle.clone();
        if let Some(handle) = cached {
            return Ok(handle);
        }
        let handle = self.call(self.backend.open(worker_id)).await?;
        let mut entry = slot.entry.lock().await;
        Ok(entry.handle.get_or_insert(handle).clone())
    }

    async fn try_write(
        &self,
        slot: &WorkerSlot,
        worker_id: &str,
        patch: &RowPatch,
    ) -> Result<WriteOutcome, MirrorError> {
        let handle = self.write_handle(slot, worker_id).await?;
        let values = match self.call(self.backend.fetch_values(&handle)).await {
            Ok(values) => values,
            Err(e @ MirrorError::SheetNotFound(_)) => {
                tracing::warn!(worker_id, "Worker sheet disappeared, dropping cached handle");
                slot.entry.lock().await.handle = None;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let (header, rows) = parse_sheet(&values);
        if header.is_empty() {
            return Err(MirrorError::MalformedResponse(format!(
                "sheet '{worker_id}' has no header row"
            )));
        }

        match rows.iter().find(|r| r.item_id == patch.item_id) {
            Some(row) => {
                let existing = values.get(row.row_number - 1).map(Vec::as_slice).unwrap_or(&[]);
                let cells = patch.apply(&header, Some((row, existing)));
                self.call(self.backend.update_row(&handle, row.row_number, cells))
                    .await?;
                Ok(WriteOutcome {
                    row_number: row.row_number,
                    appended: false,
                })
            }
            None => {
                let cells = patch.apply(&header, None);
                self.call(self.backend.append_row(&handle, cells)).await?;
                Ok(WriteOutcome {
                    row_number: values.len() + 1,
                    appended: true,
                })
            }
        }
    }
}
