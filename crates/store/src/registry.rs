//! Registered workers, persisted as a JSON array.

use std::path::Path;

use chrono::Utc;
use vqa_core::assignment::Worker;

use crate::document::JsonDocument;
use crate::error::StoreError;

#[derive(Debug)]
pub struct WorkerRegistry {
    doc: JsonDocument<Vec<Worker>>,
}

impl WorkerRegistry {
    /// Load the registry from `path`. A missing file has no workers.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let doc = JsonDocument::open(path)?;
        tracing::debug!(path = %doc.path().display(), workers = doc.read(Vec::len), "Worker registry loaded");
        Ok(Self { doc })
    }

    /// Every worker, in registration order.
    pub fn list(&self) -> Vec<Worker> {
        self.doc.read(Clone::clone)
    }

    pub fn get(&self, worker_id: &str) -> Option<Worker> {
        self.doc
            .read(|workers| workers.iter().find(|w| w.worker_id == worker_id).cloned())
    }

    /// Add `worker_id`, or rename it when it already exists under another
    /// name. Returns the stored worker and whether it was newly added.
    pub fn register(&self, worker_id: &str, worker_name: &str) -> Result<(Worker, bool), StoreError> {
        let now = Utc::now();
        let (worker, is_new) = self.doc.update(|workers| {
            match workers.iter_mut().find(|w| w.worker_id == worker_id) {
                Some(existing) => {
                    existing.worker_name = worker_name.to_string();
                    (existing.clone(), false)
                }
                None => {
                    let worker = Worker::new(worker_id, worker_name, now);
                    workers.push(worker.clone());
                    (worker, true)
                }
            }
        })?;
        tracing::info!(worker_id, is_new, "Worker registered");
        Ok((worker, is_new))
    }
}
