//! Durable partitioned record store.
//!
//! Records live in two JSON array files, one per [`Partition`]. Each file has
//! an in-process mutex and an advisory OS lock on a sibling `.lock` file, so
//! writers in this process and in other processes sharing the directory are
//! serialized. Files are only ever replaced by atomic rename.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use chrono::Utc;
use fs2::FileExt;
use serde::Serialize;
use vqa_core::record::{AnnotationRecord, Partition, Region};
use vqa_core::types::{DbId, Timestamp};

use crate::atomic::write_json_atomically;
use crate::error::StoreError;
use crate::sweep::{sweep_records, FileSweep};

/// Poll interval while waiting for a lock under a deadline.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// File reading
// ---------------------------------------------------------------------------

pub(crate) enum Loaded {
    Records(Vec<AnnotationRecord>),
    Malformed(serde_json::Error),
}

/// Read a partition file. Missing and blank files are empty partitions.
pub(crate) fn read_records(path: &Path) -> Result<Loaded, StoreError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Loaded::Records(Vec::new()))
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Loaded::Records(Vec::new()));
    }
    Ok(match serde_json::from_slice(&bytes) {
        Ok(records) => Loaded::Records(records),
        Err(e) => Loaded::Malformed(e),
    })
}

/// Copy a file that failed to parse to `<file>.corrupt-<timestamp>`.
pub(crate) fn back_up_corrupt(path: &Path) -> Result<PathBuf, StoreError> {
    let backup = with_suffix(
        path,
        &format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.3f")),
    );
    std::fs::copy(path, &backup).map_err(|e| StoreError::io(&backup, e))?;
    Ok(backup)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

// ---------------------------------------------------------------------------
// Partition files and locks
// ---------------------------------------------------------------------------

/// Output file paths for both partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPaths {
    pub exo: PathBuf,
    pub ego: PathBuf,
}

impl PartitionPaths {
    /// Derive both paths from one output path: `dir/name.json` becomes
    /// `dir/name_exo.json` and `dir/name_ego.json`.
    pub fn from_output_path(output: &Path) -> Self {
        let dir = output.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "annotations".to_string());
        Self {
            exo: dir.join(format!("{stem}_exo.json")),
            ego: dir.join(format!("{stem}_ego.json")),
        }
    }

    pub fn get(&self, partition: Partition) -> &Path {
        match partition {
            Partition::Exo => &self.exo,
            Partition::Ego => &self.ego,
        }
    }
}

#[derive(Debug)]
struct PartitionFile {
    path: PathBuf,
    lock_path: PathBuf,
    guard: Mutex<()>,
}

impl PartitionFile {
    fn new(path: PathBuf) -> Self {
        Self {
            lock_path: with_suffix(&path, ".lock"),
            path,
            guard: Mutex::new(()),
        }
    }

    fn open_lock_file(&self) -> Result<File, StoreError> {
        if let Some(dir) = self.lock_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        }
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| StoreError::io(&self.lock_path, e))
    }

    /// Block until both the in-process and the OS lock are held.
    fn lock(&self) -> Result<PartitionLock<'_>, StoreError> {
        // The mutex guards no data, so a panic in another holder leaves nothing inconsistent.
        let guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let file = self.open_lock_file()?;
        FileExt::lock_exclusive(&file).map_err(|e| StoreError::io(&self.lock_path, e))?;
        Ok(PartitionLock {
            _guard: guard,
            file,
        })
    }

    /// Like [`PartitionFile::lock`], giving up after `timeout`.
    fn lock_within(&self, timeout: Duration) -> Result<PartitionLock<'_>, StoreError> {
        let deadline = Instant::now() + timeout;
        let guard = loop {
            match self.guard.try_lock() {
                Ok(guard) => break guard,
                Err(std::sync::TryLockError::Poisoned(p)) => break p.into_inner(),
                Err(std::sync::TryLockError::WouldBlock) => {}
            }
            if Instant::now() >= deadline {
                return Err(self.timed_out(timeout));
            }
            std::thread::sleep(LOCK_POLL_INTERVAL);
        };

        let file = self.open_lock_file()?;
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {}
                Err(e) => return Err(StoreError::io(&self.lock_path, e)),
            }
            if Instant::now() >= deadline {
                return Err(self.timed_out(timeout));
            }
            std::thread::sleep(LOCK_POLL_INTERVAL);
        }

        Ok(PartitionLock {
            _guard: guard,
            file,
        })
    }

    fn timed_out(&self, waited: Duration) -> StoreError {
        StoreError::LockTimeout {
            path: self.path.clone(),
            waited,
        }
    }

    /// Read the file for a rewrite. Must be called with the lock held.
    ///
    /// A malformed file is copied aside first so the rewrite cannot destroy
    /// its contents, then treated as empty.
    fn load_for_write(&self) -> Result<Vec<AnnotationRecord>, StoreError> {
        match read_records(&self.path)? {
            Loaded::Records(records) => Ok(records),
            Loaded::Malformed(e) => {
                let backup = back_up_corrupt(&self.path)?;
                tracing::error!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "Malformed partition file backed up and replaced with an empty list"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Read without locking. Safe because files are only replaced by rename.
    fn load_snapshot(&self) -> Result<Vec<AnnotationRecord>, StoreError> {
        match read_records(&self.path)? {
            Loaded::Records(records) => Ok(records),
            Loaded::Malformed(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Malformed partition file read as empty");
                Ok(Vec::new())
            }
        }
    }

    fn load_for_sweep(&self) -> Result<Option<Vec<AnnotationRecord>>, StoreError> {
        match read_records(&self.path)? {
            Loaded::Records(records) => Ok(Some(records)),
            Loaded::Malformed(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Skipping sweep of malformed partition file");
                Ok(None)
            }
        }
    }

    fn modified(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }
}

/// Both locks of one partition. Released on drop.
struct PartitionLock<'a> {
    _guard: MutexGuard<'a, ()>,
    file: File,
}

impl Drop for PartitionLock<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

// ---------------------------------------------------------------------------
// PartitionStore
// ---------------------------------------------------------------------------

/// Result of a successful [`PartitionStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PutOutcome {
    /// An existing record with the same id was replaced in the target partition.
    pub updated: bool,
    pub partition: Partition,
    /// The id was removed from the other partition (the item changed view).
    pub migrated: bool,
    /// Evicting the id from the other partition failed after the record was
    /// committed. The duplicate is left for [`PartitionStore::sweep`].
    pub eviction_pending: bool,
}

/// Result of [`PartitionStore::sweep`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub exo: FileSweep,
    pub ego: FileSweep,
    /// Items found in both partitions whose losing copy was removed.
    pub cross_partition_removed: usize,
}

impl SweepReport {
    pub fn duplicates_removed(&self) -> usize {
        self.exo.duplicates_removed + self.ego.duplicates_removed + self.cross_partition_removed
    }

    pub fn changed(&self) -> bool {
        self.exo.changed() || self.ego.changed() || self.cross_partition_removed > 0
    }
}

/// The two partition files and their locks.
#[derive(Debug)]
pub struct PartitionStore {
    exo: PartitionFile,
    ego: PartitionFile,
    lock_timeout: Option<Duration>,
}

impl PartitionStore {
    pub fn new(paths: PartitionPaths) -> Self {
        Self {
            exo: PartitionFile::new(paths.exo),
            ego: PartitionFile::new(paths.ego),
            lock_timeout: None,
        }
    }

    /// Store whose partition files are derived from `output` (see [`PartitionPaths`]).
    pub fn open(output: &Path) -> Self {
        Self::new(PartitionPaths::from_output_path(output))
    }

    /// Bound how long [`PartitionStore::put`] waits for the target partition lock.
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    fn file(&self, partition: Partition) -> &PartitionFile {
        match partition {
            Partition::Exo => &self.exo,
            Partition::Ego => &self.ego,
        }
    }

    pub fn path(&self, partition: Partition) -> &Path {
        &self.file(partition).path
    }

    /// Save `record` into its partition and evict its id from the other one.
    ///
    /// The target file is rewritten first, then the target lock is released
    /// and the other partition is locked and rewritten. A crash in between
    /// leaves the item in both files (repaired by [`PartitionStore::sweep`]),
    /// never in neither. For the same reason a failed eviction is logged and
    /// reported through [`PutOutcome::eviction_pending`] rather than as an
    /// error: the record is already durable.
    pub fn put(&self, mut record: AnnotationRecord) -> Result<PutOutcome, StoreError> {
        record.region = record.region.take().and_then(Region::normalized);

        let partition = record.partition;
        let item_id = record.item_id;
        let target = self.file(partition);

        let (updated, saved_at) = {
            let _lock = match self.lock_timeout {
                Some(timeout) => target.lock_within(timeout)?,
                None => target.lock()?,
            };
            // Stamped under the lock so stamps order the writes to this partition.
            let saved_at = Utc::now();
            record.saved_at = Some(saved_at);
            let mut records = target.load_for_write()?;
            let updated = match records.iter().position(|r| r.item_id == item_id) {
                Some(i) => {
                    records[i] = record;
                    true
                }
                None => {
                    records.push(record);
                    false
                }
            };
            write_json_atomically(&target.path, &records)?;
            (updated, saved_at)
        };

        let (migrated, eviction_pending) =
            match self.remove_from(partition.other(), item_id, saved_at) {
                Ok(migrated) => (migrated, false),
                Err(e) => {
                    tracing::error!(
                        item_id,
                        partition = %partition.other(),
                        error = %e,
                        "Eviction from other partition failed, leaving duplicate for the sweep"
                    );
                    (false, true)
                }
            };

        tracing::info!(item_id, partition = %partition, updated, migrated, "Annotation saved");
        Ok(PutOutcome {
            updated,
            partition,
            migrated,
            eviction_pending,
        })
    }

    /// Remove copies of `item_id` saved before `saved_at` from one partition.
    ///
    /// A copy stamped at or after `saved_at` belongs to a concurrent put into
    /// that partition and is kept; the duplicate is left for the sweep.
    /// Returns whether anything was removed. A malformed file is left alone:
    /// it is backed up and replaced by the next put into that partition.
    fn remove_from(
        &self,
        partition: Partition,
        item_id: DbId,
        saved_at: Timestamp,
    ) -> Result<bool, StoreError> {
        let file = self.file(partition);
        let _lock = file.lock()?;
        if !file.path.exists() {
            return Ok(false);
        }
        let mut records = match read_records(&file.path)? {
            Loaded::Records(records) => records,
            Loaded::Malformed(e) => {
                tracing::warn!(path = %file.path.display(), error = %e, "Malformed partition file, eviction skipped");
                return Ok(false);
            }
        };
        let before = records.len();
        records.retain(|r| r.item_id != item_id || r.saved_at.is_some_and(|t| t >= saved_at));
        if records.len() == before {
            return Ok(false);
        }
        write_json_atomically(&file.path, &records)?;
        Ok(true)
    }

    /// Records of one partition, in file order.
    pub fn load(&self, partition: Partition) -> Result<Vec<AnnotationRecord>, StoreError> {
        self.file(partition).load_snapshot()
    }

    /// All records of both partitions (exo first).
    pub fn reload(&self) -> Result<Vec<AnnotationRecord>, StoreError> {
        let mut records = self.exo.load_snapshot()?;
        records.extend(self.ego.load_snapshot()?);
        tracing::debug!(count = records.len(), "Partitions reloaded");
        Ok(records)
    }

    /// Latest stored copy of `item_id`, if any.
    ///
    /// While an item sits in both partitions the copy with the later
    /// `saved_at` wins; exo wins a tie.
    pub fn find(&self, item_id: DbId) -> Result<Option<AnnotationRecord>, StoreError> {
        let mut latest: Option<AnnotationRecord> = None;
        for partition in Partition::ALL {
            let found = self
                .load(partition)?
                .into_iter()
                .rev()
                .find(|r| r.item_id == item_id);
            if let Some(found) = found {
                if latest.as_ref().map_or(true, |l| found.saved_at > l.saved_at) {
                    latest = Some(found);
                }
            }
        }
        Ok(latest)
    }

    pub fn contains(&self, item_id: DbId) -> Result<bool, StoreError> {
        Ok(self.find(item_id)?.is_some())
    }

    /// Collapse duplicates inside each partition, then across partitions.
    ///
    /// Both partition locks are held for the whole pass, always taken in
    /// exo-then-ego order. Across partitions the copy with the later
    /// `saved_at` wins; without a difference there, the copy in the more
    /// recently modified file wins, and exo wins a full tie.
    pub fn sweep(&self) -> Result<SweepReport, StoreError> {
        let _exo_lock = self.exo.lock()?;
        let _ego_lock = self.ego.lock()?;

        // A malformed file is left for the next put to back up and replace.
        let (Some(exo), Some(ego)) = (self.exo.load_for_sweep()?, self.ego.load_for_sweep()?)
        else {
            return Ok(SweepReport::default());
        };
        let (mut exo, exo_report) = sweep_records(exo);
        let (mut ego, ego_report) = sweep_records(ego);

        let ego_file_newer = match (self.exo.modified(), self.ego.modified()) {
            (Some(a), Some(b)) => b > a,
            (None, Some(_)) => true,
            _ => false,
        };

        let mut drop_from_exo = Vec::new();
        let mut drop_from_ego = Vec::new();
        for e in &exo {
            let Some(g) = ego.iter().find(|g| g.item_id == e.item_id) else {
                continue;
            };
            let ego_wins = match (e.saved_at, g.saved_at) {
                (Some(a), Some(b)) if a != b => b > a,
                (None, Some(_)) => true,
                (Some(_), None) => false,
                _ => ego_file_newer,
            };
            if ego_wins {
                drop_from_exo.push(e.item_id);
            } else {
                drop_from_ego.push(e.item_id);
            }
        }
        exo.retain(|r| !drop_from_exo.contains(&r.item_id));
        ego.retain(|r| !drop_from_ego.contains(&r.item_id));

        let report = SweepReport {
            exo: exo_report,
            ego: ego_report,
            cross_partition_removed: drop_from_exo.len() + drop_from_ego.len(),
        };

        if exo_report.changed() || !drop_from_exo.is_empty() {
            write_json_atomically(&self.exo.path, &exo)?;
        }
        if ego_report.changed() || !drop_from_ego.is_empty() {
            write_json_atomically(&self.ego.path, &ego)?;
        }

        if report.changed() {
            tracing::info!(
                duplicates_removed = report.duplicates_removed(),
                cross_partition_removed = report.cross_partition_removed,
                "Deduplication sweep repaired partitions"
            );
        } else {
            tracing::debug!("Deduplication sweep found nothing to repair");
        }
        Ok(report)
    }
}
