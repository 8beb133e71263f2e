//! Duplicate-collapsing maintenance pass over partition files.
//!
//! `put` never scans for duplicates; a crash between its two phases can leave
//! the same item in both partitions, and hand-edited files can repeat an item
//! inside one partition. The sweep repairs both, off the save path.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use vqa_core::record::AnnotationRecord;
use vqa_core::types::DbId;

use crate::atomic::write_json_atomically;
use crate::error::StoreError;
use crate::partition::{read_records, Loaded};

/// Changes made to one partition file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileSweep {
    pub duplicates_removed: usize,
    /// Legacy one-element box lists collapsed to a single box.
    pub regions_normalized: usize,
}

impl FileSweep {
    pub fn changed(&self) -> bool {
        self.duplicates_removed > 0 || self.regions_normalized > 0
    }
}

/// Keep only the last occurrence of every `item_id`, at its position.
///
/// Returns the collapsed list and how many entries were dropped.
pub fn collapse_duplicates(records: Vec<AnnotationRecord>) -> (Vec<AnnotationRecord>, usize) {
    let mut last_index: HashMap<DbId, usize> = HashMap::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        last_index.insert(record.item_id, i);
    }

    let before = records.len();
    let kept: Vec<_> = records
        .into_iter()
        .enumerate()
        .filter(|(i, record)| last_index.get(&record.item_id) == Some(i))
        .map(|(_, record)| record)
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

/// Collapse legacy region shapes in place. Returns how many records changed.
pub fn normalize_regions(records: &mut [AnnotationRecord]) -> usize {
    let mut changed = 0;
    for record in records.iter_mut() {
        if record.region.as_ref().is_some_and(|r| r.needs_normalizing()) {
            record.region = record.region.take().and_then(|r| r.normalized());
            changed += 1;
        }
    }
    changed
}

/// Apply both repairs to an in-memory list.
pub(crate) fn sweep_records(records: Vec<AnnotationRecord>) -> (Vec<AnnotationRecord>, FileSweep) {
    let (mut records, duplicates_removed) = collapse_duplicates(records);
    let regions_normalized = normalize_regions(&mut records);
    (
        records,
        FileSweep {
            duplicates_removed,
            regions_normalized,
        },
    )
}

/// Sweep one partition file, rewriting it only when something changed.
///
/// The caller is responsible for holding the partition lock. A missing file
/// is a no-op; a malformed file is left untouched and reported as unchanged.
pub fn sweep_file(path: &Path) -> Result<FileSweep, StoreError> {
    let records = match read_records(path)? {
        Loaded::Records(records) => records,
        Loaded::Malformed(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Skipping sweep of malformed partition file");
            return Ok(FileSweep::default());
        }
    };

    let (records, report) = sweep_records(records);
    if report.changed() {
        write_json_atomically(path, &records)?;
        tracing::info!(
            path = %path.display(),
            duplicates_removed = report.duplicates_removed,
            regions_normalized = report.regions_normalized,
            "Partition file swept"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(item_id: DbId, question: &str) -> AnnotationRecord {
        serde_json::from_value(json!({
            "image_id": item_id,
            "image_path": format!("/{item_id}.jpg"),
            "image_resolution": "1x1",
            "question": question,
            "response": "r",
            "rationale": "",
            "view": "exo",
            "bbox": null
        }))
        .unwrap()
    }

    #[test]
    fn last_occurrence_wins_at_its_position() {
        let (kept, removed) = collapse_duplicates(vec![
            record(1, "old"),
            record(2, "two"),
            record(1, "new"),
            record(3, "three"),
        ]);
        assert_eq!(removed, 1);
        let order: Vec<_> = kept.iter().map(|r| (r.item_id, r.question.as_str())).collect();
        assert_eq!(order, vec![(2, "two"), (1, "new"), (3, "three")]);
    }

    #[test]
    fn sweep_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        let mut legacy = record(2, "boxed");
        legacy.region = serde_json::from_value(json!([[1, 2, 3, 4]])).unwrap();
        write_json_atomically(&path, &vec![record(1, "a"), legacy, record(1, "b")]).unwrap();

        let first = sweep_file(&path).unwrap();
        assert_eq!(first.duplicates_removed, 1);
        assert_eq!(first.regions_normalized, 1);

        let before = std::fs::read(&path).unwrap();
        let second = sweep_file(&path).unwrap();
        assert_eq!(second, FileSweep::default());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn sweep_of_missing_or_malformed_file_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(sweep_file(&dir.path().join("absent.json")).unwrap(), FileSweep::default());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, b"[{not json").unwrap();
        assert_eq!(sweep_file(&bad).unwrap(), FileSweep::default());
        assert_eq!(std::fs::read(&bad).unwrap(), b"[{not json");
    }
}
