//! Integration tests for the partitioned record store.

use std::sync::Arc;
use std::thread;

use chrono::{Duration, Utc};
use serde_json::json;
use vqa_core::record::{AnnotationRecord, Partition};
use vqa_core::types::DbId;
use vqa_store::atomic::{stage, to_pretty_json, write_json_atomically};
use vqa_store::PartitionStore;

fn record(item_id: DbId, partition: Partition, question: &str) -> AnnotationRecord {
    let mut record: AnnotationRecord = serde_json::from_value(json!({
        "image_id": item_id,
        "image_path": format!("/{item_id:012}.jpg"),
        "image_resolution": "640x480",
        "question": question,
        "response": "(A)",
        "rationale": "because",
        "view": "exo",
        "bbox": [10, 20, 30, 40]
    }))
    .unwrap();
    record.partition = partition;
    record
}

fn ids(store: &PartitionStore, partition: Partition) -> Vec<DbId> {
    store
        .load(partition)
        .unwrap()
        .iter()
        .map(|r| r.item_id)
        .collect()
}

fn occurrences(store: &PartitionStore, item_id: DbId) -> usize {
    Partition::ALL
        .iter()
        .map(|&p| ids(store, p).iter().filter(|&&id| id == item_id).count())
        .sum()
}

// ---------------------------------------------------------------------------
// Test: changing view moves the record between partitions
// ---------------------------------------------------------------------------

#[test]
fn changing_view_moves_the_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = PartitionStore::open(&dir.path().join("annotations.json"));

    store.put(record(42, Partition::Exo, "Q1")).unwrap();
    let outcome = store.put(record(42, Partition::Ego, "Q2")).unwrap();

    assert!(!outcome.updated);
    assert!(outcome.migrated);
    assert!(ids(&store, Partition::Exo).is_empty());

    let ego = store.load(Partition::Ego).unwrap();
    assert_eq!(ego.len(), 1);
    assert_eq!(ego[0].question, "Q2");
}

// ---------------------------------------------------------------------------
// Test: after every put, the id lives in exactly one partition
// ---------------------------------------------------------------------------

#[test]
fn no_cross_partition_duplication_over_a_sequence_of_puts() {
    let dir = tempfile::tempdir().unwrap();
    let store = PartitionStore::open(&dir.path().join("annotations.json"));

    let views = [
        Partition::Exo,
        Partition::Exo,
        Partition::Ego,
        Partition::Exo,
        Partition::Ego,
        Partition::Ego,
    ];
    for (step, view) in views.into_iter().enumerate() {
        for id in 1..=3 {
            store.put(record(id, view, &format!("step {step}"))).unwrap();
            assert_eq!(occurrences(&store, id), 1, "id {id} after step {step}");
        }
    }
    assert_eq!(ids(&store, Partition::Ego), vec![1, 2, 3]);
}

// ---------------------------------------------------------------------------
// Test: concurrent puts of distinct ids lose nothing
// ---------------------------------------------------------------------------

#[test]
fn concurrent_distinct_puts_lose_no_update() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(PartitionStore::open(&dir.path().join("annotations.json")));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..10 {
                    let id = t * 100 + i;
                    let view = if id % 2 == 0 { Partition::Exo } else { Partition::Ego };
                    store.put(record(id, view, "q")).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let all = store.reload().unwrap();
    assert_eq!(all.len(), 80);
    for t in 0..8 {
        for i in 0..10 {
            assert_eq!(occurrences(&store, t * 100 + i), 1);
        }
    }
}

// ---------------------------------------------------------------------------
// Test: racing puts of the same id in different views leave one copy
// ---------------------------------------------------------------------------

#[test]
fn concurrent_same_id_puts_leave_a_single_copy() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(PartitionStore::open(&dir.path().join("annotations.json")));

    let handles: Vec<_> = Partition::ALL
        .into_iter()
        .map(|view| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for n in 0..20 {
                    store.put(record(7, view, &format!("{view} {n}"))).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Interleaved migrations may leave a duplicate but never lose the item.
    assert!(occurrences(&store, 7) >= 1);
    let last = store.find(7).unwrap().unwrap();
    store.put(last).unwrap();
    assert_eq!(occurrences(&store, 7), 1);
}

// ---------------------------------------------------------------------------
// Test: a crash before the rename leaves the file byte-identical
// ---------------------------------------------------------------------------

#[test]
fn crash_before_rename_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = PartitionStore::open(&dir.path().join("annotations.json"));
    store.put(record(1, Partition::Exo, "original")).unwrap();

    let path = store.path(Partition::Exo).to_path_buf();
    let before = std::fs::read(&path).unwrap();

    let replacement = to_pretty_json(&vec![record(1, Partition::Exo, "never committed")]).unwrap();
    let staged = stage(&path, &replacement).unwrap();
    drop(staged);

    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert_eq!(store.find(1).unwrap().unwrap().question, "original");
}

// ---------------------------------------------------------------------------
// Test: sweep repairs a crash between the two put phases
// ---------------------------------------------------------------------------

#[test]
fn sweep_keeps_the_newer_cross_partition_copy() {
    let dir = tempfile::tempdir().unwrap();
    let store = PartitionStore::open(&dir.path().join("annotations.json"));

    let mut older = record(42, Partition::Exo, "Q1");
    older.saved_at = Some(Utc::now() - Duration::minutes(5));
    let mut newer = record(42, Partition::Ego, "Q2");
    newer.saved_at = Some(Utc::now());

    write_json_atomically(store.path(Partition::Exo), &vec![older, record(1, Partition::Exo, "a")])
        .unwrap();
    write_json_atomically(store.path(Partition::Ego), &vec![newer]).unwrap();

    let report = store.sweep().unwrap();
    assert_eq!(report.cross_partition_removed, 1);
    assert_eq!(ids(&store, Partition::Exo), vec![1]);
    assert_eq!(store.find(42).unwrap().unwrap().question, "Q2");

    let again = store.sweep().unwrap();
    assert!(!again.changed());
    assert_eq!(again.duplicates_removed(), 0);
}

// ---------------------------------------------------------------------------
// Test: sweep collapses in-file duplicates, last occurrence wins
// ---------------------------------------------------------------------------

#[test]
fn sweep_collapses_in_file_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let store = PartitionStore::open(&dir.path().join("annotations.json"));
    write_json_atomically(
        store.path(Partition::Ego),
        &vec![
            record(5, Partition::Ego, "first"),
            record(6, Partition::Ego, "other"),
            record(5, Partition::Ego, "last"),
        ],
    )
    .unwrap();

    let report = store.sweep().unwrap();
    assert_eq!(report.ego.duplicates_removed, 1);
    assert_eq!(ids(&store, Partition::Ego), vec![6, 5]);
    assert_eq!(store.find(5).unwrap().unwrap().question, "last");
    assert_eq!(store.sweep().unwrap().duplicates_removed(), 0);
}

// ---------------------------------------------------------------------------
// Test: fields written by other tools survive a rewrite
// ---------------------------------------------------------------------------

#[test]
fn unknown_fields_survive_rewrites() {
    let dir = tempfile::tempdir().unwrap();
    let store = PartitionStore::open(&dir.path().join("annotations.json"));

    let mut tagged = record(3, Partition::Exo, "q");
    tagged.extra.insert("reviewer".to_string(), json!("kim"));
    write_json_atomically(store.path(Partition::Exo), &vec![tagged]).unwrap();

    store.put(record(4, Partition::Exo, "q")).unwrap();

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(store.path(Partition::Exo)).unwrap()).unwrap();
    assert_eq!(raw[0]["reviewer"], "kim");
    assert_eq!(raw[1]["image_id"], 4);
}
