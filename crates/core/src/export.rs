//! Convert reviewer-passed sheet rows back into annotation records.

use serde::Serialize;

use crate::record::{AnnotationRecord, Partition, Region};
use crate::sheet::{RemoteRow, ReviewVerdict};
use crate::types::DbId;

/// A row that could not be exported, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRow {
    pub item_id: DbId,
    pub row_number: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportOutcome {
    pub records: Vec<AnnotationRecord>,
    pub skipped: Vec<SkippedRow>,
}

/// Parse a `Bbox` cell. Empty and `null` cells have no region.
pub fn parse_bbox_cell(cell: &str) -> Result<Option<Region>, String> {
    let cell = cell.trim();
    if cell.is_empty() || cell == "null" {
        return Ok(None);
    }
    let region: Region =
        serde_json::from_str(cell).map_err(|e| format!("invalid bbox '{cell}': {e}"))?;
    Ok(region.normalized())
}

/// Convert one sheet row into a record.
pub fn row_to_record(row: &RemoteRow) -> Result<AnnotationRecord, String> {
    let partition = Partition::from_str(&row.view).map_err(|e| e.to_string())?;
    let region = parse_bbox_cell(&row.bbox)?;

    Ok(AnnotationRecord {
        item_id: row.item_id,
        path: row.path.clone(),
        resolution: row.resolution.clone(),
        question: row.question.clone(),
        response: row.response.clone(),
        rationale: row.rationale.clone(),
        question_source: None,
        rationale_source: None,
        partition,
        region,
        saved_at: None,
        extra: serde_json::Map::new(),
    })
}

/// Collect the records of every passed, non-skipped row.
///
/// Rows that fail to convert are reported in [`ExportOutcome::skipped`]
/// instead of aborting the export.
pub fn passed_records(rows: &[RemoteRow]) -> ExportOutcome {
    let mut outcome = ExportOutcome::default();
    for row in rows {
        if row.skipped || row.review_verdict != Some(ReviewVerdict::Passed) {
            continue;
        }
        match row_to_record(row) {
            Ok(record) => outcome.records.push(record),
            Err(reason) => outcome.skipped.push(SkippedRow {
                item_id: row.item_id,
                row_number: row.row_number,
                reason,
            }),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passed_row(item_id: DbId, view: &str, bbox: &str) -> RemoteRow {
        RemoteRow {
            row_number: item_id as usize + 1,
            item_id,
            path: format!("/{item_id}.jpg"),
            resolution: "10x10".to_string(),
            question: "q".to_string(),
            response: "r".to_string(),
            rationale: "why".to_string(),
            view: view.to_string(),
            bbox: bbox.to_string(),
            review_verdict: Some(ReviewVerdict::Passed),
            note: String::new(),
            revised: false,
            skipped: false,
            saved_at: Some("2024-01-01 00:00:00".to_string()),
            assigned_at: None,
        }
    }

    #[test]
    fn bbox_cells() {
        assert_eq!(parse_bbox_cell("").unwrap(), None);
        assert_eq!(parse_bbox_cell("null").unwrap(), None);
        assert_eq!(
            parse_bbox_cell("[[1,2,3,4]]").unwrap(),
            Some(Region::Single([1.0, 2.0, 3.0, 4.0]))
        );
        assert!(parse_bbox_cell("[1,2").is_err());
    }

    #[test]
    fn only_passed_rows_are_exported() {
        let mut failed = passed_row(2, "exo", "");
        failed.review_verdict = Some(ReviewVerdict::Failed);
        let mut skipped = passed_row(3, "exo", "");
        skipped.skipped = true;

        let outcome = passed_records(&[passed_row(1, "ego", "[1,2,3,4]"), failed, skipped]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].item_id, 1);
        assert_eq!(outcome.records[0].partition, Partition::Ego);
        assert!(outcome.skipped.is_empty());
    }

    #[test]
    fn unconvertible_rows_are_reported() {
        let outcome = passed_records(&[passed_row(1, "side", ""), passed_row(2, "exo", "{bad")]);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.skipped.len(), 2);
        assert_eq!(outcome.skipped[1].item_id, 2);
    }
}
