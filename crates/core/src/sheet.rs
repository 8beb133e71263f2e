//! Remote review sheet model: column names, row parsing and row patches.
//!
//! Each worker has one sheet. The header row declares the columns; reviewers
//! fill in the verdict, note and revision columns by hand. This module never
//! invents columns: values for columns missing from the header are dropped on
//! write and read back as empty.

use serde::Serialize;

use crate::record::AnnotationRecord;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Column names
// ---------------------------------------------------------------------------

pub const COL_SAVED_AT: &str = "저장시간";
pub const COL_ASSIGNED_AT: &str = "할당시간";
pub const COL_IMAGE_ID: &str = "Image ID";
pub const COL_IMAGE_PATH: &str = "Image Path";
pub const COL_IMAGE_RESOLUTION: &str = "Image Resolution";
pub const COL_QUESTION: &str = "Question";
pub const COL_RESPONSE: &str = "Response";
pub const COL_RATIONALE: &str = "Rationale";
pub const COL_VIEW: &str = "View";
pub const COL_BBOX: &str = "Bbox";
pub const COL_SKIP: &str = "SKIP";
pub const COL_VERDICT: &str = "검수";
pub const COL_NOTE: &str = "비고";
pub const COL_REVISION: &str = "수정여부";

/// Canonical header for a freshly created worker sheet.
pub const CANONICAL_HEADER: &[&str] = &[
    COL_SAVED_AT,
    COL_IMAGE_ID,
    COL_IMAGE_PATH,
    COL_IMAGE_RESOLUTION,
    COL_QUESTION,
    COL_RESPONSE,
    COL_RATIONALE,
    COL_VIEW,
    COL_BBOX,
    COL_SKIP,
    COL_VERDICT,
    COL_NOTE,
    COL_REVISION,
];

/// Older sheets use these spellings.
fn aliases(column: &str) -> &'static [&'static str] {
    match column {
        COL_IMAGE_ID => &["image_id"],
        COL_IMAGE_PATH => &["image_path"],
        COL_IMAGE_RESOLUTION => &["image_resolution"],
        COL_QUESTION => &["question"],
        COL_RESPONSE => &["response"],
        COL_RATIONALE => &["rationale"],
        COL_VIEW => &["view"],
        COL_BBOX => &["bbox"],
        COL_VERDICT => &["검수 상태"],
        COL_NOTE => &["검수 의견"],
        COL_REVISION => &["수정 여부"],
        _ => &[],
    }
}

/// Value written to the revision column when a failed item is re-saved.
pub const REVISION_MARK: &str = "revised";

/// Value written to the skip column.
pub const SKIP_MARK: &str = "skip";

/// Timestamp layout of the saved-at column.
pub const SAVED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Column layout of one worker sheet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SheetHeader {
    columns: Vec<String>,
}

impl SheetHeader {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns: columns.into_iter().map(|c| c.trim().to_string()).collect(),
        }
    }

    pub fn canonical() -> Self {
        Self::new(CANONICAL_HEADER.iter().map(|c| c.to_string()).collect())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Index of `column`, falling back to its known aliases.
    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .or_else(|| {
                aliases(column)
                    .iter()
                    .find_map(|alias| self.columns.iter().position(|c| c == alias))
            })
    }

    fn cell<'a>(&self, cells: &'a [String], column: &str) -> &'a str {
        self.position(column)
            .and_then(|i| cells.get(i))
            .map(|s| s.trim())
            .unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Workflow fields
// ---------------------------------------------------------------------------

/// Reviewer verdict written into the verdict column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Passed,
    Failed,
    Delivered,
    /// Non-empty text that is none of the known verdicts.
    Unrecognized(String),
}

impl ReviewVerdict {
    /// Parse a verdict cell. Empty cells have no verdict.
    pub fn parse(cell: &str) -> Option<ReviewVerdict> {
        let value = cell.trim();
        if value.is_empty() {
            return None;
        }
        let verdict = match value.to_ascii_lowercase().as_str() {
            "passed" | "pass" | "통과" => Self::Passed,
            "failed" | "fail" | "불통" | "불통과" => Self::Failed,
            "delivered" | "납품 완료" | "납품완료" => Self::Delivered,
            _ => Self::Unrecognized(value.to_string()),
        };
        Some(verdict)
    }
}

/// Whether a revision-column cell marks the item as revised.
pub fn parse_revised(cell: &str) -> bool {
    matches!(
        cell.trim().to_ascii_lowercase().as_str(),
        "revised" | "수정" | "수정완료" | "수정 완료"
    )
}

/// Whether a skip-column cell marks the item as skipped.
pub fn parse_skipped(cell: &str) -> bool {
    cell.trim().eq_ignore_ascii_case(SKIP_MARK)
}

// ---------------------------------------------------------------------------
// RemoteRow
// ---------------------------------------------------------------------------

/// One data row of a worker sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteRow {
    /// 1-based sheet row number (the header is row 1).
    pub row_number: usize,
    pub item_id: DbId,
    pub path: String,
    pub resolution: String,
    pub question: String,
    pub response: String,
    pub rationale: String,
    pub view: String,
    /// Raw bbox cell, JSON text or empty.
    pub bbox: String,
    pub review_verdict: Option<ReviewVerdict>,
    pub note: String,
    pub revised: bool,
    pub skipped: bool,
    pub saved_at: Option<String>,
    pub assigned_at: Option<String>,
}

impl RemoteRow {
    /// Parse a data row. Rows without a numeric item id are ignored.
    pub fn from_cells(header: &SheetHeader, row_number: usize, cells: &[String]) -> Option<Self> {
        let item_id = header.cell(cells, COL_IMAGE_ID).parse::<DbId>().ok()?;
        let text = |column: &str| header.cell(cells, column).to_string();
        let optional = |column: &str| Some(text(column)).filter(|s| !s.is_empty());

        Some(Self {
            row_number,
            item_id,
            path: text(COL_IMAGE_PATH),
            resolution: text(COL_IMAGE_RESOLUTION),
            question: text(COL_QUESTION),
            response: text(COL_RESPONSE),
            rationale: text(COL_RATIONALE),
            view: text(COL_VIEW),
            bbox: text(COL_BBOX),
            review_verdict: ReviewVerdict::parse(header.cell(cells, COL_VERDICT)),
            note: text(COL_NOTE),
            revised: parse_revised(header.cell(cells, COL_REVISION)),
            skipped: parse_skipped(header.cell(cells, COL_SKIP)),
            saved_at: optional(COL_SAVED_AT),
            assigned_at: optional(COL_ASSIGNED_AT),
        })
    }
}

/// Parse every data row of a sheet. `values[0]` is the header row.
///
/// Returns the parsed header alongside the rows.
pub fn parse_sheet(values: &[Vec<String>]) -> (SheetHeader, Vec<RemoteRow>) {
    let Some((head, body)) = values.split_first() else {
        return (SheetHeader::default(), Vec::new());
    };
    let header = SheetHeader::new(head.clone());
    let rows = body
        .iter()
        .enumerate()
        .filter_map(|(i, cells)| RemoteRow::from_cells(&header, i + 2, cells))
        .collect();
    (header, rows)
}

// ---------------------------------------------------------------------------
// RowPatch
// ---------------------------------------------------------------------------

/// A set of cell values to upsert into the row of one item.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPatch {
    pub item_id: DbId,
    cells: Vec<(&'static str, String)>,
    mark_revision_if_failed: bool,
}

impl RowPatch {
    pub fn new(item_id: DbId) -> Self {
        Self {
            item_id,
            cells: Vec::new(),
            mark_revision_if_failed: false,
        }
    }

    pub fn set(mut self, column: &'static str, value: impl Into<String>) -> Self {
        self.cells.retain(|(c, _)| *c != column);
        self.cells.push((column, value.into()));
        self
    }

    /// Patch mirroring a saved record.
    ///
    /// Re-saving clears a previous skip, and re-saving an item the reviewer
    /// failed marks it revised so it lands in the pending-review queue.
    pub fn for_record(record: &AnnotationRecord, saved_at: &str) -> Self {
        let bbox = record
            .region
            .as_ref()
            .and_then(|r| serde_json::to_string(r).ok())
            .unwrap_or_default();

        let mut patch = Self::new(record.item_id)
            .set(COL_SAVED_AT, saved_at)
            .set(COL_IMAGE_PATH, record.path.clone())
            .set(COL_IMAGE_RESOLUTION, record.resolution.clone())
            .set(COL_QUESTION, record.question.clone())
            .set(COL_RESPONSE, record.response.clone())
            .set(COL_RATIONALE, record.rationale.clone())
            .set(COL_VIEW, record.partition.as_str())
            .set(COL_BBOX, bbox)
            .set(COL_SKIP, "");
        patch.mark_revision_if_failed = true;
        patch
    }

    /// Patch marking an item as skipped.
    pub fn skip(item_id: DbId) -> Self {
        Self::new(item_id).set(COL_SKIP, SKIP_MARK)
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v.as_str())
    }

    /// Produce the full cell vector for the item's row.
    ///
    /// `existing` is the current row (cells and parsed form) when the item is
    /// already on the sheet. Columns not named by the patch keep their value;
    /// columns absent from the header are ignored.
    pub fn apply(&self, header: &SheetHeader, existing: Option<(&RemoteRow, &[String])>) -> Vec<String> {
        let mut cells: Vec<String> = existing
            .map(|(_, cells)| cells.to_vec())
            .unwrap_or_default();
        cells.resize(header.len().max(cells.len()), String::new());

        let mut put = |column: &str, value: &str| {
            if let Some(i) = header.position(column) {
                cells[i] = value.to_string();
            }
        };

        put(COL_IMAGE_ID, &self.item_id.to_string());
        for (column, value) in &self.cells {
            put(*column, value.as_str());
        }

        if self.mark_revision_if_failed {
            if let Some((row, _)) = existing {
                if row.review_verdict == Some(ReviewVerdict::Failed) {
                    put(COL_REVISION, REVISION_MARK);
                }
            }
        }

        cells
    }
}
