//! Workflow status derivation.
//!
//! A [`WorkItemStatus`] is never stored. It is recomputed on every read from
//! the item's sheet row, so there is no second source of truth that could
//! drift from the reviewer's columns.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::sheet::{RemoteRow, ReviewVerdict};
use crate::types::DbId;

/// Review lifecycle stage of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Unfinished,
    Working,
    Passed,
    Failed,
    PendingReview,
    Delivered,
    Skipped,
}

impl WorkItemStatus {
    pub const ALL: [WorkItemStatus; 7] = [
        Self::Unfinished,
        Self::Working,
        Self::Passed,
        Self::Failed,
        Self::PendingReview,
        Self::Delivered,
        Self::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unfinished => "unfinished",
            Self::Working => "working",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::PendingReview => "pending_review",
            Self::Delivered => "delivered",
            Self::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Invalid status '{s}'. Must be one of: {}",
                    Self::ALL.map(|st| st.as_str()).join(", ")
                ))
            })
    }

    /// Statuses that count toward a worker's completion rate.
    pub fn counts_as_done(&self) -> bool {
        !matches!(self, Self::Unfinished | Self::Skipped)
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the status of an item from its sheet row.
///
/// First match wins:
///
/// 1. skip flag → `skipped`
/// 2. verdict passed → `passed`
/// 3. verdict failed and revised → `pending_review`
/// 4. verdict failed → `failed`
/// 5. verdict delivered → `delivered`
/// 6. saved, no verdict → `working`
/// 7. anything else, including no row → `unfinished`
pub fn resolve(row: Option<&RemoteRow>) -> WorkItemStatus {
    let Some(row) = row else {
        return WorkItemStatus::Unfinished;
    };

    if row.skipped {
        return WorkItemStatus::Skipped;
    }

    match (&row.review_verdict, row.revised) {
        (Some(ReviewVerdict::Passed), _) => WorkItemStatus::Passed,
        (Some(ReviewVerdict::Failed), true) => WorkItemStatus::PendingReview,
        (Some(ReviewVerdict::Failed), false) => WorkItemStatus::Failed,
        (Some(ReviewVerdict::Delivered), _) => WorkItemStatus::Delivered,
        (None, _) if row.saved_at.as_deref().is_some_and(|s| !s.trim().is_empty()) => {
            WorkItemStatus::Working
        }
        _ => WorkItemStatus::Unfinished,
    }
}

/// Like [`resolve`], but an item with no sheet row that exists in the local
/// store is `working`: the local write is newer than anything mirrored.
pub fn resolve_with_local(row: Option<&RemoteRow>, saved_locally: bool) -> WorkItemStatus {
    match row {
        None if saved_locally => WorkItemStatus::Working,
        _ => resolve(row),
    }
}

// ---------------------------------------------------------------------------
// Listing and statistics
// ---------------------------------------------------------------------------

/// One item in a status listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEntry {
    pub item_id: DbId,
    pub status: WorkItemStatus,
    pub review_verdict: Option<ReviewVerdict>,
    pub note: String,
    pub saved_at: Option<String>,
    pub assigned_at: Option<String>,
}

impl StatusEntry {
    pub fn new(item_id: DbId, row: Option<&RemoteRow>, saved_locally: bool) -> Self {
        Self {
            item_id,
            status: resolve_with_local(row, saved_locally),
            review_verdict: row.and_then(|r| r.review_verdict.clone()),
            note: row.map(|r| r.note.clone()).unwrap_or_default(),
            saved_at: row.and_then(|r| r.saved_at.clone()),
            assigned_at: row.and_then(|r| r.assigned_at.clone()),
        }
    }
}

/// Ordering of a status listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListSort {
    /// Ascending item id.
    #[default]
    ImageId,
    /// Earliest assignment first; unassigned items last.
    Oldest,
    /// Latest assignment first; unassigned items last.
    Newest,
}

/// Sort entries in place. Ties are always broken by ascending item id.
pub fn sort_entries(entries: &mut [StatusEntry], sort: ListSort) {
    fn by_assignment(a: &StatusEntry, b: &StatusEntry, newest: bool) -> Ordering {
        match (&a.assigned_at, &b.assigned_at) {
            (Some(x), Some(y)) if newest => y.cmp(x),
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    entries.sort_by(|a, b| {
        let primary = match sort {
            ListSort::ImageId => Ordering::Equal,
            ListSort::Oldest => by_assignment(a, b, false),
            ListSort::Newest => by_assignment(a, b, true),
        };
        primary.then(a.item_id.cmp(&b.item_id))
    });
}

/// Per-status tallies over a worker's items.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub unfinished: usize,
    pub working: usize,
    pub passed: usize,
    pub failed: usize,
    pub pending_review: usize,
    pub delivered: usize,
    pub skipped: usize,
    /// Percentage of items in a done status, `0.0` when there are no items.
    pub completion_rate: f64,
}

impl StatusCounts {
    pub fn tally(statuses: impl IntoIterator<Item = WorkItemStatus>) -> Self {
        let mut counts = Self::default();
        let mut done = 0usize;
        for status in statuses {
            counts.total += 1;
            if status.counts_as_done() {
                done += 1;
            }
            match status {
                WorkItemStatus::Unfinished => counts.unfinished += 1,
                WorkItemStatus::Working => counts.working += 1,
                WorkItemStatus::Passed => counts.passed += 1,
                WorkItemStatus::Failed => counts.failed += 1,
                WorkItemStatus::PendingReview => counts.pending_review += 1,
                WorkItemStatus::Delivered => counts.delivered += 1,
                WorkItemStatus::Skipped => counts.skipped += 1,
            }
        }
        if counts.total > 0 {
            counts.completion_rate = done as f64 / counts.total as f64 * 100.0;
        }
        counts
    }
}
