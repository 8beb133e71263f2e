//! Worker bookkeeping: the worker registry, which images each worker owns,
//! and how many they completed per day and per hour.

use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// Lifecycle of one assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    Completed,
}

/// One image handed to one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub image_id: DbId,
    pub status: AssignmentStatus,
    pub assigned_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
}

impl Assignment {
    pub fn new(image_id: DbId, now: Timestamp) -> Self {
        Self {
            image_id,
            status: AssignmentStatus::Assigned,
            assigned_at: now,
            completed_at: None,
        }
    }
}

/// Assignment progress of one worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkerProgress {
    pub assigned: usize,
    pub completed: usize,
    /// Percentage, `0.0` when nothing is assigned.
    pub completion_rate: f64,
}

pub fn progress(assignments: &[Assignment]) -> WorkerProgress {
    let assigned = assignments.len();
    let completed = assignments
        .iter()
        .filter(|a| a.status == AssignmentStatus::Completed)
        .count();
    let completion_rate = if assigned == 0 {
        0.0
    } else {
        completed as f64 / assigned as f64 * 100.0
    };
    WorkerProgress {
        assigned,
        completed,
        completion_rate,
    }
}

/// Completed assignments bucketed by the local day and hour of completion.
///
/// Keys are `YYYY-MM-DD` and `YYYY-MM-DD HH:00`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompletionStats {
    pub total_completed: usize,
    pub daily_stats: BTreeMap<String, usize>,
    pub hourly_stats: BTreeMap<String, usize>,
}

/// Tally completions in `tz`. With `date`, only that day's buckets are kept;
/// `total_completed` always counts every completion.
pub fn completion_stats<Tz: TimeZone>(
    assignments: &[Assignment],
    tz: &Tz,
    date: Option<NaiveDate>,
) -> CompletionStats
where
    Tz::Offset: std::fmt::Display,
{
    let mut stats = CompletionStats::default();
    for at in assignments
        .iter()
        .filter(|a| a.status == AssignmentStatus::Completed)
        .filter_map(|a| a.completed_at)
    {
        stats.total_completed += 1;
        let local = at.with_timezone(tz);
        if date.is_some_and(|d| local.date_naive() != d) {
            continue;
        }
        *stats
            .daily_stats
            .entry(local.format("%Y-%m-%d").to_string())
            .or_default() += 1;
        *stats
            .hourly_stats
            .entry(local.format("%Y-%m-%d %H:00").to_string())
            .or_default() += 1;
    }
    stats
}

/// Parse a `?date=YYYY-MM-DD` filter.
pub fn parse_stats_date(raw: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| CoreError::Validation(format!("date '{raw}' must be YYYY-MM-DD")))
}

/* --------------------------------------------------------------------------
   Registry
   -------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    #[default]
    Active,
}

/// A registered annotator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub worker_id: String,
    pub worker_name: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub status: WorkerState,
}

impl Worker {
    pub fn new(worker_id: &str, worker_name: &str, now: Timestamp) -> Self {
        Self {
            worker_id: worker_id.to_string(),
            worker_name: worker_name.to_string(),
            created_at: now,
            status: WorkerState::Active,
        }
    }
}

/// Request to register a worker or rename an existing one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkerRegistration {
    #[serde(default)]
    pub worker_id: String,
    #[serde(default)]
    pub worker_name: String,
}

impl WorkerRegistration {
    /// Both fields are required; the id must also name a valid sheet.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut missing = Vec::new();
        if self.worker_id.trim().is_empty() {
            missing.push("worker_id");
        }
        if self.worker_name.trim().is_empty() {
            missing.push("worker_name");
        }
        if !missing.is_empty() {
            return Err(CoreError::MissingFields(missing));
        }
        validate_worker_id(&self.worker_id)
    }
}

/* --------------------------------------------------------------------------
   Distribution
   -------------------------------------------------------------------------- */

/// Split `image_ids` into contiguous chunks, one per worker.
///
/// Every worker gets `len / workers` images; the first `len % workers`
/// workers get one extra. Input order is preserved within each chunk.
pub fn distribute_evenly(
    image_ids: &[DbId],
    workers: &[String],
) -> Result<BTreeMap<String, Vec<DbId>>, CoreError> {
    if workers.is_empty() {
        return Err(CoreError::Validation(
            "At least one worker is required".to_string(),
        ));
    }
    for worker in workers {
        validate_worker_id(worker)?;
    }

    let base = image_ids.len() / workers.len();
    let remainder = image_ids.len() % workers.len();

    let mut out = BTreeMap::new();
    let mut start = 0;
    for (i, worker) in workers.iter().enumerate() {
        let take = base + usize::from(i < remainder);
        out.entry(worker.clone())
            .or_insert_with(Vec::new)
            .extend_from_slice(&image_ids[start..start + take]);
        start += take;
    }
    Ok(out)
}

/// Worker ids name a sheet and a key in the assignment file.
pub fn validate_worker_id(worker_id: &str) -> Result<(), CoreError> {
    let trimmed = worker_id.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("worker_id must not be empty".to_string()));
    }
    if trimmed.len() > 100 {
        return Err(CoreError::Validation(
            "worker_id must be at most 100 characters".to_string(),
        ));
    }
    if trimmed.chars().any(|c| c.is_control() || matches!(c, '/' | '\\' | '!' | '\'')) {
        return Err(CoreError::Validation(format!(
            "worker_id '{trimmed}' contains invalid characters"
        )));
    }
    Ok(())
}
