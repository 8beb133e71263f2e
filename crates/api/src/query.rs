//! Shared query parameter types for API handlers.

use serde::Deserialize;
use vqa_core::status::ListSort;

/// `?refresh=true` bypasses a live mirror cache entry.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshParams {
    #[serde(default)]
    pub refresh: bool,
}

/// Query parameters for the per-worker item listing (`?status=&sort=&refresh=`).
///
/// `status` stays a string so an unknown value is reported as a
/// validation error rather than a bare extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct ItemListParams {
    pub status: Option<String>,
    #[serde(default)]
    pub sort: ListSort,
    #[serde(default)]
    pub refresh: bool,
}

/// `?date=YYYY-MM-DD` narrows worker stats to one local day.
#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub date: Option<String>,
}
