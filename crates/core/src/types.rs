/// Image / item identifiers as they appear in the partition files and sheets.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
