use crate::error::PipelineError;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Lifecycle states a file load settles into, as recorded in the audit ledger.
///
/// `Pending` marks a live claim. `LoadedPendingArchive` marks the narrow window
/// where rows are committed but the source file could not be relocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadStatus {
    Pending,
    Success,
    Skipped,
    Failed,
    LoadedPendingArchive,
}

impl LoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStatus::Pending => "PENDING",
            LoadStatus::Success => "SUCCESS",
            LoadStatus::Skipped => "SKIPPED",
            LoadStatus::Failed => "FAILED",
            LoadStatus::LoadedPendingArchive => "LOADED_PENDING_ARCHIVE",
        }
    }

    /// True once an invocation has finished with this file version.
    pub fn is_settled(&self) -> bool {
        !matches!(self, LoadStatus::Pending)
    }
}

impl std::str::FromStr for LoadStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(LoadStatus::Pending),
            "SUCCESS" => Ok(LoadStatus::Success),
            "SKIPPED" => Ok(LoadStatus::Skipped),
            "FAILED" => Ok(LoadStatus::Failed),
            "LOADED_PENDING_ARCHIVE" => Ok(LoadStatus::LoadedPendingArchive),
            other => Err(PipelineError::Config(format!(
                "unknown load status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for LoadStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for LoadStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse::<LoadStatus>()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// One ledger row: the authoritative processing history for a file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub log_id: String,
    pub file_name: String,
    pub file_path: String,
    /// Version marker of the file content this row reflects. Monotonically
    /// non-decreasing over the row's lifetime.
    pub last_modified: DateTime<Utc>,
    pub file_size_bytes: i64,
    pub rows_processed: i64,
    pub load_status: LoadStatus,
    pub staging_file_path: Option<String>,
    pub archive_file_path: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Identity of the invocation that last wrote this row. Used as the fence
    /// token for settlement.
    pub processed_by: String,
}

/// A row that passed cleaning and is ready for the student table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanRecord {
    pub student_id: i64,
    pub student_name: String,
    pub address: String,
    pub phone: String,
    pub admission_date: NaiveDate,
}

/// A persisted student row, including the store-side provenance columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentRecord {
    pub student_id: i64,
    pub student_name: String,
    pub address: String,
    pub phone: String,
    pub admission_date: NaiveDate,
    pub load_timestamp: DateTime<Utc>,
    pub source_file: String,
}
