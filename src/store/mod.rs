pub mod sqlite;

use crate::domain::{CleanRecord, StudentRecord};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub use sqlite::SqliteRecordStore;

/// A batch of cleaned rows bound for the student table, carrying the
/// idempotency key that makes redelivered appends no-ops.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub batch_key: String,
    pub source_file: String,
    pub records: Vec<CleanRecord>,
}

impl RecordBatch {
    pub fn new(
        source_file: &str,
        last_modified: DateTime<Utc>,
        records: Vec<CleanRecord>,
    ) -> Self {
        let batch_key = batch_fingerprint(source_file, last_modified, &records);
        Self {
            batch_key,
            source_file: source_file.to_string(),
            records,
        }
    }
}

/// Receipt for an append.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReceipt {
    /// Rows committed for this batch (whether by this call or an earlier one).
    pub accepted: usize,
    /// True when the batch key was already committed and no rows were written.
    pub deduplicated: bool,
}

/// Stable fingerprint of one file version's canonical row content.
///
/// Source path and version timestamp are folded in so the same rows arriving
/// as a genuinely new version still count as a new batch.
pub fn batch_fingerprint(
    source_file: &str,
    last_modified: DateTime<Utc>,
    records: &[CleanRecord],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_file.as_bytes());
    hasher.update(b"|");
    hasher.update(last_modified.to_rfc3339().as_bytes());
    for record in records {
        hasher.update(b"\n");
        hasher.update(record.student_id.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(record.student_name.as_bytes());
        hasher.update(b"|");
        hasher.update(record.address.as_bytes());
        hasher.update(b"|");
        hasher.update(record.phone.as_bytes());
        hasher.update(b"|");
        hasher.update(record.admission_date.to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// The analytical student table. Append-only from the pipeline's point of
/// view; batch keys give appends at-most-once effect under redelivery.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Appends a batch atomically: either every row and the batch key commit
    /// together, or nothing does. Replays of a committed key write nothing.
    async fn append_batch(&self, batch: &RecordBatch) -> Result<BatchReceipt>;

    /// Number of student rows attributed to a source file.
    async fn count_for_source(&self, source_file: &str) -> Result<i64>;

    /// Student rows attributed to a source file, in insertion order.
    async fn fetch_for_source(&self, source_file: &str) -> Result<Vec<StudentRecord>>;
}
