use crate::domain::StudentRecord;
use crate::error::Result;
use crate::store::{BatchReceipt, RecordBatch, RecordStore};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, TransactionBehavior};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Student table backed by a local SQLite database.
///
/// The mutex only satisfies `&self` access to the connection handle; batch
/// atomicity and cross-process safety come from the SQLite transaction.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    pub fn open<P: AsRef<Path>>(db_path: P, busy_timeout: Duration) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS Students (
                StudentID       INTEGER NOT NULL,
                StudentName     TEXT NOT NULL,
                Address         TEXT NOT NULL,
                Phone           TEXT NOT NULL,
                AdmissionDate   TEXT NOT NULL,
                LoadTimestamp   TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                SourceFile      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_students_source ON Students(SourceFile);
            CREATE TABLE IF NOT EXISTS LoadBatches (
                BatchKey        TEXT PRIMARY KEY,
                SourceFile      TEXT NOT NULL,
                RowCount        INTEGER NOT NULL,
                CommittedAt     TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn append_batch(&self, batch: &RecordBatch) -> Result<BatchReceipt> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let replayed: Option<i64> = {
            let mut stmt = tx.prepare("SELECT RowCount FROM LoadBatches WHERE BatchKey = ?1")?;
            let mut rows = stmt.query(params![batch.batch_key])?;
            match rows.next()? {
                Some(row) => Some(row.get(0)?),
                None => None,
            }
        };
        if let Some(committed) = replayed {
            debug!(batch_key = %batch.batch_key, "batch already committed, skipping append");
            return Ok(BatchReceipt {
                accepted: committed as usize,
                deduplicated: true,
            });
        }

        let now = Utc::now();
        {
            let mut insert = tx.prepare(
                "INSERT INTO Students (StudentID, StudentName, Address, Phone, AdmissionDate, \
                 LoadTimestamp, SourceFile) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for record in &batch.records {
                insert.execute(params![
                    record.student_id,
                    record.student_name,
                    record.address,
                    record.phone,
                    record.admission_date,
                    now,
                    batch.source_file
                ])?;
            }
        }
        tx.execute(
            "INSERT INTO LoadBatches (BatchKey, SourceFile, RowCount, CommittedAt) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                batch.batch_key,
                batch.source_file,
                batch.records.len() as i64,
                now
            ],
        )?;
        tx.commit()?;

        Ok(BatchReceipt {
            accepted: batch.records.len(),
            deduplicated: false,
        })
    }

    async fn count_for_source(&self, source_file: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT COUNT(*) FROM Students WHERE SourceFile = ?1")?;
        let mut rows = stmt.query(params![source_file])?;
        match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    async fn fetch_for_source(&self, source_file: &str) -> Result<Vec<StudentRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT StudentID, StudentName, Address, Phone, AdmissionDate, LoadTimestamp, \
             SourceFile FROM Students WHERE SourceFile = ?1 ORDER BY rowid",
        )?;
        let mut rows = stmt.query(params![source_file])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(StudentRecord {
                student_id: row.get(0)?,
                student_name: row.get(1)?,
                address: row.get(2)?,
                phone: row.get(3)?,
                admission_date: row.get(4)?,
                load_timestamp: row.get(5)?,
                source_file: row.get(6)?,
            });
        }
        Ok(records)
    }
}
