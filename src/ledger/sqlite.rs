use crate::decision::{DedupDecisionEngine, LoadDecision};
use crate::domain::{AuditLogEntry, LoadStatus};
use crate::error::{PipelineError, Result};
use crate::event::FileEvent;
use crate::ledger::{AuditLedger, ClaimOutcome, ClaimTicket, Settlement};
use chrono::Utc;
use rusqlite::{params, Connection, TransactionBehavior};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const ENTRY_COLUMNS: &str = "LogID, FileName, FilePath, LastModifiedTimestamp, FileSizeBytes, \
     RowsProcessed, LoadStatus, StagingFilePath, ArchiveFilePath, ErrorMessage, CreatedAt, \
     UpdatedAt, ProcessedBy";

/// Audit ledger backed by a local SQLite database.
///
/// Claims run inside `BEGIN IMMEDIATE` transactions, so the database write
/// lock is what serializes racing invocations. There is no in-process
/// synchronization; separate processes on the same ledger are serialized the
/// same way.
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    /// Opens (creating if needed) the ledger database. WAL keeps readers out
    /// of writers' way; the busy timeout bounds lock waits so a second
    /// invocation queues behind a claim instead of erroring immediately.
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
            CREATE TABLE IF NOT EXISTS FileLoadLog (
                LogID                   TEXT PRIMARY KEY,
                FileName                TEXT NOT NULL,
                FilePath                TEXT NOT NULL UNIQUE,
                LastModifiedTimestamp   TEXT NOT NULL,
                FileSizeBytes           INTEGER NOT NULL,
                RowsProcessed           INTEGER NOT NULL DEFAULT 0,
                LoadStatus              TEXT NOT NULL,
                StagingFilePath         TEXT,
                ArchiveFilePath         TEXT,
                ErrorMessage            TEXT,
                CreatedAt               TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UpdatedAt               TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                ProcessedBy             TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_fileloadlog_status ON FileLoadLog(LoadStatus);
            "#,
        )?;
        Ok(Self { conn })
    }
}

fn missing_row() -> PipelineError {
    PipelineError::Sqlite(rusqlite::Error::QueryReturnedNoRows)
}

fn fetch_entry(conn: &Connection, file_path: &str) -> Result<Option<AuditLogEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM FileLoadLog WHERE FilePath = ?1"
    ))?;
    let mut rows = stmt.query(params![file_path])?;
    if let Some(row) = rows.next()? {
        Ok(Some(entry_from_row(row)?))
    } else {
        Ok(None)
    }
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> Result<AuditLogEntry> {
    Ok(AuditLogEntry {
        log_id: row.get(0)?,
        file_name: row.get(1)?,
        file_path: row.get(2)?,
        last_modified: row.get(3)?,
        file_size_bytes: row.get(4)?,
        rows_processed: row.get(5)?,
        load_status: row.get(6)?,
        staging_file_path: row.get(7)?,
        archive_file_path: row.get(8)?,
        error_message: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        processed_by: row.get(12)?,
    })
}

impl AuditLedger for SqliteLedger {
    fn claim(
        &mut self,
        event: &FileEvent,
        engine: &DedupDecisionEngine,
        claimant: &str,
    ) -> Result<ClaimOutcome> {
        let now = Utc::now();
        let file_path = event.path_str();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let prior = fetch_entry(&tx, &file_path)?;
        let decision = engine.decide(event, prior.as_ref(), claimant, now);
        debug!(path = %file_path, decision = %decision, "claim decision");

        let outcome = match decision {
            LoadDecision::New => {
                let log_id = Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO FileLoadLog (LogID, FileName, FilePath, LastModifiedTimestamp, \
                     FileSizeBytes, RowsProcessed, LoadStatus, CreatedAt, UpdatedAt, ProcessedBy) \
                     VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?7, ?8)",
                    params![
                        log_id,
                        event.file_name,
                        file_path,
                        event.last_modified,
                        event.size_bytes,
                        LoadStatus::Pending,
                        now,
                        claimant
                    ],
                )?;
                ClaimOutcome::Granted(ClaimTicket {
                    log_id,
                    claimant: claimant.to_string(),
                    decision,
                    claimed_at: now,
                })
            }
            LoadDecision::Modified => {
                let entry = prior.ok_or_else(missing_row)?;
                // Per-attempt fields reset; RowsProcessed stays until settle.
                tx.execute(
                    "UPDATE FileLoadLog SET LastModifiedTimestamp = ?1, FileSizeBytes = ?2, \
                     LoadStatus = ?3, StagingFilePath = NULL, ArchiveFilePath = NULL, \
                     ErrorMessage = NULL, UpdatedAt = ?4, ProcessedBy = ?5 WHERE LogID = ?6",
                    params![
                        event.last_modified,
                        event.size_bytes,
                        LoadStatus::Pending,
                        now,
                        claimant,
                        entry.log_id
                    ],
                )?;
                ClaimOutcome::Granted(ClaimTicket {
                    log_id: entry.log_id,
                    claimant: claimant.to_string(),
                    decision,
                    claimed_at: now,
                })
            }
            LoadDecision::Unchanged => {
                let entry = prior.ok_or_else(missing_row)?;
                if event.last_modified == entry.last_modified && entry.load_status.is_settled() {
                    // Duplicate delivery of a settled version: record the skip
                    // on the row itself, preserving RowsProcessed.
                    let reason = "file not modified since last processing".to_string();
                    tx.execute(
                        "UPDATE FileLoadLog SET LoadStatus = ?1, ErrorMessage = ?2, \
                         UpdatedAt = ?3, ProcessedBy = ?4 WHERE LogID = ?5",
                        params![
                            LoadStatus::Skipped,
                            format!("Skipped: {reason}"),
                            now,
                            claimant,
                            entry.log_id
                        ],
                    )?;
                    let entry = fetch_entry(&tx, &file_path)?.ok_or_else(missing_row)?;
                    ClaimOutcome::Skipped { entry, reason }
                } else {
                    // An out-of-order older event. The row reflects a newer
                    // version, so it is left untouched.
                    let reason = "event is older than the version already recorded".to_string();
                    ClaimOutcome::Skipped { entry, reason }
                }
            }
            LoadDecision::InProgressConflict => {
                let entry = prior.ok_or_else(missing_row)?;
                ClaimOutcome::Conflict {
                    holder: entry.processed_by,
                    held_since: entry.updated_at,
                }
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn settle(&mut self, ticket: &ClaimTicket, settlement: &Settlement) -> Result<bool> {
        let now = Utc::now();
        let changed = match settlement {
            Settlement::Success {
                rows_processed,
                staging_file_path,
                archive_file_path,
            } => self.conn.execute(
                "UPDATE FileLoadLog SET LoadStatus = ?1, RowsProcessed = ?2, \
                 StagingFilePath = ?3, ArchiveFilePath = ?4, ErrorMessage = NULL, UpdatedAt = ?5 \
                 WHERE LogID = ?6 AND ProcessedBy = ?7 AND LoadStatus = ?8",
                params![
                    LoadStatus::Success,
                    rows_processed,
                    staging_file_path,
                    archive_file_path,
                    now,
                    ticket.log_id,
                    ticket.claimant,
                    LoadStatus::Pending
                ],
            )?,
            Settlement::Failed { error } => self.conn.execute(
                "UPDATE FileLoadLog SET LoadStatus = ?1, RowsProcessed = 0, ErrorMessage = ?2, \
                 UpdatedAt = ?3 WHERE LogID = ?4 AND ProcessedBy = ?5 AND LoadStatus = ?6",
                params![
                    LoadStatus::Failed,
                    error,
                    now,
                    ticket.log_id,
                    ticket.claimant,
                    LoadStatus::Pending
                ],
            )?,
            Settlement::LoadedPendingArchive {
                rows_processed,
                staging_file_path,
                error,
            } => self.conn.execute(
                "UPDATE FileLoadLog SET LoadStatus = ?1, RowsProcessed = ?2, \
                 StagingFilePath = ?3, ErrorMessage = ?4, UpdatedAt = ?5 \
                 WHERE LogID = ?6 AND ProcessedBy = ?7 AND LoadStatus = ?8",
                params![
                    LoadStatus::LoadedPendingArchive,
                    rows_processed,
                    staging_file_path,
                    error,
                    now,
                    ticket.log_id,
                    ticket.claimant,
                    LoadStatus::Pending
                ],
            )?,
        };
        Ok(changed == 1)
    }

    fn find(&self, file_path: &str) -> Result<Option<AuditLogEntry>> {
        fetch_entry(&self.conn, file_path)
    }

    fn history(&self, limit: usize, status: Option<LoadStatus>) -> Result<Vec<AuditLogEntry>> {
        let mut entries = Vec::new();
        match status {
            Some(status) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM FileLoadLog WHERE LoadStatus = ?1 \
                     ORDER BY UpdatedAt DESC LIMIT ?2"
                ))?;
                let mut rows = stmt.query(params![status, limit as i64])?;
                while let Some(row) = rows.next()? {
                    entries.push(entry_from_row(row)?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM FileLoadLog ORDER BY UpdatedAt DESC LIMIT ?1"
                ))?;
                let mut rows = stmt.query(params![limit as i64])?;
                while let Some(row) = rows.next()? {
                    entries.push(entry_from_row(row)?);
                }
            }
        }
        Ok(entries)
    }
}
