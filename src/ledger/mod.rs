pub mod sqlite;

use crate::decision::{DedupDecisionEngine, LoadDecision};
use crate::domain::{AuditLogEntry, LoadStatus};
use crate::error::Result;
use crate::event::FileEvent;
use chrono::{DateTime, Utc};

pub use sqlite::SqliteLedger;

/// Result of attempting to claim a file version for processing.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// The claim is ours; the ledger row is PENDING under our identity.
    Granted(ClaimTicket),
    /// The ledger already reflects this version; nothing to process.
    /// When the skip itself is worth recording, the row is already settled
    /// SKIPPED by the time this returns.
    Skipped { entry: AuditLogEntry, reason: String },
    /// Someone else holds a fresh claim on this path.
    Conflict {
        holder: String,
        held_since: DateTime<Utc>,
    },
}

/// Proof of a granted claim, carried through processing to settlement.
#[derive(Debug, Clone)]
pub struct ClaimTicket {
    pub log_id: String,
    /// The invocation identity the PENDING row was written under. Settlement
    /// is fenced on this value.
    pub claimant: String,
    pub decision: LoadDecision,
    pub claimed_at: DateTime<Utc>,
}

/// Terminal state reported to the ledger at the end of an invocation.
#[derive(Debug, Clone)]
pub enum Settlement {
    Success {
        rows_processed: i64,
        staging_file_path: String,
        archive_file_path: String,
    },
    Failed {
        error: String,
    },
    /// Rows are committed but the source file could not be relocated. A later
    /// delivery retries relocation; the row append dedups on batch key.
    LoadedPendingArchive {
        rows_processed: i64,
        staging_file_path: String,
        error: String,
    },
}

/// The durable audit ledger. One row per file path; the row is both the
/// processing history and the claim that serializes concurrent invocations.
pub trait AuditLedger: Send {
    /// Atomically classifies `event` against history and, when processing is
    /// warranted, writes the PENDING claim. Classification and claim happen
    /// under a single ledger write lock, so exactly one of two racing
    /// invocations is granted.
    fn claim(
        &mut self,
        event: &FileEvent,
        engine: &DedupDecisionEngine,
        claimant: &str,
    ) -> Result<ClaimOutcome>;

    /// Settles a granted claim. The update is fenced on the ticket's claimant
    /// and the PENDING status; returns false when the row has moved on (for
    /// example after a takeover) and the settlement was not recorded.
    fn settle(&mut self, ticket: &ClaimTicket, settlement: &Settlement) -> Result<bool>;

    /// Current ledger entry for a path, if any.
    fn find(&self, file_path: &str) -> Result<Option<AuditLogEntry>>;

    /// Recent entries, most recently updated first.
    fn history(&self, limit: usize, status: Option<LoadStatus>) -> Result<Vec<AuditLogEntry>>;
}
