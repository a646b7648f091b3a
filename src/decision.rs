use crate::domain::{AuditLogEntry, LoadStatus};
use crate::event::FileEvent;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::cmp::Ordering;

/// What the pipeline should do with an observed file version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadDecision {
    /// No ledger history for this path; process it.
    New,
    /// The event is a newer version than the ledger row, or a retry of an
    /// unfinished attempt at the same version; process it.
    Modified,
    /// The ledger already reflects this version (or a newer one); skip it.
    Unchanged,
    /// Another invocation holds a fresh claim on this path; back off.
    InProgressConflict,
}

impl LoadDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadDecision::New => "NEW",
            LoadDecision::Modified => "MODIFIED",
            LoadDecision::Unchanged => "UNCHANGED",
            LoadDecision::InProgressConflict => "IN_PROGRESS_CONFLICT",
        }
    }
}

impl std::fmt::Display for LoadDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies file events against ledger history.
///
/// Pure with respect to its inputs: the prior entry and the current time are
/// passed in, so the same inputs always yield the same decision. The ledger
/// calls this under its write lock; there is no synchronization here.
pub struct DedupDecisionEngine {
    /// Age beyond which a PENDING claim counts as abandoned and can be
    /// taken over.
    pub claim_freshness: Duration,
}

impl DedupDecisionEngine {
    pub fn new(claim_freshness: Duration) -> Self {
        Self { claim_freshness }
    }

    pub fn from_secs(claim_freshness_secs: u64) -> Self {
        Self::new(Duration::seconds(claim_freshness_secs.min(i64::MAX as u64) as i64))
    }

    pub fn decide(
        &self,
        event: &FileEvent,
        prior: Option<&AuditLogEntry>,
        claimant: &str,
        now: DateTime<Utc>,
    ) -> LoadDecision {
        let Some(entry) = prior else {
            return LoadDecision::New;
        };

        if entry.load_status == LoadStatus::Pending && entry.processed_by != claimant {
            let age = now.signed_duration_since(entry.updated_at);
            if age < self.claim_freshness {
                return LoadDecision::InProgressConflict;
            }
            // Abandoned claim. Take it over unless the event is older than
            // the version the dead claim was working on.
            return if event.last_modified >= entry.last_modified {
                LoadDecision::Modified
            } else {
                LoadDecision::Unchanged
            };
        }

        match event.last_modified.cmp(&entry.last_modified) {
            Ordering::Greater => LoadDecision::Modified,
            Ordering::Less => LoadDecision::Unchanged,
            Ordering::Equal => match entry.load_status {
                // Same version, but the last attempt did not finish cleanly.
                // Failed loads retry in full; LOADED_PENDING_ARCHIVE retries
                // to finish relocation (the row append dedups on batch key).
                LoadStatus::Failed | LoadStatus::Pending | LoadStatus::LoadedPendingArchive => {
                    LoadDecision::Modified
                }
                LoadStatus::Success | LoadStatus::Skipped => LoadDecision::Unchanged,
            },
        }
    }
}
