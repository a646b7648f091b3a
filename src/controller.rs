use crate::cleaner::{Cleaner, CleanerConfig};
use crate::config::Config;
use crate::decision::DedupDecisionEngine;
use crate::domain::{CleanRecord, LoadStatus};
use crate::error::{PipelineError, Result};
use crate::event::FileEvent;
use crate::ledger::{AuditLedger, ClaimOutcome, ClaimTicket, Settlement, SqliteLedger};
use crate::notify::{CompositeNotifier, Notifier, SettleNotice};
use crate::objects::{FsObjectStore, ObjectStore};
use crate::observability::metrics;
use crate::parser::parser_for;
use crate::store::{RecordBatch, RecordStore, SqliteRecordStore};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// How one invocation ended, for the caller's exit code and reporting.
#[derive(Debug)]
pub enum InvocationOutcome {
    Success {
        rows_processed: i64,
        rows_rejected: i64,
        archive_file_path: String,
    },
    /// The ledger already reflects this version; nothing was done.
    Skipped { reason: String },
    /// The invocation settled FAILED or LOADED_PENDING_ARCHIVE.
    Failed { status: LoadStatus, error: String },
    /// Another invocation holds the claim. Benign; no writes, no notice.
    ClaimConflict { holder: String },
}

impl InvocationOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, InvocationOutcome::Failed { .. })
    }
}

struct LoadedBatch {
    rows_processed: usize,
    rows_rejected: usize,
    staging_path: PathBuf,
}

/// Drives one file event through the full workflow:
/// RECEIVED → CLAIMED → CLEANING → STAGED → LOADED → RELOCATED → SETTLED.
///
/// The controller holds no state across invocations; everything needed for
/// recovery lives in the ledger and the record store. Each `process` call is
/// an independent invocation with its own identity.
pub struct IngestionController {
    ledger: Box<dyn AuditLedger>,
    store: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    cleaner: Cleaner,
    engine: DedupDecisionEngine,
    deadline: Duration,
    clean_budget_floor: Duration,
}

impl IngestionController {
    pub fn new(
        config: &Config,
        ledger: Box<dyn AuditLedger>,
        store: Arc<dyn RecordStore>,
        objects: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            ledger,
            store,
            objects,
            notifier,
            cleaner: Cleaner::with_config(CleanerConfig {
                max_reject_ratio: config.policy.max_reject_ratio,
            }),
            engine: DedupDecisionEngine::from_secs(config.policy.claim_freshness_secs),
            deadline: Duration::from_secs(config.policy.deadline_secs),
            clean_budget_floor: Duration::from_secs(config.policy.clean_budget_floor_secs),
        }
    }

    /// Wires the controller to the configured SQLite warehouse, filesystem
    /// object locations, and notification sinks.
    pub fn from_config(config: &Config) -> Result<Self> {
        let busy_timeout = Duration::from_millis(config.warehouse.busy_timeout_ms);
        let ledger = SqliteLedger::open(&config.warehouse.db_path, busy_timeout)?;
        let store = SqliteRecordStore::open(&config.warehouse.db_path, busy_timeout)?;
        let objects = FsObjectStore::new(
            config.locations.staging_dir.clone(),
            config.locations.archive_dir.clone(),
        );
        let notifier = CompositeNotifier::from_config(&config.notify);
        Ok(Self::new(
            config,
            Box::new(ledger),
            Arc::new(store),
            Arc::new(objects),
            Arc::new(notifier),
        ))
    }

    /// Runs one invocation for one file event, settling it to a terminal
    /// outcome. Never returns `Err` for the data-level failures of §7; those
    /// settle FAILED and come back as `InvocationOutcome::Failed`. An `Err`
    /// here means the ledger itself was unreachable.
    pub async fn process(&mut self, event: &FileEvent) -> Result<InvocationOutcome> {
        let invocation_id = format!("inv-{}", Uuid::new_v4());
        let started = Instant::now();
        let path = event.path_str();
        info!(
            path = %path,
            size_bytes = event.size_bytes,
            last_modified = %event.last_modified,
            invocation = %invocation_id,
            "file event received"
        );

        // CLAIMED: the single synchronization point. The ledger classifies
        // the event and writes the PENDING claim under one write lock.
        let ticket = match self.ledger.claim(event, &self.engine, &invocation_id)? {
            ClaimOutcome::Conflict { holder, held_since } => {
                metrics::ledger::claim_conflicted();
                info!(
                    path = %path,
                    holder = %holder,
                    held_since = %held_since,
                    "claim held by a concurrent invocation, backing off"
                );
                return Ok(InvocationOutcome::ClaimConflict { holder });
            }
            ClaimOutcome::Skipped { entry, reason } => {
                metrics::ledger::claim_skipped();
                metrics::decision::outcome("UNCHANGED");
                info!(path = %path, reason = %reason, "skipping, no side effects");
                // The equal-timestamp skip settles the row in place; only a
                // settlement this invocation wrote gets a notice.
                if entry.load_status == LoadStatus::Skipped && entry.processed_by == invocation_id
                {
                    metrics::controller::settled(LoadStatus::Skipped.as_str());
                    self.send_notice(SettleNotice::from_entry(&entry, 0)).await;
                }
                metrics::controller::invocation_duration(started.elapsed().as_secs_f64());
                return Ok(InvocationOutcome::Skipped { reason });
            }
            ClaimOutcome::Granted(ticket) => ticket,
        };
        metrics::ledger::claim_granted();
        metrics::decision::outcome(ticket.decision.as_str());
        info!(path = %path, decision = %ticket.decision, "claim granted");

        let outcome = match self.run_claimed(event, started).await {
            Ok(loaded) => {
                // RELOCATED: only after the load committed. A crash before
                // this point leaves the original untouched and retryable.
                match self.objects.archive(&event.file_path, Utc::now()).await {
                    Ok(archive_path) => {
                        metrics::objects::relocation();
                        if let Err(e) = self.objects.delete_staging(&loaded.staging_path).await {
                            warn!(path = %path, error = %e, "staging artifact left behind");
                        }
                        let archive_file_path = archive_path.display().to_string();
                        self.settle_and_notify(
                            event,
                            &ticket,
                            &Settlement::Success {
                                rows_processed: loaded.rows_processed as i64,
                                staging_file_path: loaded.staging_path.display().to_string(),
                                archive_file_path: archive_file_path.clone(),
                            },
                            loaded.rows_rejected as i64,
                        )
                        .await?;
                        InvocationOutcome::Success {
                            rows_processed: loaded.rows_processed as i64,
                            rows_rejected: loaded.rows_rejected as i64,
                            archive_file_path,
                        }
                    }
                    Err(e) => {
                        // Rows are committed; the distinct status keeps a
                        // retry from appending them again.
                        metrics::objects::relocation_error();
                        let error = e.to_string();
                        error!(path = %path, error = %error, "loaded but not relocated");
                        self.settle_and_notify(
                            event,
                            &ticket,
                            &Settlement::LoadedPendingArchive {
                                rows_processed: loaded.rows_processed as i64,
                                staging_file_path: loaded.staging_path.display().to_string(),
                                error: error.clone(),
                            },
                            loaded.rows_rejected as i64,
                        )
                        .await?;
                        InvocationOutcome::Failed {
                            status: LoadStatus::LoadedPendingArchive,
                            error,
                        }
                    }
                }
            }
            Err(e) => {
                let error = e.to_string();
                error!(path = %path, error = %error, "invocation failed, original left in place");
                self.settle_and_notify(event, &ticket, &Settlement::Failed { error: error.clone() }, 0)
                    .await?;
                InvocationOutcome::Failed {
                    status: LoadStatus::Failed,
                    error,
                }
            }
        };
        metrics::controller::invocation_duration(started.elapsed().as_secs_f64());
        Ok(outcome)
    }

    /// CLEANING → STAGED → LOADED. Any error here fails the invocation with
    /// the original file untouched at the incoming location.
    async fn run_claimed(&self, event: &FileEvent, started: Instant) -> Result<LoadedBatch> {
        // Deadline gate: a large file must not be half-cleaned and then
        // abandoned mid-append when the surrounding environment kills us.
        let remaining = self.deadline.saturating_sub(started.elapsed());
        if remaining < self.clean_budget_floor {
            return Err(PipelineError::TimeoutPreempted { stage: "cleaning" });
        }

        // CLEANING
        let parser = parser_for(&event.file_path)?;
        let bytes = self.objects.fetch(&event.file_path).await?;
        let raw_rows = parser.parse(&bytes)?;
        let report = self.cleaner.clean_batch(&raw_rows);
        metrics::cleaner::rows_valid(report.records.len() as u64);
        for reject in &report.rejected {
            metrics::cleaner::row_rejected(reject.reason.field());
        }
        if report.records.is_empty() && !raw_rows.is_empty() {
            return Err(PipelineError::Transform(format!(
                "no valid rows among {} input rows",
                raw_rows.len()
            )));
        }
        self.cleaner.enforce_policy(&report)?;
        info!(
            path = %event.path_str(),
            valid = report.records.len(),
            rejected = report.rejected.len(),
            "cleaning finished"
        );

        // STAGED: the cleaned set lands in staging before any permanent
        // commit, so it can be inspected and re-run.
        let rows_rejected = report.rejected.len();
        let artifact_name = format!("{}_cleaned.csv", event.file_stem());
        let staged_bytes = staged_csv(&report.records)?;
        let staging_path = self.objects.put_staging(&artifact_name, &staged_bytes).await?;
        metrics::objects::staging_write();

        // LOADED: one atomic keyed batch.
        let batch = RecordBatch::new(&event.path_str(), event.last_modified, report.records);
        let submitted = batch.records.len();
        let receipt = self.store.append_batch(&batch).await?;
        if receipt.deduplicated {
            metrics::store::batch_deduplicated();
            info!(
                batch_key = %batch.batch_key,
                "batch already committed by an earlier attempt, rows not re-appended"
            );
        } else {
            metrics::store::batch_appended(receipt.accepted as u64);
            if receipt.accepted != submitted {
                return Err(PipelineError::StoreWrite(format!(
                    "store accepted {} of {} rows",
                    receipt.accepted, submitted
                )));
            }
        }

        Ok(LoadedBatch {
            rows_processed: receipt.accepted,
            rows_rejected,
            staging_path,
        })
    }

    /// SETTLED: terminal ledger update, then exactly one notice — and none
    /// at all when the claim was taken over and our settlement did not land.
    async fn settle_and_notify(
        &mut self,
        event: &FileEvent,
        ticket: &ClaimTicket,
        settlement: &Settlement,
        rows_rejected: i64,
    ) -> Result<()> {
        let recorded = self.ledger.settle(ticket, settlement)?;
        if !recorded {
            metrics::ledger::settle_lost();
            warn!(
                path = %event.path_str(),
                "claim taken over before settlement; outcome not recorded, no notice sent"
            );
            return Ok(());
        }
        let entry = self
            .ledger
            .find(&event.path_str())?
            .ok_or(PipelineError::Sqlite(rusqlite::Error::QueryReturnedNoRows))?;
        metrics::controller::settled(entry.load_status.as_str());
        self.send_notice(SettleNotice::from_entry(&entry, rows_rejected))
            .await;
        Ok(())
    }

    /// Delivery failures never alter the settled outcome.
    async fn send_notice(&self, notice: SettleNotice) {
        match self.notifier.notify(&notice).await {
            Ok(()) => metrics::notify::sent(),
            Err(e) => {
                metrics::notify::failed();
                warn!(path = %notice.file_path, error = %e, "notice delivery failed");
            }
        }
    }
}

/// Renders the cleaned batch as the staged CSV artifact.
fn staged_csv(records: &[CleanRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["StudentID", "StudentName", "Address", "Phone", "AdmissionDate"])?;
    for record in records {
        writer.write_record(&[
            record.student_id.to_string(),
            record.student_name.clone(),
            record.address.clone(),
            record.phone.clone(),
            record.admission_date.to_string(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::Transform(format!("staging serialization failed: {e}")))
}
