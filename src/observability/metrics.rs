//! Metrics for the roster ingestion pipeline.
//!
//! All metric names live in one catalog enum, following Prometheus naming
//! conventions, so call sites never carry magic strings. Helpers are plain
//! `metrics` macro calls and are no-ops until a recorder is installed,
//! which keeps tests and library embedders free of setup requirements.

use std::fmt;
use std::sync::OnceLock;

/// Every metric the pipeline records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Decision outcomes
    DecisionOutcomes,

    // Ledger claim results
    LedgerClaimsGranted,
    LedgerClaimsSkipped,
    LedgerClaimsConflicted,
    LedgerSettlesLost,

    // Cleaner
    CleanerRowsValid,
    CleanerRowsRejected,

    // Record store
    StoreBatchesAppended,
    StoreBatchesDeduplicated,
    StoreRowsAppended,

    // Object locations
    ObjectsStagingWrites,
    ObjectsRelocations,
    ObjectsRelocationErrors,

    // Notifications
    NotifySent,
    NotifyFailed,

    // Controller
    ControllerSettled,
    ControllerInvocationDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::DecisionOutcomes => "roster_decision_outcomes_total",

            MetricName::LedgerClaimsGranted => "roster_ledger_claims_granted_total",
            MetricName::LedgerClaimsSkipped => "roster_ledger_claims_skipped_total",
            MetricName::LedgerClaimsConflicted => "roster_ledger_claims_conflicted_total",
            MetricName::LedgerSettlesLost => "roster_ledger_settles_lost_total",

            MetricName::CleanerRowsValid => "roster_cleaner_rows_valid_total",
            MetricName::CleanerRowsRejected => "roster_cleaner_rows_rejected_total",

            MetricName::StoreBatchesAppended => "roster_store_batches_appended_total",
            MetricName::StoreBatchesDeduplicated => "roster_store_batches_deduplicated_total",
            MetricName::StoreRowsAppended => "roster_store_rows_appended_total",

            MetricName::ObjectsStagingWrites => "roster_objects_staging_writes_total",
            MetricName::ObjectsRelocations => "roster_objects_relocations_total",
            MetricName::ObjectsRelocationErrors => "roster_objects_relocation_errors_total",

            MetricName::NotifySent => "roster_notify_sent_total",
            MetricName::NotifyFailed => "roster_notify_failed_total",

            MetricName::ControllerSettled => "roster_controller_settled_total",
            MetricName::ControllerInvocationDuration => {
                "roster_controller_invocation_duration_seconds"
            }
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static PROMETHEUS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> =
    OnceLock::new();

/// Installs the Prometheus recorder. Call once at process startup; helpers
/// stay silent no-ops when this was never called.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))?;
    let _ = PROMETHEUS_HANDLE.set(handle);
    Ok(())
}

/// Current metrics in Prometheus exposition format, for dumping at the end
/// of a run or serving from a debug endpoint.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

pub mod decision {
    use super::MetricName;

    pub fn outcome(decision: &str) {
        ::metrics::counter!(
            MetricName::DecisionOutcomes.as_str(),
            "decision" => decision.to_string()
        )
        .increment(1);
    }
}

pub mod ledger {
    use super::MetricName;

    pub fn claim_granted() {
        ::metrics::counter!(MetricName::LedgerClaimsGranted.as_str()).increment(1);
    }

    pub fn claim_skipped() {
        ::metrics::counter!(MetricName::LedgerClaimsSkipped.as_str()).increment(1);
    }

    pub fn claim_conflicted() {
        ::metrics::counter!(MetricName::LedgerClaimsConflicted.as_str()).increment(1);
    }

    /// A settlement that found its claim already taken over.
    pub fn settle_lost() {
        ::metrics::counter!(MetricName::LedgerSettlesLost.as_str()).increment(1);
    }
}

pub mod cleaner {
    use super::MetricName;

    pub fn rows_valid(count: u64) {
        ::metrics::counter!(MetricName::CleanerRowsValid.as_str()).increment(count);
    }

    pub fn row_rejected(reason: &str) {
        ::metrics::counter!(
            MetricName::CleanerRowsRejected.as_str(),
            "reason" => reason.to_string()
        )
        .increment(1);
    }
}

pub mod store {
    use super::MetricName;

    pub fn batch_appended(rows: u64) {
        ::metrics::counter!(MetricName::StoreBatchesAppended.as_str()).increment(1);
        ::metrics::counter!(MetricName::StoreRowsAppended.as_str()).increment(rows);
    }

    pub fn batch_deduplicated() {
        ::metrics::counter!(MetricName::StoreBatchesDeduplicated.as_str()).increment(1);
    }
}

pub mod objects {
    use super::MetricName;

    pub fn staging_write() {
        ::metrics::counter!(MetricName::ObjectsStagingWrites.as_str()).increment(1);
    }

    pub fn relocation() {
        ::metrics::counter!(MetricName::ObjectsRelocations.as_str()).increment(1);
    }

    pub fn relocation_error() {
        ::metrics::counter!(MetricName::ObjectsRelocationErrors.as_str()).increment(1);
    }
}

pub mod notify {
    use super::MetricName;

    pub fn sent() {
        ::metrics::counter!(MetricName::NotifySent.as_str()).increment(1);
    }

    pub fn failed() {
        ::metrics::counter!(MetricName::NotifyFailed.as_str()).increment(1);
    }
}

pub mod controller {
    use super::MetricName;

    pub fn settled(status: &str) {
        ::metrics::counter!(
            MetricName::ControllerSettled.as_str(),
            "status" => status.to_string()
        )
        .increment(1);
    }

    pub fn invocation_duration(secs: f64) {
        ::metrics::histogram!(MetricName::ControllerInvocationDuration.as_str()).record(secs);
    }
}
