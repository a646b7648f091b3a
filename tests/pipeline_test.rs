use chrono::Duration as ChronoDuration;
use roster_ingest::config::Config;
use roster_ingest::controller::{IngestionController, InvocationOutcome};
use roster_ingest::domain::LoadStatus;
use roster_ingest::event::FileEvent;
use roster_ingest::ledger::{AuditLedger, SqliteLedger};
use roster_ingest::notify::SettleNotice;
use roster_ingest::store::{RecordStore, SqliteRecordStore};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Three valid rows plus one with a phone too short to canonicalize.
const ROSTER_CSV: &str = "StudentID,StudentName,Address,Phone,AdmissionDate\n\
    101,Alice Smith,12_Oak_Ave,(555) 010-1234,2024-01-15\n\
    102,Bob Jones,34 Pine St,555-010-2345,01/16/2024\n\
    103,Carol White,56 Elm St,5550103456,2024-01-17\n\
    104,Dan Brown,78 Ash Rd,555-0104,2024-01-18\n";

struct Harness {
    config: Config,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.locations.incoming_dir = dir.path().join("incoming");
        config.locations.staging_dir = dir.path().join("processed");
        config.locations.archive_dir = dir.path().join("archived");
        config.warehouse.db_path = dir.path().join("roster.db");
        config.notify.outbox_path = dir.path().join("outbox.ndjson");
        fs::create_dir_all(&config.locations.incoming_dir).unwrap();
        Self { config, _dir: dir }
    }

    fn write_incoming(&self, name: &str, content: &str) -> PathBuf {
        let path = self.config.locations.incoming_dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn controller(&self) -> IngestionController {
        IngestionController::from_config(&self.config).unwrap()
    }

    fn ledger(&self) -> SqliteLedger {
        SqliteLedger::open(&self.config.warehouse.db_path, Duration::from_secs(5)).unwrap()
    }

    fn store(&self) -> SqliteRecordStore {
        SqliteRecordStore::open(&self.config.warehouse.db_path, Duration::from_secs(5)).unwrap()
    }

    fn notices(&self) -> Vec<SettleNotice> {
        match fs::read_to_string(&self.config.notify.outbox_path) {
            Ok(content) => content
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn archived_files(&self) -> Vec<String> {
        match fs::read_dir(&self.config.locations.archive_dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

fn success(outcome: &InvocationOutcome) -> (i64, i64) {
    match outcome {
        InvocationOutcome::Success {
            rows_processed,
            rows_rejected,
            ..
        } => (*rows_processed, *rows_rejected),
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn new_file_loads_cleans_archives_and_notifies() {
    let harness = Harness::new();
    let path = harness.write_incoming("students.csv", ROSTER_CSV);
    let event = FileEvent::from_path(&path).unwrap();

    let outcome = harness.controller().process(&event).await.unwrap();
    let (rows_processed, rows_rejected) = success(&outcome);
    assert_eq!(rows_processed, 3);
    assert_eq!(rows_rejected, 1);

    // Rows committed with cleaned values and provenance.
    let rows = harness.store().fetch_for_source(&event.path_str()).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].student_id, 101);
    assert_eq!(rows[0].address, "12 Oak Ave");
    assert_eq!(rows[0].phone, "5550101234");
    assert_eq!(rows[1].admission_date.to_string(), "2024-01-16");

    // Original relocated, staging artifact cleaned up.
    assert!(!path.exists());
    let archived = harness.archived_files();
    assert_eq!(archived.len(), 1);
    assert!(archived[0].ends_with("_students.csv"));
    assert!(!harness
        .config
        .locations
        .staging_dir
        .join("students_cleaned.csv")
        .exists());

    // Ledger settled SUCCESS with the §6 bookkeeping filled in.
    let entry = harness.ledger().find(&event.path_str()).unwrap().unwrap();
    assert_eq!(entry.load_status, LoadStatus::Success);
    assert_eq!(entry.rows_processed, 3);
    assert!(entry.staging_file_path.is_some());
    assert!(entry.archive_file_path.is_some());
    assert_eq!(entry.error_message, None);
    assert_eq!(entry.last_modified, event.last_modified);

    // Exactly one notice for the settled invocation.
    let notices = harness.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].status, LoadStatus::Success);
    assert_eq!(notices[0].rows_processed, 3);
    assert_eq!(notices[0].rows_rejected, 1);
}

#[tokio::test]
async fn redelivery_of_a_settled_version_skips_without_side_effects() {
    let harness = Harness::new();
    let path = harness.write_incoming("students.csv", ROSTER_CSV);
    let event = FileEvent::from_path(&path).unwrap();

    harness.controller().process(&event).await.unwrap();
    let archived_before = harness.archived_files();

    // The trigger redelivers the identical event.
    let outcome = harness.controller().process(&event).await.unwrap();
    match outcome {
        InvocationOutcome::Skipped { reason } => assert!(reason.contains("not modified")),
        other => panic!("expected skip, got {other:?}"),
    }

    // No new rows, no second relocation, RowsProcessed preserved.
    assert_eq!(
        harness.store().count_for_source(&event.path_str()).await.unwrap(),
        3
    );
    assert_eq!(harness.archived_files(), archived_before);
    let entry = harness.ledger().find(&event.path_str()).unwrap().unwrap();
    assert_eq!(entry.load_status, LoadStatus::Skipped);
    assert_eq!(entry.rows_processed, 3);

    // The skip is a settled invocation of its own, so it notifies too.
    let notices = harness.notices();
    assert_eq!(notices.len(), 2);
    assert_eq!(notices[1].status, LoadStatus::Skipped);
}

#[tokio::test]
async fn a_newer_version_is_fully_reprocessed() {
    let harness = Harness::new();
    let path = harness.write_incoming("students.csv", ROSTER_CSV);
    let first = FileEvent::from_path(&path).unwrap();
    harness.controller().process(&first).await.unwrap();

    // The file is uploaded again with an extra row and a newer timestamp.
    let updated = format!("{ROSTER_CSV}105,Eve Green,90 Birch Ln,5550105678,2024-01-19\n");
    let path = harness.write_incoming("students.csv", &updated);
    let mut second = FileEvent::from_path(&path).unwrap();
    second.last_modified = first.last_modified + ChronoDuration::seconds(60);
    second.generation = second.last_modified.timestamp_millis();

    let outcome = harness.controller().process(&second).await.unwrap();
    let (rows_processed, _) = success(&outcome);
    assert_eq!(rows_processed, 4);

    // Append-only: both versions' rows coexist under one source path.
    assert_eq!(
        harness.store().count_for_source(&second.path_str()).await.unwrap(),
        7
    );
    let entry = harness.ledger().find(&second.path_str()).unwrap().unwrap();
    assert_eq!(entry.load_status, LoadStatus::Success);
    assert_eq!(entry.last_modified, second.last_modified);
    assert_eq!(entry.rows_processed, 4);
}

#[tokio::test]
async fn unparseable_dates_reject_rows_without_failing_the_file() {
    let harness = Harness::new();
    let path = harness.write_incoming(
        "roster.csv",
        "StudentID,StudentName,Address,Phone,AdmissionDate\n\
         1,Ann,,,2024-02-01\n\
         2,Ben,,,02/30/2024\n\
         3,Cam,,,not-a-date\n\
         4,Dee,,,2024-02-04\n",
    );
    let event = FileEvent::from_path(&path).unwrap();

    let outcome = harness.controller().process(&event).await.unwrap();
    let (rows_processed, rows_rejected) = success(&outcome);
    assert_eq!(rows_processed, 2);
    assert_eq!(rows_rejected, 2);
    assert_eq!(
        harness.store().count_for_source(&event.path_str()).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn reject_ratio_over_threshold_fails_the_file_in_place() {
    let mut harness = Harness::new();
    harness.config.policy.max_reject_ratio = 0.25;
    let path = harness.write_incoming(
        "roster.csv",
        "StudentID,StudentName,Address,Phone,AdmissionDate\n\
         1,Ann,,,2024-02-01\n\
         bad,Ben,,,2024-02-02\n",
    );
    let event = FileEvent::from_path(&path).unwrap();

    let outcome = harness.controller().process(&event).await.unwrap();
    match &outcome {
        InvocationOutcome::Failed { status, error } => {
            assert_eq!(*status, LoadStatus::Failed);
            assert!(error.contains("too many rejected rows"));
        }
        other => panic!("expected failure, got {other:?}"),
    }

    // Nothing committed, original untouched and retryable.
    assert_eq!(
        harness.store().count_for_source(&event.path_str()).await.unwrap(),
        0
    );
    assert!(path.exists());
    let entry = harness.ledger().find(&event.path_str()).unwrap().unwrap();
    assert_eq!(entry.load_status, LoadStatus::Failed);
    assert!(entry.error_message.unwrap().contains("too many rejected"));
    assert_eq!(harness.notices()[0].status, LoadStatus::Failed);
}

#[tokio::test]
async fn unsupported_extension_settles_failed() {
    let harness = Harness::new();
    let path = harness.write_incoming("roster.xlsx", "not really a spreadsheet");
    let event = FileEvent::from_path(&path).unwrap();

    let outcome = harness.controller().process(&event).await.unwrap();
    match &outcome {
        InvocationOutcome::Failed { status, error } => {
            assert_eq!(*status, LoadStatus::Failed);
            assert!(error.contains("xlsx"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(path.exists());
}

#[tokio::test]
async fn header_only_file_settles_success_with_zero_rows() {
    let harness = Harness::new();
    let path = harness.write_incoming(
        "empty.csv",
        "StudentID,StudentName,Address,Phone,AdmissionDate\n",
    );
    let event = FileEvent::from_path(&path).unwrap();

    let outcome = harness.controller().process(&event).await.unwrap();
    let (rows_processed, rows_rejected) = success(&outcome);
    assert_eq!(rows_processed, 0);
    assert_eq!(rows_rejected, 0);
    assert!(!path.exists(), "an empty load still archives the original");
    let entry = harness.ledger().find(&event.path_str()).unwrap().unwrap();
    assert_eq!(entry.load_status, LoadStatus::Success);
    assert_eq!(entry.rows_processed, 0);
}

#[tokio::test]
async fn exhausted_deadline_preempts_before_cleaning() {
    let mut harness = Harness::new();
    // Less budget than the cleaning floor requires.
    harness.config.policy.deadline_secs = 1;
    harness.config.policy.clean_budget_floor_secs = 30;
    let path = harness.write_incoming("students.csv", ROSTER_CSV);
    let event = FileEvent::from_path(&path).unwrap();

    let outcome = harness.controller().process(&event).await.unwrap();
    match &outcome {
        InvocationOutcome::Failed { status, error } => {
            assert_eq!(*status, LoadStatus::Failed);
            assert!(error.contains("deadline"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(path.exists());
    assert_eq!(
        harness.store().count_for_source(&event.path_str()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn retry_after_failed_relocation_never_double_appends() {
    let harness = Harness::new();
    let path = harness.write_incoming("students.csv", ROSTER_CSV);
    let event = FileEvent::from_path(&path).unwrap();

    // A file squatting on the archive directory path makes relocation fail
    // after the load has committed.
    fs::write(&harness.config.locations.archive_dir, "blocker").unwrap();

    let outcome = harness.controller().process(&event).await.unwrap();
    match &outcome {
        InvocationOutcome::Failed { status, .. } => {
            assert_eq!(*status, LoadStatus::LoadedPendingArchive)
        }
        other => panic!("expected relocation failure, got {other:?}"),
    }
    assert_eq!(
        harness.store().count_for_source(&event.path_str()).await.unwrap(),
        3,
        "rows committed before the relocation failure"
    );
    assert!(path.exists(), "original stays in incoming");
    let entry = harness.ledger().find(&event.path_str()).unwrap().unwrap();
    assert_eq!(entry.load_status, LoadStatus::LoadedPendingArchive);
    assert_eq!(entry.rows_processed, 3);

    // Redelivery after the obstruction clears finishes the job without
    // appending the batch a second time.
    fs::remove_file(&harness.config.locations.archive_dir).unwrap();
    let outcome = harness.controller().process(&event).await.unwrap();
    let (rows_processed, _) = success(&outcome);
    assert_eq!(rows_processed, 3);
    assert_eq!(
        harness.store().count_for_source(&event.path_str()).await.unwrap(),
        3,
        "retry must not double-append"
    );
    assert!(!path.exists());
    let entry = harness.ledger().find(&event.path_str()).unwrap().unwrap();
    assert_eq!(entry.load_status, LoadStatus::Success);
    assert_eq!(harness.archived_files().len(), 1);
}
