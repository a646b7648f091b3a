use clap::{Parser, Subcommand};
use roster_ingest::config::Config;
use roster_ingest::controller::{IngestionController, InvocationOutcome};
use roster_ingest::domain::LoadStatus;
use roster_ingest::event::FileEvent;
use roster_ingest::ledger::{AuditLedger, SqliteLedger};
use roster_ingest::{logging, observability};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "roster_ingest")]
#[command(about = "Student roster file ingestion pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the configuration file (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a single file as one invocation
    Process {
        /// The file to ingest
        #[arg(long)]
        path: PathBuf,
    },
    /// Scan the incoming location and process every eligible file
    Sweep,
    /// Print audit ledger entries as JSON lines, newest first
    History {
        /// Only the entry for this file path
        #[arg(long)]
        path: Option<PathBuf>,
        /// Maximum number of entries to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Filter by load status (PENDING, SUCCESS, SKIPPED, FAILED,
        /// LOADED_PENDING_ARCHIVE)
        #[arg(long)]
        status: Option<LoadStatus>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging(Path::new("logs"));
    if let Err(e) = observability::init() {
        warn!("Metrics recorder not installed: {}", e);
    }

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Process { path } => {
            let event = FileEvent::from_path(&path)?;
            let mut controller = IngestionController::from_config(&config)?;
            let outcome = controller.process(&event).await?;
            let failed = outcome.is_failure();
            report_outcome(&event, &outcome);
            if failed {
                std::process::exit(1);
            }
        }
        Commands::Sweep => {
            let incoming = &config.locations.incoming_dir;
            println!("🔍 Sweeping {}...", incoming.display());
            let mut events = Vec::new();
            if incoming.is_dir() {
                for dir_entry in std::fs::read_dir(incoming)? {
                    let path = dir_entry?.path();
                    if !path.is_file() {
                        continue;
                    }
                    match FileEvent::from_path(&path) {
                        Ok(event) if event.is_eligible() => events.push(event),
                        Ok(event) => {
                            info!(path = %event.path_str(), "ignoring ineligible file")
                        }
                        Err(e) => warn!(path = %path.display(), error = %e, "could not stat file"),
                    }
                }
            }
            events.sort_by(|a, b| a.file_name.cmp(&b.file_name));
            println!("   {} eligible file(s) found", events.len());

            let mut failures = 0;
            for event in &events {
                // Each file is its own independent invocation.
                let mut controller = IngestionController::from_config(&config)?;
                match controller.process(event).await {
                    Ok(outcome) => {
                        if outcome.is_failure() {
                            failures += 1;
                        }
                        report_outcome(event, &outcome);
                    }
                    Err(e) => {
                        failures += 1;
                        error!(path = %event.path_str(), error = %e, "invocation aborted");
                        println!("❌ {}: {}", event.file_name, e);
                    }
                }
            }
            if failures > 0 {
                println!("⚠️  {failures} invocation(s) failed");
                std::process::exit(1);
            }
        }
        Commands::History {
            path,
            limit,
            status,
        } => {
            let ledger = SqliteLedger::open(
                &config.warehouse.db_path,
                Duration::from_millis(config.warehouse.busy_timeout_ms),
            )?;
            match path {
                Some(path) => {
                    // Prefer the canonical spelling the ledger was keyed on.
                    let key = std::fs::canonicalize(&path)
                        .unwrap_or(path)
                        .to_string_lossy()
                        .to_string();
                    match ledger.find(&key)? {
                        Some(entry) => println!("{}", serde_json::to_string(&entry)?),
                        None => println!("No ledger entry for {key}"),
                    }
                }
                None => {
                    for entry in ledger.history(limit, status)? {
                        println!("{}", serde_json::to_string(&entry)?);
                    }
                }
            }
        }
    }
    Ok(())
}

fn report_outcome(event: &FileEvent, outcome: &InvocationOutcome) {
    match outcome {
        InvocationOutcome::Success {
            rows_processed,
            rows_rejected,
            archive_file_path,
        } => {
            println!("✅ {}: {} row(s) loaded", event.file_name, rows_processed);
            if *rows_rejected > 0 {
                println!("   {rows_rejected} row(s) rejected");
            }
            println!("   Archived to {archive_file_path}");
        }
        InvocationOutcome::Skipped { reason } => {
            println!("⏭️  {}: skipped ({reason})", event.file_name);
        }
        InvocationOutcome::Failed { status, error } => {
            println!("❌ {}: {status}: {error}", event.file_name);
        }
        InvocationOutcome::ClaimConflict { holder } => {
            println!(
                "⏳ {}: already being processed by {holder}",
                event.file_name
            );
        }
    }
}
