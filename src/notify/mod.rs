pub mod outbox;
pub mod webhook;

use crate::config::NotifyConfig;
use crate::domain::{AuditLogEntry, LoadStatus};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use outbox::OutboxNotifier;
pub use webhook::WebhookNotifier;

/// The terminal outcome of one settled invocation, as reported to operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleNotice {
    pub file_path: String,
    pub file_name: String,
    pub status: LoadStatus,
    pub rows_processed: i64,
    pub rows_rejected: i64,
    pub archive_file_path: Option<String>,
    pub error_message: Option<String>,
    pub processed_by: String,
    pub settled_at: DateTime<Utc>,
}

impl SettleNotice {
    /// Builds a notice from the settled ledger row plus the reject tally,
    /// which the ledger does not carry.
    pub fn from_entry(entry: &AuditLogEntry, rows_rejected: i64) -> Self {
        Self {
            file_path: entry.file_path.clone(),
            file_name: entry.file_name.clone(),
            status: entry.load_status,
            rows_processed: entry.rows_processed,
            rows_rejected,
            archive_file_path: entry.archive_file_path.clone(),
            error_message: entry.error_message.clone(),
            processed_by: entry.processed_by.clone(),
            settled_at: entry.updated_at,
        }
    }
}

/// A sink for settle notices. One notice is sent per settled invocation;
/// claim conflicts never settle and never notify.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &SettleNotice) -> Result<()>;
}

/// Fans a notice out to every configured sink.
///
/// The structured log line is always emitted. Sink failures are reported
/// back to the caller so they can be counted, but every sink is still
/// attempted; a dead webhook does not starve the outbox.
pub struct CompositeNotifier {
    sinks: Vec<Box<dyn Notifier>>,
}

impl CompositeNotifier {
    pub fn new(sinks: Vec<Box<dyn Notifier>>) -> Self {
        Self { sinks }
    }

    pub fn from_config(config: &NotifyConfig) -> Self {
        let mut sinks: Vec<Box<dyn Notifier>> =
            vec![Box::new(OutboxNotifier::new(config.outbox_path.clone()))];
        if let Some(url) = &config.webhook_url {
            sinks.push(Box::new(WebhookNotifier::new(
                url.clone(),
                config.webhook_timeout_secs,
            )));
        }
        Self::new(sinks)
    }
}

#[async_trait]
impl Notifier for CompositeNotifier {
    async fn notify(&self, notice: &SettleNotice) -> Result<()> {
        info!(
            path = %notice.file_path,
            status = %notice.status,
            rows_processed = notice.rows_processed,
            rows_rejected = notice.rows_rejected,
            error = notice.error_message.as_deref().unwrap_or(""),
            "invocation settled"
        );
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.notify(notice).await {
                warn!(path = %notice.file_path, error = %e, "notification sink failed");
                failures.push(e.to_string());
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Notify(failures.join("; ")))
        }
    }
}
