use crate::error::Result;
use crate::notify::{Notifier, SettleNotice};
use async_trait::async_trait;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

/// Appends one JSON line per settled invocation to a local outbox file,
/// giving operators a durable, greppable trail next to the data.
pub struct OutboxNotifier {
    path: PathBuf,
}

impl OutboxNotifier {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn notify(&self, notice: &SettleNotice) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(notice)?;
        writeln!(file, "{line}")?;
        debug!(path = %self.path.display(), bytes = line.len(), "notice appended to outbox");
        Ok(())
    }
}
