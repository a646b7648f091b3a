use crate::error::{PipelineError, Result};
use crate::notify::{Notifier, SettleNotice};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// POSTs each settle notice as JSON to an operator-configured endpoint.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self { url, client }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notice: &SettleNotice) -> Result<()> {
        let response = self.client.post(&self.url).json(notice).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Notify(format!(
                "webhook {} answered {status}",
                self.url
            )));
        }
        debug!(url = %self.url, status = %status, "notice delivered to webhook");
        Ok(())
    }
}
