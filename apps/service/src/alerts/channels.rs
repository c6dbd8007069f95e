use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::NotifyError;

/// A transport that delivers alert messages
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Desktop toast stand-in: writes the alert to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        warn!(subject, body, "ALERT");
        Ok(())
    }
}

/// Default bound on one webhook request
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts alerts as JSON to a webhook URL.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), client: reqwest::Client::new(), timeout: WEBHOOK_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let payload = serde_json::json!({
            "title": subject,
            "body": body,
            "text": format!("{subject}\n{body}"),
        });

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(format!("Webhook request failed: {}", e)))?;

        if response.status().is_success() {
            debug!("Webhook alert sent successfully");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::Delivery(format!("Webhook returned {}: {}", status, body)))
        }
    }
}
