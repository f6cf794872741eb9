use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::Notifier;
use crate::error::NotifyError;

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
}

/// POSTs `{"subject": ..., "body": ...}` as JSON to a fixed URL.
pub struct WebhookNotifier {
    // ---
    client: Client,
    url: String,
}

impl WebhookNotifier {
    // ---
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NotifyError::InvalidConfig(format!(
                "webhook url must be http(s): {url}"
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn kind(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        // ---
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { subject, body })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}
