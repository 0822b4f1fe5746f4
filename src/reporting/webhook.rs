use std::time::Duration;

use serde_json::json;
use tracing::debug;

use super::formatter::{split_message, MESSAGE_LIMIT};
use crate::config::redact_secrets;
use crate::errors::CachesnakeError;

/// Posts `{"content": ...}` messages to a chat webhook (Discord-compatible).
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, CachesnakeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CachesnakeError::Config(format!("Failed to build webhook client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Send `text`, split into as many messages as the size limit requires.
    pub async fn send(&self, text: &str) -> Result<(), CachesnakeError> {
        for piece in split_message(text, MESSAGE_LIMIT - 6) {
            self.post(&format!("```{piece}```")).await?;
        }
        Ok(())
    }

    async fn post(&self, content: &str) -> Result<(), CachesnakeError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({ "content": content }))
            .send()
            .await
            .map_err(|e| self.error(format!("webhook request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(self.error(format!("webhook returned {status}")));
        }
        debug!(bytes = content.len(), "Webhook message delivered");
        Ok(())
    }

    /// Webhook URLs embed their token, keep it out of logs.
    fn error(&self, msg: String) -> CachesnakeError {
        CachesnakeError::Notification(redact_secrets(&msg, &[&self.url]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_redacts_url() {
        let notifier = WebhookNotifier::new("https://discord.com/api/webhooks/1/T0K3N").unwrap();
        let err = notifier.error("error sending request for url (https://discord.com/api/webhooks/1/T0K3N)".into());
        assert!(!err.to_string().contains("T0K3N"));
        assert_eq!(err.classify().error_type, "NotificationError");
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_notification_error() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook").unwrap();
        let err = notifier.send("hello").await.unwrap_err();
        assert!(matches!(err, CachesnakeError::Notification(_)));
    }
}
