use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::models::{Notice, NotifyError};
use crate::services::provider::NotificationDispatcher;

/// HTTP client for the notification service. One POST per notice; the
/// service fans out to client/therapist/admin templates on its side.
pub struct HttpMailer {
    client: Client,
    notify_url: String,
    api_key: String,
}

impl HttpMailer {
    pub fn new(config: &AppConfig) -> Result<Self, NotifyError> {
        if !config.is_notifications_configured() {
            return Err(NotifyError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            notify_url: config.notify_url.clone(),
            api_key: config.notify_api_key.clone(),
        })
    }
}

#[async_trait]
impl NotificationDispatcher for HttpMailer {
    async fn dispatch(&self, notice: &Notice) -> Result<(), NotifyError> {
        let url = format!("{}/messages", self.notify_url);
        debug!("Dispatching notification to {}", url);

        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .json(notice)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Notification dispatch failed: {} - {}", status, text);
            return Err(NotifyError::ApiError {
                message: format!("HTTP {}: {}", status, text),
            });
        }

        Ok(())
    }
}
