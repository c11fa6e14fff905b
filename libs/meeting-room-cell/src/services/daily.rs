use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;

use crate::models::{MeetingRoom, RoomError, RoomPrivacy};
use crate::services::provider::RoomProvider;

/// Daily.co REST client for managing per-appointment video rooms.
/// Rooms are keyed by a deterministic name derived from the booking id, so
/// provisioning stays idempotent under webhook redelivery.
pub struct DailyRoomClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl DailyRoomClient {
    pub fn new(config: &AppConfig) -> Result<Self, RoomError> {
        if !config.is_meeting_rooms_configured() {
            return Err(RoomError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.daily_base_url.clone(),
            api_key: config.daily_api_key.clone(),
        })
    }

    fn parse_room(value: &Value) -> Result<MeetingRoom, RoomError> {
        let room: MeetingRoom =
            serde_json::from_value(value.clone()).map_err(|e| RoomError::ApiError {
                message: format!("Failed to parse room response: {}", e),
            })?;
        Ok(room)
    }

    async fn create_room(
        &self,
        name: &str,
        scheduled_at: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<MeetingRoom, RoomError> {
        info!("Creating meeting room {}", name);

        let url = format!("{}/rooms", self.base_url);
        // Rooms open shortly before the session and expire after it, with
        // slack for overrun.
        let not_before = scheduled_at - chrono::Duration::minutes(15);
        let expires = scheduled_at + chrono::Duration::minutes(duration_minutes as i64 + 60);

        let body = json!({
            "name": name,
            "privacy": RoomPrivacy::Private.to_string(),
            "properties": {
                "nbf": not_before.timestamp(),
                "exp": expires.timestamp(),
                "enable_prejoin_ui": true,
                "eject_at_room_exp": true
            }
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!("Room creation failed: {} - {}", status, text);
            return Err(RoomError::ApiError {
                message: format!("HTTP {}: {}", status, text),
            });
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| RoomError::ApiError {
            message: format!("Failed to parse room response: {}", e),
        })?;

        let room = Self::parse_room(&parsed)?;
        info!("Created meeting room {} at {}", room.name, room.url);
        Ok(room)
    }
}

#[async_trait]
impl RoomProvider for DailyRoomClient {
    async fn ensure_room(
        &self,
        name: &str,
        scheduled_at: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<MeetingRoom, RoomError> {
        if let Some(existing) = self.get_room(name).await? {
            if existing.privacy == RoomPrivacy::Private {
                debug!("Reusing existing meeting room {}", name);
                return Ok(existing);
            }
            // Wrong visibility: tear down and recreate rather than exposing
            // a session through a public room.
            warn!(
                "Meeting room {} exists with privacy {}, recreating",
                name, existing.privacy
            );
            self.delete_room(name).await?;
        }

        self.create_room(name, scheduled_at, duration_minutes).await
    }

    async fn get_room(&self, name: &str) -> Result<Option<MeetingRoom>, RoomError> {
        let url = format!("{}/rooms/{}", self.base_url, name);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let text = response.text().await?;
        if !status.is_success() {
            error!("Room lookup failed: {} - {}", status, text);
            return Err(RoomError::ApiError {
                message: format!("HTTP {}: {}", status, text),
            });
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| RoomError::ApiError {
            message: format!("Failed to parse room response: {}", e),
        })?;

        Ok(Some(Self::parse_room(&parsed)?))
    }

    async fn delete_room(&self, name: &str) -> Result<bool, RoomError> {
        info!("Deleting meeting room {}", name);

        let url = format!("{}/rooms/{}", self.base_url, name);

        let response = self
            .client
            .delete(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }

        let text = response.text().await.unwrap_or_default();
        error!("Room deletion failed: {} - {}", status, text);
        Err(RoomError::ApiError {
            message: format!("HTTP {}: {}", status, text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_utils::test_utils::TestConfig;

    #[test]
    fn client_creation_fails_without_config() {
        let mut config = TestConfig::default().to_app_config();
        config.daily_api_key = String::new();

        let client = DailyRoomClient::new(&config);
        assert!(matches!(client, Err(RoomError::NotConfigured)));
    }

    #[test]
    fn client_creation_succeeds_with_config() {
        let config = TestConfig::default().to_app_config();
        assert!(DailyRoomClient::new(&config).is_ok());
    }
}
