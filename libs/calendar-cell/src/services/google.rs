use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::models::{BusyInterval, CalendarError};
use crate::services::provider::CalendarProvider;

/// Google Calendar client covering the two surfaces the booking core needs:
/// the freeBusy query and event create/delete for mirroring appointments.
pub struct GoogleCalendarClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl GoogleCalendarClient {
    pub fn new(config: &AppConfig) -> Result<Self, CalendarError> {
        if !config.is_calendar_configured() {
            return Err(CalendarError::NotConfigured);
        }

        // The free/busy check sits on the booking hot path; a stalled
        // provider must time out rather than hold up the request.
        let client = Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.calendar_api_url.clone(),
            api_token: config.calendar_api_token.clone(),
        })
    }

    /// Each therapist's external calendar is addressed by a deterministic id.
    pub fn therapist_calendar_id(therapist_id: Uuid) -> String {
        format!("therapist-{}", therapist_id)
    }

    async fn check_response(response: reqwest::Response) -> Result<Value, CalendarError> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!("Calendar API error: {} - {}", status, text);
            return Err(CalendarError::ApiError {
                message: format!("HTTP {}: {}", status, text),
            });
        }

        serde_json::from_str(&text).map_err(|e| CalendarError::ApiError {
            message: format!("Failed to parse calendar response: {}", e),
        })
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendarClient {
    async fn busy_intervals(
        &self,
        therapist_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, CalendarError> {
        let calendar_id = Self::therapist_calendar_id(therapist_id);
        debug!(
            "Querying busy intervals for calendar {} between {} and {}",
            calendar_id, start, end
        );

        let url = format!("{}/freeBusy", self.base_url);
        let body = json!({
            "timeMin": start.to_rfc3339(),
            "timeMax": end.to_rfc3339(),
            "items": [{ "id": calendar_id }]
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_token))
            .json(&body)
            .send()
            .await?;

        let parsed = Self::check_response(response).await?;

        let busy = parsed["calendars"][&calendar_id]["busy"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let mut intervals = Vec::with_capacity(busy.len());
        for window in busy {
            let start_str = window.get("start").and_then(|v| v.as_str());
            let end_str = window.get("end").and_then(|v| v.as_str());
            if let (Some(start_str), Some(end_str)) = (start_str, end_str) {
                if let (Ok(s), Ok(e)) = (
                    DateTime::parse_from_rfc3339(start_str),
                    DateTime::parse_from_rfc3339(end_str),
                ) {
                    intervals.push(BusyInterval {
                        start: s.with_timezone(&Utc),
                        end: e.with_timezone(&Utc),
                        summary: window
                            .get("summary")
                            .and_then(|v| v.as_str())
                            .map(str::to_owned),
                    });
                }
            }
        }

        debug!("Found {} busy intervals for {}", intervals.len(), calendar_id);
        Ok(intervals)
    }

    async fn create_event(
        &self,
        calendar_id: &str,
        title: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<String, CalendarError> {
        info!("Creating calendar event on {} for {}", calendar_id, start);

        let url = format!("{}/calendars/{}/events", self.base_url, calendar_id);
        let body = json!({
            "summary": title,
            "start": { "dateTime": start.to_rfc3339() },
            "end": { "dateTime": end.to_rfc3339() }
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_token))
            .json(&body)
            .send()
            .await?;

        let parsed = Self::check_response(response).await?;

        parsed
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| CalendarError::ApiError {
                message: "Event response missing id".to_string(),
            })
    }

    async fn delete_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<bool, CalendarError> {
        info!("Deleting calendar event {} on {}", event_id, calendar_id);

        let url = format!(
            "{}/calendars/{}/events/{}",
            self.base_url, calendar_id, event_id
        );

        let response = self
            .client
            .delete(&url)
            .header("Authorization", format!("Bearer {}", self.api_token))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            // Already deleted upstream; the retraction is idempotent.
            return Ok(false);
        }

        let text = response.text().await.unwrap_or_default();
        error!("Calendar event deletion failed: {} - {}", status, text);
        Err(CalendarError::ApiError {
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
        config.calendar_api_token = String::new();

        let client = GoogleCalendarClient::new(&config);
        assert!(matches!(client, Err(CalendarError::NotConfigured)));
    }

    #[test]
    fn therapist_calendar_id_is_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(
            GoogleCalendarClient::therapist_calendar_id(id),
            GoogleCalendarClient::therapist_calendar_id(id)
        );
    }
}
