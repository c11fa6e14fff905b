use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;

/// Test configuration pointing every provider at local mock servers.
pub struct TestConfig {
    pub storage_url: String,
    pub daily_base_url: String,
    pub calendar_api_url: String,
    pub notify_url: String,
    pub home_timezone: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            storage_url: "http://localhost:54321".to_string(),
            daily_base_url: "http://localhost:54322".to_string(),
            calendar_api_url: "http://localhost:54323".to_string(),
            notify_url: "http://localhost:54324".to_string(),
            home_timezone: "Europe/London".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_storage_url(mut self, url: &str) -> Self {
        self.storage_url = url.to_string();
        self
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            storage_url: self.storage_url.clone(),
            storage_service_key: "test-service-key".to_string(),
            daily_api_key: "test-daily-key".to_string(),
            daily_base_url: self.daily_base_url.clone(),
            calendar_api_url: self.calendar_api_url.clone(),
            calendar_api_token: "test-calendar-token".to_string(),
            admin_calendar_id: "admin-shared-calendar".to_string(),
            secondary_calendar_id: "secondary-calendar".to_string(),
            admin_meeting_url: "https://meet.example.com/intake".to_string(),
            notify_url: self.notify_url.clone(),
            notify_api_key: "test-notify-key".to_string(),
            home_timezone: self.home_timezone.clone(),
            provider_timeout_secs: 2,
        }
    }
}

/// Canned PostgREST response bodies used by wiremock-backed tests.
pub struct MockStorageResponses;

impl MockStorageResponses {
    pub fn appointment_row(
        id: Uuid,
        therapist_id: Uuid,
        scheduled_at: DateTime<Utc>,
        end_time: DateTime<Utc>,
        status: &str,
    ) -> Value {
        json!({
            "id": id,
            "primary_therapist_id": therapist_id,
            "client_id": null,
            "scheduled_at": scheduled_at.to_rfc3339(),
            "end_time": end_time.to_rfc3339(),
            "duration_minutes": (end_time - scheduled_at).num_minutes(),
            "status": status,
            "session_type": "Therapy Session",
            "client_name": "Test Client",
            "client_email": "client@example.com",
            "client_phone": null,
            "notes": null,
            "meeting_url": "https://rooms.example.com/test",
            "meeting_provider_room_id": "room-test",
            "external_calendar_event_id": null,
            "is_archived": false,
            "idempotency_key": null,
            "created_by": "test",
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        })
    }

    pub fn calendar_block_row(
        id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        block_type: &str,
        title: &str,
    ) -> Value {
        json!({
            "id": id,
            "start_time": start_time.to_rfc3339(),
            "end_time": end_time.to_rfc3339(),
            "block_type": block_type,
            "title": title
        })
    }

    pub fn webhook_event_row(
        id: Uuid,
        provider_event_id: &str,
        status: &str,
        created_appointment_id: Option<Uuid>,
    ) -> Value {
        json!({
            "id": id,
            "provider_event_id": provider_event_id,
            "event_type": "checkout.completed",
            "raw_payload": {},
            "processing_status": status,
            "attempt_count": 1,
            "created_appointment_id": created_appointment_id,
            "error_message": null,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339(),
            "completed_at": null
        })
    }

    pub fn exclusion_violation_body() -> Value {
        json!({
            "code": "23P01",
            "message": "conflicting key value violates exclusion constraint \"appointments_no_overlap\""
        })
    }

    pub fn unique_violation_body() -> Value {
        json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"webhook_events_provider_event_id_key\""
        })
    }

    pub fn daily_room(name: &str) -> Value {
        json!({
            "id": format!("room-{}", name),
            "name": name,
            "url": format!("https://rooms.daily.co/{}", name),
            "privacy": "private"
        })
    }
}
