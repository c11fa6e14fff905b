use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payloads for the fire-and-forget notification dispatcher. Template
/// rendering and delivery live with the external email service; only the
/// booking facts travel from here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    BookingConfirmed {
        appointment_id: Uuid,
        therapist_id: Uuid,
        client_name: String,
        client_email: String,
        scheduled_at: DateTime<Utc>,
        duration_minutes: i32,
        session_type: String,
        meeting_url: Option<String>,
    },
    BookingCancelled {
        appointment_id: Uuid,
        therapist_id: Uuid,
        client_email: Option<String>,
        scheduled_at: DateTime<Utc>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification service not configured")]
    NotConfigured,

    #[error("Notification API error: {message}")]
    ApiError { message: String },

    #[error("Notification transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
