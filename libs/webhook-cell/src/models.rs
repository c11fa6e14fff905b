// libs/webhook-cell/src/models.rs
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use shared_database::StorageError;

// ==============================================================================
// LEDGER MODELS
// ==============================================================================

/// Durable record of one inbound payment-provider callback. The unique
/// provider_event_id index on this table is the concurrency gate that makes
/// at-least-once delivery safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub provider_event_id: String,
    pub event_type: String,
    pub raw_payload: Value,
    pub processing_status: ProcessingStatus,
    pub attempt_count: i32,
    pub created_appointment_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingStatus::Pending => write!(f, "pending"),
            ProcessingStatus::Processing => write!(f, "processing"),
            ProcessingStatus::Completed => write!(f, "completed"),
            ProcessingStatus::Failed => write!(f, "failed"),
        }
    }
}

// ==============================================================================
// BOOKING INTENT
// ==============================================================================

/// Validated booking intent extracted from a webhook's metadata bag.
/// Parsing fails closed: a missing or malformed required field rejects the
/// whole event rather than booking from partial data.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingIntent {
    pub therapist_id: Uuid,
    pub client_id: Option<Uuid>,
    /// Wall-clock time in the service's home timezone, from the provider's
    /// "YYYY-MM-DDTHH:MM" metadata format.
    pub scheduled_at: NaiveDateTime,
    pub duration_minutes: i32,
    pub session_type: String,
    pub client_name: String,
    pub client_email: String,
    /// Pre-assigned appointment to confirm instead of booking a new one.
    pub appointment_id: Option<Uuid>,
}

impl BookingIntent {
    pub fn from_metadata(metadata: &Value) -> Result<Self, WebhookError> {
        let therapist_id = required_uuid(metadata, "therapist_id")?;
        let scheduled_at_raw = required_str(metadata, "scheduled_at")?;
        let scheduled_at = NaiveDateTime::parse_from_str(scheduled_at_raw, "%Y-%m-%dT%H:%M")
            .or_else(|_| NaiveDateTime::parse_from_str(scheduled_at_raw, "%Y-%m-%dT%H:%M:%S"))
            .map_err(|_| WebhookError::MalformedMetadata(format!(
                "scheduled_at '{}' is not a local YYYY-MM-DDTHH:MM timestamp",
                scheduled_at_raw
            )))?;

        let duration_minutes = metadata
            .get("duration")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| {
                WebhookError::MalformedMetadata("missing or non-numeric duration".to_string())
            })? as i32;

        Ok(Self {
            therapist_id,
            client_id: optional_uuid(metadata, "client_id")?,
            scheduled_at,
            duration_minutes,
            session_type: required_str(metadata, "session_type")?.to_string(),
            client_name: required_str(metadata, "client_name")?.to_string(),
            client_email: required_str(metadata, "client_email")?.to_string(),
            appointment_id: optional_uuid(metadata, "appointment_id")?,
        })
    }
}

fn required_str<'a>(metadata: &'a Value, field: &str) -> Result<&'a str, WebhookError> {
    metadata
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| WebhookError::MalformedMetadata(format!("missing field {}", field)))
}

fn required_uuid(metadata: &Value, field: &str) -> Result<Uuid, WebhookError> {
    let raw = required_str(metadata, field)?;
    Uuid::parse_str(raw)
        .map_err(|_| WebhookError::MalformedMetadata(format!("{} is not a valid uuid", field)))
}

fn optional_uuid(metadata: &Value, field: &str) -> Result<Option<Uuid>, WebhookError> {
    match metadata.get(field).and_then(|v| v.as_str()) {
        Some(raw) if !raw.trim().is_empty() => Uuid::parse_str(raw)
            .map(Some)
            .map_err(|_| WebhookError::MalformedMetadata(format!("{} is not a valid uuid", field))),
        _ => Ok(None),
    }
}

// ==============================================================================
// PROCESSING OUTCOMES
// ==============================================================================

/// Result of driving one webhook event through the processor. Conflicts,
/// malformed metadata and booking failures land here rather than as raised
/// errors so the provider's retry loop is not spammed with 5xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub success: bool,
    pub already_processed: bool,
    pub appointment_id: Option<Uuid>,
    pub errors: Vec<String>,
}

impl ProcessOutcome {
    pub fn completed(appointment_id: Option<Uuid>) -> Self {
        Self {
            success: true,
            already_processed: false,
            appointment_id,
            errors: Vec::new(),
        }
    }

    pub fn already_processed(appointment_id: Option<Uuid>) -> Self {
        Self {
            success: true,
            already_processed: true,
            appointment_id,
            errors: Vec::new(),
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            already_processed: false,
            appointment_id: None,
            errors: vec![error],
        }
    }
}

/// Per-entry line in a reprocessing batch report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReprocessItem {
    pub ledger_id: Uuid,
    pub provider_event_id: Option<String>,
    pub outcome: Option<ProcessOutcome>,
    pub error: Option<String>,
    /// Re-read from the ledger after the batch, during the verification pass.
    pub verified_status: Option<ProcessingStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReprocessReport {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<ReprocessItem>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// Top-level envelope is unusable (no event id); raised so the provider
    /// retries, since no ledger row can even be written.
    #[error("Malformed webhook envelope: {0}")]
    MalformedEnvelope(String),

    /// Booking intent could not be parsed from metadata. Captured into the
    /// failed ledger state, never raised past the processor.
    #[error("Malformed webhook metadata: {0}")]
    MalformedMetadata(String),

    /// Another process claimed this provider_event_id first.
    #[error("Event is already claimed by another processor")]
    LedgerConflict,

    #[error("Ledger entry not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),
}

impl From<StorageError> for WebhookError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::UniqueViolation { .. } => WebhookError::LedgerConflict,
            StorageError::NotFound(_) => WebhookError::NotFound,
            other => WebhookError::Database(other.to_string()),
        }
    }
}
