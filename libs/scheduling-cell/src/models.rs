// libs/scheduling-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_database::StorageError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub primary_therapist_id: Uuid,
    pub client_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub session_type: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub notes: Option<String>,
    pub meeting_url: Option<String>,
    pub meeting_provider_room_id: Option<String>,
    pub external_calendar_event_id: Option<String>,
    pub is_archived: bool,
    pub idempotency_key: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Counts toward the therapist's no-overlap invariant.
    pub fn blocks_schedule(&self) -> bool {
        self.status != AppointmentStatus::Cancelled && !self.is_archived
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

/// Administrator-declared busy window, independent of any appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarBlock {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub block_type: BlockType,
    pub title: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Booked,
    Blocked,
    Unavailable,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSessionRequest {
    pub therapist_id: Uuid,
    pub client_id: Option<Uuid>,
    /// Calendar date in the service's home timezone, "YYYY-MM-DD".
    pub date: NaiveDate,
    /// Wall-clock time in the home timezone, "HH:MM".
    pub time: String,
    pub duration_minutes: i32,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub session_type: String,
    pub notes: Option<String>,
    pub booked_by: String,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentSearchQuery {
    pub therapist_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

// ==============================================================================
// CONFLICT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    TherapistCalendarBusy,
    AppointmentConflict,
    CalendarBlock,
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictType::TherapistCalendarBusy => write!(f, "therapist_calendar_busy"),
            ConflictType::AppointmentConflict => write!(f, "appointment_conflict"),
            ConflictType::CalendarBlock => write!(f, "calendar_block"),
        }
    }
}

/// Structured reason a proposed interval is not free. A conflict is a normal
/// return value of the oracle, never an infrastructure failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResult {
    pub conflict_type: ConflictType,
    pub message: String,
    pub conflicting_id: Option<String>,
}

// ==============================================================================
// SESSION ROUTING
// ==============================================================================

/// Which calendar/meeting-provider pairing handles a booking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionRoute {
    /// Admin-shared calendar with a generic meeting link (intake-style calls).
    AdminOnboarding,
    /// The therapist's own calendar with a dedicated video room.
    TherapistOwned,
}

/// Keyword vocabulary deciding which session types route to the admin-shared
/// calendar. Explicit configuration rather than inline literals so the
/// classification is independently testable and extensible.
#[derive(Debug, Clone)]
pub struct RoutingVocabulary {
    pub admin_keywords: Vec<String>,
}

impl Default for RoutingVocabulary {
    fn default() -> Self {
        Self {
            admin_keywords: vec![
                "consultation".to_string(),
                "introduction".to_string(),
                "assessment".to_string(),
                "intake".to_string(),
                "onboarding".to_string(),
                "discovery".to_string(),
            ],
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("Invalid local time: {0}")]
    InvalidLocalTime(String),

    #[error("Booking conflict: {}", .0.message)]
    ConflictDetected(ConflictResult),

    /// The storage exclusion constraint fired despite a clean conflict check:
    /// a concurrent booking won the race.
    #[error("Appointment overlaps an existing booking")]
    AppointmentOverlap,

    #[error("Meeting room provisioning failed: {0}")]
    RoomProvisioning(String),

    #[error("Appointment not found")]
    NotFound,

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("External service error: {0}")]
    ExternalService(String),
}

impl From<StorageError> for SchedulingError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::ExclusionViolation { .. } => SchedulingError::AppointmentOverlap,
            StorageError::NotFound(_) => SchedulingError::NotFound,
            other => SchedulingError::Database(other.to_string()),
        }
    }
}
