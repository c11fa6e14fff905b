use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{BusyInterval, CalendarError};

/// Port for the external calendar collaborator. The conflict oracle reads
/// busy windows through it; the booking orchestrator mirrors appointments
/// into calendar events best-effort.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Busy windows for a therapist inside [start, end).
    async fn busy_intervals(
        &self,
        therapist_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, CalendarError>;

    /// Create an event on a calendar, returning the provider event id.
    async fn create_event(
        &self,
        calendar_id: &str,
        title: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<String, CalendarError>;

    /// Delete an event. Returns false when the event was already gone.
    async fn delete_event(&self, calendar_id: &str, event_id: &str)
        -> Result<bool, CalendarError>;
}
