use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use calendar_cell::CalendarProvider;
use shared_database::PostgrestClient;

use crate::models::{
    Appointment, CalendarBlock, ConflictResult, ConflictType, SchedulingError,
};

/// Answers "is this interval free for this therapist?" by consulting three
/// independent sources in order of authority: persisted appointments, admin
/// calendar blocks, then the external calendar's busy windows.
///
/// The first two sources are authoritative and hard-fail; the external
/// calendar is advisory, and an outage there is treated as "assume
/// available" with a warning rather than freezing bookings.
pub struct ConflictOracle {
    storage: Arc<PostgrestClient>,
    calendar: Arc<dyn CalendarProvider>,
}

impl ConflictOracle {
    pub fn new(storage: Arc<PostgrestClient>, calendar: Arc<dyn CalendarProvider>) -> Self {
        Self { storage, calendar }
    }

    /// Returns None when the interval is free. A Some result is a normal
    /// outcome, not an error; only infrastructure failures raise.
    pub async fn check_conflict(
        &self,
        therapist_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<ConflictResult>, SchedulingError> {
        debug!(
            "Checking conflicts for therapist {} from {} to {}",
            therapist_id, start, end
        );

        // 1. Persisted appointments: cheapest and most authoritative.
        let appointments = self
            .overlapping_appointments(therapist_id, start, end)
            .await?;
        if let Some(existing) = appointments.first() {
            warn!(
                "Appointment conflict for therapist {}: existing appointment {}",
                therapist_id, existing.id
            );
            return Ok(Some(ConflictResult {
                conflict_type: ConflictType::AppointmentConflict,
                message: format!(
                    "Therapist already has an appointment from {} to {}",
                    existing.scheduled_at, existing.end_time
                ),
                conflicting_id: Some(existing.id.to_string()),
            }));
        }

        // 2. Admin-declared calendar blocks.
        let blocks = self.overlapping_blocks(start, end).await?;
        if let Some(block) = blocks.first() {
            return Ok(Some(ConflictResult {
                conflict_type: ConflictType::CalendarBlock,
                message: format!(
                    "The slot is blocked by \"{}\" ({} to {})",
                    block.title, block.start_time, block.end_time
                ),
                conflicting_id: Some(block.id.to_string()),
            }));
        }

        // 3. External calendar busy windows, last and soft-fail-open: an
        // outage at the third party must not freeze the whole platform.
        match self.calendar.busy_intervals(therapist_id, start, end).await {
            Ok(busy) => {
                if let Some(window) = busy.iter().find(|b| b.overlaps(start, end)) {
                    return Ok(Some(ConflictResult {
                        conflict_type: ConflictType::TherapistCalendarBusy,
                        message: format!(
                            "Therapist's external calendar is busy from {} to {}",
                            window.start, window.end
                        ),
                        conflicting_id: window.summary.clone(),
                    }));
                }
            }
            Err(e) => {
                warn!(
                    "External calendar check failed for therapist {}, assuming available: {}",
                    therapist_id, e
                );
            }
        }

        Ok(None)
    }

    async fn overlapping_appointments(
        &self,
        therapist_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let start_str = start.to_rfc3339();
        let end_str = end.to_rfc3339();
        let path = format!(
            "/rest/v1/appointments?primary_therapist_id=eq.{}&status=neq.cancelled&is_archived=eq.false&scheduled_at=lt.{}&end_time=gt.{}&order=scheduled_at.asc",
            therapist_id,
            urlencoding::encode(&end_str),
            urlencoding::encode(&start_str),
        );

        let result: Vec<Value> = self
            .storage
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        let appointments: Vec<Appointment> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| {
                SchedulingError::Database(format!("Failed to parse appointments: {}", e))
            })?;

        // The range query is inclusive at the edges; re-apply the half-open
        // overlap and status predicates in code.
        Ok(appointments
            .into_iter()
            .filter(|a| a.blocks_schedule() && intervals_overlap(a.scheduled_at, a.end_time, start, end))
            .collect())
    }

    async fn overlapping_blocks(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarBlock>, SchedulingError> {
        let start_str = start.to_rfc3339();
        let end_str = end.to_rfc3339();
        let path = format!(
            "/rest/v1/calendar_blocks?block_type=in.(booked,blocked,unavailable)&start_time=lt.{}&end_time=gt.{}&order=start_time.asc",
            urlencoding::encode(&end_str),
            urlencoding::encode(&start_str),
        );

        let result: Vec<Value> = self
            .storage
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        let blocks: Vec<CalendarBlock> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<CalendarBlock>, _>>()
            .map_err(|e| {
                SchedulingError::Database(format!("Failed to parse calendar blocks: {}", e))
            })?;

        Ok(blocks
            .into_iter()
            .filter(|b| intervals_overlap(b.start_time, b.end_time, start, end))
            .collect())
    }
}

/// Half-open interval overlap: [start1, end1) intersects [start2, end2).
pub fn intervals_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}
