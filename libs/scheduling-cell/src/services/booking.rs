// libs/scheduling-cell/src/services/booking.rs
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use calendar_cell::{CalendarProvider, GoogleCalendarClient};
use meeting_room_cell::RoomProvider;
use notification_cell::{Notice, NotificationDispatcher};
use shared_config::AppConfig;
use shared_database::{PostgrestClient, StorageError};

use crate::models::{
    Appointment, AppointmentSearchQuery, AppointmentStatus, BookSessionRequest, ConflictResult,
    RoutingVocabulary, SchedulingError, SessionRoute,
};
use crate::services::conflict::ConflictOracle;
use crate::services::lifecycle;
use crate::services::routing::classify_session;
use crate::services::time_model::TimeModel;

const MIN_SESSION_MINUTES: i32 = 15;
const MAX_SESSION_MINUTES: i32 = 240;

/// The authoritative state machine turning a booking request into a
/// confirmed, non-conflicting appointment with a working meeting room.
///
/// The conflict check runs before any external side effect, so a rejected
/// booking leaves no orphaned rooms. The storage exclusion constraint stays
/// the final authority: a clean check followed by an exclusion violation
/// means a concurrent booking won the race.
pub struct BookingOrchestrator {
    storage: Arc<PostgrestClient>,
    time_model: TimeModel,
    conflict_oracle: ConflictOracle,
    rooms: Arc<dyn RoomProvider>,
    calendar: Arc<dyn CalendarProvider>,
    notifier: Arc<dyn NotificationDispatcher>,
    vocabulary: RoutingVocabulary,
    admin_calendar_id: String,
    secondary_calendar_id: String,
    admin_meeting_url: String,
}

impl BookingOrchestrator {
    pub fn new(
        config: &AppConfig,
        storage: Arc<PostgrestClient>,
        rooms: Arc<dyn RoomProvider>,
        calendar: Arc<dyn CalendarProvider>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Result<Self, SchedulingError> {
        let time_model = TimeModel::from_config(config)?;
        let conflict_oracle = ConflictOracle::new(Arc::clone(&storage), Arc::clone(&calendar));

        Ok(Self {
            storage,
            time_model,
            conflict_oracle,
            rooms,
            calendar,
            notifier,
            vocabulary: RoutingVocabulary::default(),
            admin_calendar_id: config.admin_calendar_id.clone(),
            secondary_calendar_id: config.secondary_calendar_id.clone(),
            admin_meeting_url: config.admin_meeting_url.clone(),
        })
    }

    pub fn time_model(&self) -> &TimeModel {
        &self.time_model
    }

    #[instrument(skip(self, request), fields(therapist_id = %request.therapist_id))]
    pub async fn book_session(
        &self,
        request: BookSessionRequest,
    ) -> Result<Appointment, SchedulingError> {
        info!(
            "Booking {} session for therapist {} on {} at {}",
            request.session_type, request.therapist_id, request.date, request.time
        );

        self.validate_request(&request)?;

        // Caller-supplied dedup token: a repeated submission returns the
        // appointment the first attempt created.
        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self.find_by_idempotency_key(key).await? {
                info!(
                    "Idempotency key {} already produced appointment {}, returning it",
                    key, existing.id
                );
                return Ok(existing);
            }
        }

        let start = self.time_model.to_absolute(request.date, &request.time)?;
        let end = start + ChronoDuration::minutes(request.duration_minutes as i64);

        // Conflict check before any external side effect.
        if let Some(conflict) = self
            .conflict_oracle
            .check_conflict(request.therapist_id, start, end)
            .await?
        {
            warn!(
                "Rejecting booking for therapist {}: {}",
                request.therapist_id, conflict.message
            );
            return Err(SchedulingError::ConflictDetected(conflict));
        }

        let route = classify_session(&request.session_type, &self.vocabulary);
        debug!("Session type {:?} routed to {:?}", request.session_type, route);

        let appointment_id = Uuid::new_v4();
        let room_name = room_name_for(appointment_id);

        // Admin-routed intake calls share the generic admin meeting link;
        // only therapist-owned sessions get a dedicated video room.
        let (meeting_url, meeting_room_id) = match route {
            SessionRoute::AdminOnboarding => (self.admin_meeting_url.clone(), None),
            SessionRoute::TherapistOwned => {
                let room = self
                    .rooms
                    .ensure_room(&room_name, start, request.duration_minutes)
                    .await
                    .map_err(|e| SchedulingError::RoomProvisioning(e.to_string()))?;
                (room.url, Some(room.id))
            }
        };

        let mut appointment = match self
            .persist_appointment(
                appointment_id,
                &request,
                start,
                end,
                &meeting_url,
                meeting_room_id.as_deref(),
            )
            .await
        {
            Ok(a) => a,
            Err(SchedulingError::AppointmentOverlap) => {
                // A concurrent booking won the race between our conflict
                // check and the insert. The constraint is the final word;
                // tear any dedicated room back down.
                warn!(
                    "Lost booking race for therapist {} at {} (exclusion constraint)",
                    request.therapist_id, start
                );
                if meeting_room_id.is_some() {
                    if let Err(e) = self.rooms.delete_room(&room_name).await {
                        warn!("Failed to clean up room {} after lost race: {}", room_name, e);
                    }
                }
                return Err(SchedulingError::AppointmentOverlap);
            }
            Err(e) => return Err(e),
        };

        // Mirror into the routed calendar, best-effort.
        let calendar_id = self.routed_calendar_id(route, request.therapist_id);
        let title = format!("{} - {}", request.session_type, request.client_name);
        match self.calendar.create_event(&calendar_id, &title, start, end).await {
            Ok(event_id) => {
                appointment = self
                    .record_calendar_event(appointment, &event_id)
                    .await
                    .unwrap_or_else(|(appointment, e)| {
                        warn!("Could not record calendar event id: {}", e);
                        appointment
                    });
            }
            Err(e) => {
                warn!(
                    "Calendar mirror failed for appointment {}: {}",
                    appointment.id, e
                );
            }
        }

        // Notifications are fire-and-forget; failure degrades, never aborts.
        let notice = Notice::BookingConfirmed {
            appointment_id: appointment.id,
            therapist_id: appointment.primary_therapist_id,
            client_name: appointment.client_name.clone(),
            client_email: appointment.client_email.clone(),
            scheduled_at: appointment.scheduled_at,
            duration_minutes: appointment.duration_minutes,
            session_type: appointment.session_type.clone(),
            meeting_url: appointment.meeting_url.clone(),
        };
        if let Err(e) = self.notifier.dispatch(&notice).await {
            warn!(
                "Booking notification failed for appointment {}: {}",
                appointment.id, e
            );
        }

        info!(
            "Appointment {} booked for therapist {} from {} to {}",
            appointment.id, appointment.primary_therapist_id, start, end
        );
        Ok(appointment)
    }

    /// Cancel a session. Idempotent: cancelling an already-cancelled session
    /// is a no-op, not an error, and does not re-send notifications.
    #[instrument(skip(self))]
    pub async fn cancel_session(
        &self,
        appointment_id: Uuid,
        reason: Option<String>,
    ) -> Result<Appointment, SchedulingError> {
        let appointment = self.get_appointment(appointment_id).await?;

        if appointment.status == AppointmentStatus::Cancelled {
            debug!("Appointment {} already cancelled, no-op", appointment_id);
            return Ok(appointment);
        }

        lifecycle::validate_transition(appointment.status, AppointmentStatus::Cancelled)?;

        // Room and calendar teardown are best-effort: the status flip is the
        // source of truth, external retraction failures only get logged.
        // Admin-routed sessions never had a dedicated room to tear down.
        if appointment.meeting_provider_room_id.is_some() {
            let room_name = room_name_for(appointment.id);
            if let Err(e) = self.rooms.delete_room(&room_name).await {
                warn!("Failed to delete room {} on cancellation: {}", room_name, e);
            }
        }

        if let Some(event_id) = &appointment.external_calendar_event_id {
            let route = classify_session(&appointment.session_type, &self.vocabulary);
            let primary = self.routed_calendar_id(route, appointment.primary_therapist_id);

            match self.calendar.delete_event(&primary, event_id).await {
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "Primary calendar deletion failed for event {}: {}, trying secondary",
                        event_id, e
                    );
                    if let Err(e2) = self
                        .calendar
                        .delete_event(&self.secondary_calendar_id, event_id)
                        .await
                    {
                        warn!(
                            "Secondary calendar deletion also failed for event {}: {}",
                            event_id, e2
                        );
                    }
                }
            }
        }

        let cancelled = self
            .update_status_record(appointment_id, AppointmentStatus::Cancelled, reason)
            .await?;

        let notice = Notice::BookingCancelled {
            appointment_id: cancelled.id,
            therapist_id: cancelled.primary_therapist_id,
            client_email: Some(cancelled.client_email.clone()),
            scheduled_at: cancelled.scheduled_at,
        };
        if let Err(e) = self.notifier.dispatch(&notice).await {
            warn!(
                "Cancellation notification failed for appointment {}: {}",
                cancelled.id, e
            );
        }

        info!("Appointment {} cancelled", cancelled.id);
        Ok(cancelled)
    }

    /// Move an appointment through its lifecycle (confirm, start, complete,
    /// mark no-show). Cancellation goes through `cancel_session` so room and
    /// calendar teardown run.
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
    ) -> Result<Appointment, SchedulingError> {
        let appointment = self.get_appointment(appointment_id).await?;
        if appointment.status == new_status {
            return Ok(appointment);
        }
        lifecycle::validate_transition(appointment.status, new_status)?;
        self.update_status_record(appointment_id, new_status, None)
            .await
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Appointment, SchedulingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .storage
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(SchedulingError::NotFound);
        };

        serde_json::from_value(row)
            .map_err(|e| SchedulingError::Database(format!("Failed to parse appointment: {}", e)))
    }

    pub async fn search_appointments(
        &self,
        query: AppointmentSearchQuery,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let mut query_parts = Vec::new();

        if let Some(therapist_id) = query.therapist_id {
            query_parts.push(format!("primary_therapist_id=eq.{}", therapist_id));
        }
        if let Some(client_id) = query.client_id {
            query_parts.push(format!("client_id=eq.{}", client_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from_date) = query.from_date {
            let date_str = from_date.to_rfc3339();
            query_parts.push(format!("scheduled_at=gte.{}", urlencoding::encode(&date_str)));
        }
        if let Some(to_date) = query.to_date {
            let date_str = to_date.to_rfc3339();
            query_parts.push(format!("scheduled_at=lte.{}", urlencoding::encode(&date_str)));
        }

        let mut path = format!(
            "/rest/v1/appointments?{}&order=scheduled_at.asc",
            query_parts.join("&")
        );
        if let Some(limit) = query.limit {
            path.push_str(&format!("&limit={}", limit));
        }
        if let Some(offset) = query.offset {
            path.push_str(&format!("&offset={}", offset));
        }

        let result: Vec<Value> = self
            .storage
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| SchedulingError::Database(format!("Failed to parse appointments: {}", e)))
    }

    /// All appointments for a therapist on a local calendar day.
    pub async fn appointments_on_day(
        &self,
        therapist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let (start, end) = self.time_model.day_bounds(date)?;
        self.search_appointments(AppointmentSearchQuery {
            therapist_id: Some(therapist_id),
            from_date: Some(start),
            to_date: Some(end),
            ..Default::default()
        })
        .await
    }

    /// Direct oracle access for the conflict-check endpoint.
    pub async fn check_conflict(
        &self,
        therapist_id: Uuid,
        start: chrono::DateTime<Utc>,
        end: chrono::DateTime<Utc>,
    ) -> Result<Option<ConflictResult>, SchedulingError> {
        self.conflict_oracle
            .check_conflict(therapist_id, start, end)
            .await
    }

    // ==============================================================================
    // PRIVATE HELPERS
    // ==============================================================================

    fn validate_request(&self, request: &BookSessionRequest) -> Result<(), SchedulingError> {
        if request.duration_minutes < MIN_SESSION_MINUTES {
            return Err(SchedulingError::Validation(format!(
                "Session duration must be at least {} minutes",
                MIN_SESSION_MINUTES
            )));
        }
        if request.duration_minutes > MAX_SESSION_MINUTES {
            return Err(SchedulingError::Validation(format!(
                "Session duration cannot exceed {} minutes",
                MAX_SESSION_MINUTES
            )));
        }
        if request.client_email.trim().is_empty() {
            return Err(SchedulingError::Validation(
                "Client email is required".to_string(),
            ));
        }
        Ok(())
    }

    fn routed_calendar_id(&self, route: SessionRoute, therapist_id: Uuid) -> String {
        match route {
            SessionRoute::AdminOnboarding => self.admin_calendar_id.clone(),
            SessionRoute::TherapistOwned => GoogleCalendarClient::therapist_calendar_id(therapist_id),
        }
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Appointment>, SchedulingError> {
        let path = format!(
            "/rest/v1/appointments?idempotency_key=eq.{}&status=neq.cancelled&limit=1",
            urlencoding::encode(key)
        );
        let result: Vec<Value> = self
            .storage
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row).map(Some).map_err(|e| {
                SchedulingError::Database(format!("Failed to parse appointment: {}", e))
            }),
            None => Ok(None),
        }
    }

    async fn persist_appointment(
        &self,
        appointment_id: Uuid,
        request: &BookSessionRequest,
        start: chrono::DateTime<Utc>,
        end: chrono::DateTime<Utc>,
        meeting_url: &str,
        meeting_room_id: Option<&str>,
    ) -> Result<Appointment, SchedulingError> {
        let now = Utc::now();
        let appointment_data = json!({
            "id": appointment_id,
            "primary_therapist_id": request.therapist_id,
            "client_id": request.client_id,
            "scheduled_at": start.to_rfc3339(),
            "end_time": end.to_rfc3339(),
            "duration_minutes": request.duration_minutes,
            "status": AppointmentStatus::Scheduled.to_string(),
            "session_type": request.session_type,
            "client_name": request.client_name,
            "client_email": request.client_email,
            "client_phone": request.client_phone,
            "notes": request.notes,
            "meeting_url": meeting_url,
            "meeting_provider_room_id": meeting_room_id,
            "external_calendar_event_id": null,
            "is_archived": false,
            "idempotency_key": request.idempotency_key,
            "created_by": request.booked_by,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let result: Vec<Value> = self
            .storage
            .insert_returning("/rest/v1/appointments", appointment_data)
            .await
            .map_err(|e| match e {
                StorageError::ExclusionViolation { .. } => SchedulingError::AppointmentOverlap,
                other => SchedulingError::Database(other.to_string()),
            })?;

        let Some(row) = result.into_iter().next() else {
            return Err(SchedulingError::Database(
                "Failed to create appointment".to_string(),
            ));
        };

        serde_json::from_value(row).map_err(|e| {
            SchedulingError::Database(format!("Failed to parse created appointment: {}", e))
        })
    }

    async fn record_calendar_event(
        &self,
        appointment: Appointment,
        event_id: &str,
    ) -> Result<Appointment, (Appointment, SchedulingError)> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment.id);
        let body = json!({
            "external_calendar_event_id": event_id,
            "updated_at": Utc::now().to_rfc3339()
        });

        match self.storage.update_returning::<Vec<Value>>(&path, body).await {
            Ok(rows) => match rows.into_iter().next() {
                Some(row) => serde_json::from_value(row).map_err(|e| {
                    let err = SchedulingError::Database(format!(
                        "Failed to parse updated appointment: {}",
                        e
                    ));
                    (appointment.clone(), err)
                }),
                None => Ok(appointment),
            },
            Err(e) => Err((appointment, SchedulingError::Database(e.to_string()))),
        }
    }

    async fn update_status_record(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        reason: Option<String>,
    ) -> Result<Appointment, SchedulingError> {
        let mut update_data = serde_json::Map::new();
        update_data.insert("status".to_string(), json!(new_status.to_string()));
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        if let Some(reason) = reason {
            update_data.insert("notes".to_string(), json!(reason));
        }

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .storage
            .update_returning(&path, Value::Object(update_data))
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(SchedulingError::NotFound);
        };

        serde_json::from_value(row).map_err(|e| {
            SchedulingError::Database(format!("Failed to parse updated appointment: {}", e))
        })
    }
}

/// Room names derive deterministically from the booking id, which is what
/// makes provisioning idempotent under retries.
pub fn room_name_for(appointment_id: Uuid) -> String {
    format!("session-{}", appointment_id)
}
