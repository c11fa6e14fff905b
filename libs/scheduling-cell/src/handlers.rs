// libs/scheduling-cell/src/handlers.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentSearchQuery, AppointmentStatus, BookSessionRequest, SchedulingError,
};
use crate::services::booking::BookingOrchestrator;

fn map_error(e: SchedulingError) -> AppError {
    match e {
        SchedulingError::ConflictDetected(conflict) => AppError::Conflict(conflict.message),
        SchedulingError::AppointmentOverlap => AppError::Conflict(
            "The requested time was booked by someone else, please pick another slot".to_string(),
        ),
        SchedulingError::InvalidLocalTime(msg) => AppError::BadRequest(msg),
        SchedulingError::Validation(msg) => AppError::BadRequest(msg),
        SchedulingError::InvalidStatusTransition { from, to } => {
            AppError::BadRequest(format!("Appointment cannot move from {} to {}", from, to))
        }
        SchedulingError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        SchedulingError::RoomProvisioning(msg) => AppError::ExternalService(msg),
        SchedulingError::ExternalService(msg) => AppError::ExternalService(msg),
        SchedulingError::Database(msg) => AppError::Database(msg),
    }
}

/// POST / - book a session
pub async fn book_session(
    State(orchestrator): State<Arc<BookingOrchestrator>>,
    Json(request): Json<BookSessionRequest>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    info!(
        "Booking request for therapist {} on {}",
        request.therapist_id, request.date
    );

    let appointment = orchestrator
        .book_session(request)
        .await
        .map_err(map_error)?;

    Ok((StatusCode::CREATED, Json(appointment)))
}

/// GET /search - query appointments
pub async fn search_appointments(
    State(orchestrator): State<Arc<BookingOrchestrator>>,
    Query(query): Query<AppointmentSearchQuery>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let appointments = orchestrator
        .search_appointments(query)
        .await
        .map_err(map_error)?;

    Ok(Json(appointments))
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub therapist_id: Uuid,
}

/// GET /day/{date} - a therapist's appointments for one local calendar day
pub async fn appointments_on_day(
    State(orchestrator): State<Arc<BookingOrchestrator>>,
    Path(date): Path<NaiveDate>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let appointments = orchestrator
        .appointments_on_day(query.therapist_id, date)
        .await
        .map_err(map_error)?;

    Ok(Json(appointments))
}

#[derive(Debug, Deserialize)]
pub struct ConflictCheckQuery {
    pub therapist_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// GET /conflicts/check - dry-run availability probe for a proposed interval
pub async fn check_conflict(
    State(orchestrator): State<Arc<BookingOrchestrator>>,
    Query(query): Query<ConflictCheckQuery>,
) -> Result<Json<Value>, AppError> {
    if query.end <= query.start {
        return Err(AppError::BadRequest(
            "Interval end must be after start".to_string(),
        ));
    }

    let conflict = orchestrator
        .check_conflict(query.therapist_id, query.start, query.end)
        .await
        .map_err(map_error)?;

    Ok(Json(json!({
        "available": conflict.is_none(),
        "conflict": conflict
    })))
}

/// GET /{appointment_id}
pub async fn get_appointment(
    State(orchestrator): State<Arc<BookingOrchestrator>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    let appointment = orchestrator
        .get_appointment(appointment_id)
        .await
        .map_err(map_error)?;

    Ok(Json(appointment))
}

#[derive(Debug, Deserialize, Default)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

/// POST /{appointment_id}/cancel
pub async fn cancel_session(
    State(orchestrator): State<Arc<BookingOrchestrator>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<Appointment>, AppError> {
    info!("Cancellation request for appointment {}", appointment_id);

    let appointment = orchestrator
        .cancel_session(appointment_id, request.reason)
        .await
        .map_err(map_error)?;

    Ok(Json(appointment))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: AppointmentStatus,
}

/// PATCH /{appointment_id}/status - lifecycle transitions other than cancel
pub async fn update_status(
    State(orchestrator): State<Arc<BookingOrchestrator>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<Appointment>, AppError> {
    if request.status == AppointmentStatus::Cancelled {
        return Err(AppError::BadRequest(
            "Use the cancel endpoint to cancel an appointment".to_string(),
        ));
    }

    let appointment = orchestrator
        .update_status(appointment_id, request.status)
        .await
        .map_err(map_error)?;

    Ok(Json(appointment))
}
