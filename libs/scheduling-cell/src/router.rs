// libs/scheduling-cell/src/router.rs
use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::services::booking::BookingOrchestrator;

pub fn session_routes(orchestrator: Arc<BookingOrchestrator>) -> Router {
    Router::new()
        .route("/", post(handlers::book_session))
        .route("/search", get(handlers::search_appointments))
        .route("/day/{date}", get(handlers::appointments_on_day))
        .route("/conflicts/check", get(handlers::check_conflict))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_session))
        .route("/{appointment_id}/status", patch(handlers::update_status))
        .with_state(orchestrator)
}
