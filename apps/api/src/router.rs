use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use scheduling_cell::{session_routes, BookingOrchestrator};
use shared_config::AppConfig;
use webhook_cell::{webhook_routes, ReprocessingTool, WebhookProcessor};

pub fn create_router(
    config: Arc<AppConfig>,
    orchestrator: Arc<BookingOrchestrator>,
    processor: Arc<WebhookProcessor>,
    reprocessor: Arc<ReprocessingTool>,
) -> Router {
    Router::new()
        .route("/", get(|| async { "Solace booking API is running!" }))
        .route("/health", get(health).with_state(config))
        .nest("/sessions", session_routes(orchestrator))
        .nest("/webhooks/payments", webhook_routes(processor, reprocessor))
}

async fn health(State(config): State<Arc<AppConfig>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "storage_configured": config.is_configured(),
        "meeting_rooms_configured": config.is_meeting_rooms_configured(),
        "calendar_configured": config.is_calendar_configured(),
        "notifications_configured": config.is_notifications_configured()
    }))
}
