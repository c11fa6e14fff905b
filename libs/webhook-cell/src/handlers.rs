// libs/webhook-cell/src/handlers.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{ProcessOutcome, ReprocessReport, WebhookError, WebhookEvent};
use crate::services::processor::WebhookProcessor;
use crate::services::reprocess::ReprocessingTool;

const DEFAULT_STALE_AFTER_MINUTES: i64 = 30;

#[derive(Clone)]
pub struct WebhookState {
    pub processor: Arc<WebhookProcessor>,
    pub reprocessor: Arc<ReprocessingTool>,
}

/// POST / - inbound payment-provider delivery.
///
/// Already-processed events return success so the provider stops redelivery.
/// A delivery that loses the claim race gets 202: the winning worker owns
/// the event and the provider's retry will observe its terminal state.
pub async fn receive_webhook(
    State(state): State<WebhookState>,
    Json(raw_event): Json<Value>,
) -> Result<(StatusCode, Json<ProcessOutcome>), AppError> {
    let attempt_id = Uuid::new_v4();

    match state.processor.process_event(&raw_event, attempt_id).await {
        Ok(outcome) => Ok((StatusCode::OK, Json(outcome))),
        Err(WebhookError::LedgerConflict) => {
            info!("Delivery deferred, event claimed by another processor");
            Ok((
                StatusCode::ACCEPTED,
                Json(ProcessOutcome {
                    success: false,
                    already_processed: false,
                    appointment_id: None,
                    errors: vec!["event is being processed elsewhere".to_string()],
                }),
            ))
        }
        Err(WebhookError::MalformedEnvelope(msg)) => Err(AppError::BadRequest(msg)),
        Err(e) => Err(AppError::Database(e.to_string())),
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct AttentionQuery {
    pub stale_after_minutes: Option<i64>,
}

/// GET /ledger/attention - failed entries plus entries stuck in processing
pub async fn list_attention(
    State(state): State<WebhookState>,
    Query(query): Query<AttentionQuery>,
) -> Result<Json<Vec<WebhookEvent>>, AppError> {
    let stale_after = query
        .stale_after_minutes
        .unwrap_or(DEFAULT_STALE_AFTER_MINUTES);

    let entries = state
        .processor
        .ledger()
        .list_attention(stale_after)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(entries))
}

/// GET /ledger/{ledger_id}
pub async fn get_ledger_entry(
    State(state): State<WebhookState>,
    Path(ledger_id): Path<Uuid>,
) -> Result<Json<WebhookEvent>, AppError> {
    match state.processor.ledger().get(ledger_id).await {
        Ok(entry) => Ok(Json(entry)),
        Err(WebhookError::NotFound) => {
            Err(AppError::NotFound("Ledger entry not found".to_string()))
        }
        Err(e) => Err(AppError::Database(e.to_string())),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReprocessRequest {
    pub ids: Vec<Uuid>,
}

/// POST /reprocess - operator-triggered batch replay
pub async fn reprocess(
    State(state): State<WebhookState>,
    Json(request): Json<ReprocessRequest>,
) -> Result<Json<ReprocessReport>, AppError> {
    if request.ids.is_empty() {
        return Err(AppError::BadRequest(
            "No ledger ids supplied for reprocessing".to_string(),
        ));
    }

    info!("Operator reprocessing {} entries", request.ids.len());
    let report = state.reprocessor.reprocess_all(&request.ids).await;
    Ok(Json(report))
}
