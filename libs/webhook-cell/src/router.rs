// libs/webhook-cell/src/router.rs
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers::{self, WebhookState};
use crate::services::processor::WebhookProcessor;
use crate::services::reprocess::ReprocessingTool;

pub fn webhook_routes(
    processor: Arc<WebhookProcessor>,
    reprocessor: Arc<ReprocessingTool>,
) -> Router {
    let state = WebhookState {
        processor,
        reprocessor,
    };

    Router::new()
        .route("/", post(handlers::receive_webhook))
        .route("/ledger/attention", get(handlers::list_attention))
        .route("/ledger/{ledger_id}", get(handlers::get_ledger_entry))
        .route("/reprocess", post(handlers::reprocess))
        .with_state(state)
}
