// libs/webhook-cell/src/services/ledger.rs
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use shared_database::{PostgrestClient, StorageError};

use crate::models::{ProcessingStatus, WebhookError, WebhookEvent};

/// Durable ledger of inbound webhook deliveries. The claim operation leans on
/// the unique provider_event_id index as a storage-level mutex, which is the
/// only dedup mechanism that holds across multiple service instances.
#[derive(Clone)]
pub struct WebhookLedger {
    storage: Arc<PostgrestClient>,
}

impl WebhookLedger {
    pub fn new(storage: Arc<PostgrestClient>) -> Self {
        Self { storage }
    }

    pub async fn find_by_provider_event_id(
        &self,
        provider_event_id: &str,
    ) -> Result<Option<WebhookEvent>, WebhookError> {
        let path = format!(
            "/rest/v1/webhook_events?provider_event_id=eq.{}&limit=1",
            urlencoding::encode(provider_event_id)
        );
        let result: Vec<Value> = self
            .storage
            .request(Method::GET, &path, None)
            .await
            .map_err(storage_to_webhook)?;

        match result.into_iter().next() {
            Some(row) => parse_event(row).map(Some),
            None => Ok(None),
        }
    }

    pub async fn get(&self, ledger_id: Uuid) -> Result<WebhookEvent, WebhookError> {
        let path = format!("/rest/v1/webhook_events?id=eq.{}", ledger_id);
        let result: Vec<Value> = self
            .storage
            .request(Method::GET, &path, None)
            .await
            .map_err(storage_to_webhook)?;

        let Some(row) = result.into_iter().next() else {
            return Err(WebhookError::NotFound);
        };
        parse_event(row)
    }

    /// Insert-first claim of a provider event. A unique violation means a
    /// concurrent delivery of the same event won the race, surfaced as
    /// `LedgerConflict` so the caller defers instead of double-booking.
    #[instrument(skip(self, raw_payload))]
    pub async fn claim(
        &self,
        provider_event_id: &str,
        event_type: &str,
        raw_payload: &Value,
    ) -> Result<WebhookEvent, WebhookError> {
        debug!("Claiming webhook event {}", provider_event_id);

        let row = json!({
            "id": Uuid::new_v4(),
            "provider_event_id": provider_event_id,
            "event_type": event_type,
            "raw_payload": raw_payload,
            "processing_status": ProcessingStatus::Processing.to_string(),
            "attempt_count": 1,
            "created_appointment_id": null,
            "error_message": null,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339(),
            "completed_at": null
        });

        let result: Vec<Value> = self
            .storage
            .insert_returning("/rest/v1/webhook_events", row)
            .await
            .map_err(|e| match e {
                StorageError::UniqueViolation { .. } => WebhookError::LedgerConflict,
                other => WebhookError::Database(other.to_string()),
            })?;

        let Some(row) = result.into_iter().next() else {
            return Err(WebhookError::Database(
                "Failed to create ledger entry".to_string(),
            ));
        };
        parse_event(row)
    }

    /// Move a non-completed entry back into processing for a retry, bumping
    /// the attempt counter. The update carries a `processing_status` guard so
    /// only one of several concurrent retries actually takes the entry; the
    /// losers see `LedgerConflict` and back off.
    pub async fn reclaim(&self, event: &WebhookEvent) -> Result<WebhookEvent, WebhookError> {
        info!(
            "Reclaiming ledger entry {} (attempt {})",
            event.id,
            event.attempt_count + 1
        );

        let path = format!(
            "/rest/v1/webhook_events?id=eq.{}&processing_status=neq.{}",
            event.id,
            ProcessingStatus::Processing
        );
        let result = self
            .patch_where(
                &path,
                json!({
                    "processing_status": ProcessingStatus::Processing.to_string(),
                    "attempt_count": event.attempt_count + 1,
                    "error_message": null,
                    "updated_at": Utc::now().to_rfc3339()
                }),
            )
            .await?;
        result.ok_or(WebhookError::LedgerConflict)
    }

    pub async fn mark_completed(
        &self,
        ledger_id: Uuid,
        appointment_id: Option<Uuid>,
    ) -> Result<WebhookEvent, WebhookError> {
        info!("Ledger entry {} completed", ledger_id);
        self.finish(
            ledger_id,
            json!({
                "processing_status": ProcessingStatus::Completed.to_string(),
                "created_appointment_id": appointment_id,
                "error_message": null,
                "updated_at": Utc::now().to_rfc3339(),
                "completed_at": Utc::now().to_rfc3339()
            }),
        )
        .await
    }

    pub async fn mark_failed(
        &self,
        ledger_id: Uuid,
        error_message: &str,
    ) -> Result<WebhookEvent, WebhookError> {
        info!("Ledger entry {} failed: {}", ledger_id, error_message);
        self.finish(
            ledger_id,
            json!({
                "processing_status": ProcessingStatus::Failed.to_string(),
                "error_message": error_message,
                "updated_at": Utc::now().to_rfc3339()
            }),
        )
        .await
    }

    /// Entries needing operator attention: failed entries, plus entries stuck
    /// in processing longer than the staleness threshold.
    pub async fn list_attention(
        &self,
        stale_after_minutes: i64,
    ) -> Result<Vec<WebhookEvent>, WebhookError> {
        let stale_cutoff = (Utc::now() - ChronoDuration::minutes(stale_after_minutes)).to_rfc3339();
        let filter = format!(
            "(processing_status.eq.failed,and(processing_status.eq.processing,updated_at.lt.{}))",
            stale_cutoff
        );
        let path = format!(
            "/rest/v1/webhook_events?or={}&order=created_at.asc",
            urlencoding::encode(&filter)
        );

        let result: Vec<Value> = self
            .storage
            .request(Method::GET, &path, None)
            .await
            .map_err(storage_to_webhook)?;

        result.into_iter().map(parse_event).collect()
    }

    /// Terminal transitions only apply to entries this worker still holds in
    /// `processing`. If the guard matches nothing, another worker already
    /// moved the entry on and its outcome must not be overwritten.
    async fn finish(&self, ledger_id: Uuid, body: Value) -> Result<WebhookEvent, WebhookError> {
        let path = format!(
            "/rest/v1/webhook_events?id=eq.{}&processing_status=eq.{}",
            ledger_id,
            ProcessingStatus::Processing
        );
        let result = self.patch_where(&path, body).await?;
        result.ok_or(WebhookError::LedgerConflict)
    }

    async fn patch_where(
        &self,
        path: &str,
        body: Value,
    ) -> Result<Option<WebhookEvent>, WebhookError> {
        let result: Vec<Value> = self
            .storage
            .update_returning(path, body)
            .await
            .map_err(storage_to_webhook)?;

        match result.into_iter().next() {
            Some(row) => parse_event(row).map(Some),
            None => Ok(None),
        }
    }
}

fn storage_to_webhook(e: StorageError) -> WebhookError {
    WebhookError::from(e)
}

fn parse_event(row: Value) -> Result<WebhookEvent, WebhookError> {
    serde_json::from_value(row)
        .map_err(|e| WebhookError::Database(format!("Failed to parse ledger entry: {}", e)))
}
