// libs/webhook-cell/src/services/processor.rs
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use scheduling_cell::models::{AppointmentStatus, BookSessionRequest, SchedulingError};
use scheduling_cell::BookingOrchestrator;

use crate::models::{BookingIntent, ProcessOutcome, ProcessingStatus, WebhookError, WebhookEvent};
use crate::services::ledger::WebhookLedger;

const WEBHOOK_ACTOR: &str = "payment_webhook";

/// Drives inbound payment-provider events through the ledger and the booking
/// orchestrator. Infrastructure failures before a ledger row exists raise so
/// the provider redelivers; once a row is claimed, booking-level failures are
/// captured into the failed state for operators instead of raised.
pub struct WebhookProcessor {
    ledger: WebhookLedger,
    orchestrator: Arc<BookingOrchestrator>,
}

impl WebhookProcessor {
    pub fn new(ledger: WebhookLedger, orchestrator: Arc<BookingOrchestrator>) -> Self {
        Self {
            ledger,
            orchestrator,
        }
    }

    pub fn ledger(&self) -> &WebhookLedger {
        &self.ledger
    }

    #[instrument(skip(self, raw_event), fields(attempt_id = %attempt_id))]
    pub async fn process_event(
        &self,
        raw_event: &Value,
        attempt_id: Uuid,
    ) -> Result<ProcessOutcome, WebhookError> {
        let provider_event_id = Self::envelope_str(raw_event, "id")?;
        let event_type = Self::envelope_str(raw_event, "type")?;

        info!(
            "Processing webhook {} ({}) attempt {}",
            provider_event_id, event_type, attempt_id
        );

        // Completed entries short-circuit before any booking work.
        if let Some(existing) = self
            .ledger
            .find_by_provider_event_id(provider_event_id)
            .await?
        {
            match existing.processing_status {
                ProcessingStatus::Completed => {
                    info!("Webhook {} already processed, short-circuiting", provider_event_id);
                    return Ok(ProcessOutcome::already_processed(
                        existing.created_appointment_id,
                    ));
                }
                ProcessingStatus::Processing => {
                    // Another worker holds this event; defer to it.
                    info!("Webhook {} is in flight elsewhere, deferring", provider_event_id);
                    return Err(WebhookError::LedgerConflict);
                }
                ProcessingStatus::Pending | ProcessingStatus::Failed => {
                    let reclaimed = self.ledger.reclaim(&existing).await?;
                    return Ok(self.run_booking(&reclaimed).await);
                }
            }
        }

        // Insert-first claim; losing the uniqueness race means another
        // delivery of the same event is being handled concurrently.
        let claimed = self
            .ledger
            .claim(provider_event_id, event_type, raw_event)
            .await?;

        Ok(self.run_booking(&claimed).await)
    }

    /// Steps after a ledger row is held in processing. Errors here terminate
    /// in the failed state, they never propagate to the delivery handler.
    pub(crate) async fn run_booking(&self, event: &WebhookEvent) -> ProcessOutcome {
        let metadata = event
            .raw_payload
            .get("metadata")
            .cloned()
            .unwrap_or(Value::Null);

        let intent = match BookingIntent::from_metadata(&metadata) {
            Ok(intent) => intent,
            Err(e) => return self.fail(event.id, e.to_string()).await,
        };

        // A pre-assigned appointment id means the payment confirms an
        // existing booking rather than creating one.
        if let Some(appointment_id) = intent.appointment_id {
            match self.confirm_existing(appointment_id).await {
                Ok(Some(confirmed_id)) => return self.complete(event.id, Some(confirmed_id)).await,
                Ok(None) => {
                    // Referenced appointment is gone or cancelled; fall
                    // through and book fresh from the intent.
                    warn!(
                        "Webhook {} references missing or cancelled appointment {}, booking anew",
                        event.provider_event_id, appointment_id
                    );
                }
                Err(e) => return self.fail(event.id, e.to_string()).await,
            }
        }

        let request = BookSessionRequest {
            therapist_id: intent.therapist_id,
            client_id: intent.client_id,
            date: intent.scheduled_at.date(),
            time: intent.scheduled_at.format("%H:%M:%S").to_string(),
            duration_minutes: intent.duration_minutes,
            client_name: intent.client_name,
            client_email: intent.client_email,
            client_phone: None,
            session_type: intent.session_type,
            notes: None,
            booked_by: WEBHOOK_ACTOR.to_string(),
            idempotency_key: Some(event.provider_event_id.clone()),
        };

        match self.orchestrator.book_session(request).await {
            Ok(appointment) => self.complete(event.id, Some(appointment.id)).await,
            Err(e) => self.fail(event.id, e.to_string()).await,
        }
    }

    async fn confirm_existing(
        &self,
        appointment_id: Uuid,
    ) -> Result<Option<Uuid>, SchedulingError> {
        match self.orchestrator.get_appointment(appointment_id).await {
            Ok(appointment) if appointment.status != AppointmentStatus::Cancelled => {
                let confirmed = self
                    .orchestrator
                    .update_status(appointment_id, AppointmentStatus::Confirmed)
                    .await?;
                Ok(Some(confirmed.id))
            }
            Ok(_) => Ok(None),
            Err(SchedulingError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn complete(&self, ledger_id: Uuid, appointment_id: Option<Uuid>) -> ProcessOutcome {
        match self.ledger.mark_completed(ledger_id, appointment_id).await {
            Ok(_) => ProcessOutcome::completed(appointment_id),
            Err(e) => {
                // The booking happened but the ledger update did not; the
                // idempotency key on the appointment still protects retries.
                warn!("Could not mark ledger entry {} completed: {}", ledger_id, e);
                ProcessOutcome {
                    success: true,
                    already_processed: false,
                    appointment_id,
                    errors: vec![format!("ledger update failed: {}", e)],
                }
            }
        }
    }

    async fn fail(&self, ledger_id: Uuid, error: String) -> ProcessOutcome {
        warn!("Webhook processing failed for entry {}: {}", ledger_id, error);
        if let Err(e) = self.ledger.mark_failed(ledger_id, &error).await {
            warn!("Could not mark ledger entry {} failed: {}", ledger_id, e);
        }
        ProcessOutcome::failed(error)
    }

    fn envelope_str<'a>(raw_event: &'a Value, field: &str) -> Result<&'a str, WebhookError> {
        raw_event
            .get(field)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                WebhookError::MalformedEnvelope(format!("missing top-level {}", field))
            })
    }
}
