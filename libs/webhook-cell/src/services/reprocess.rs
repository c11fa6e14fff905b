// libs/webhook-cell/src/services/reprocess.rs
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{ProcessOutcome, ProcessingStatus, ReprocessItem, ReprocessReport};
use crate::services::processor::WebhookProcessor;

/// Operator-invoked batch replay of stuck or failed ledger entries. Not a
/// hot path: every entry is handled individually, per-item failures are
/// recorded without aborting the batch, and a verification pass re-reads
/// each entry's terminal status afterwards.
pub struct ReprocessingTool {
    processor: Arc<WebhookProcessor>,
}

impl ReprocessingTool {
    pub fn new(processor: Arc<WebhookProcessor>) -> Self {
        Self { processor }
    }

    #[instrument(skip(self), fields(count = ids.len()))]
    pub async fn reprocess_all(&self, ids: &[Uuid]) -> ReprocessReport {
        info!("Reprocessing {} ledger entries", ids.len());

        let mut items = Vec::with_capacity(ids.len());
        for &ledger_id in ids {
            items.push(self.reprocess_one(ledger_id).await);
        }

        // Verification pass: the ledger, not the in-memory outcome, is the
        // record of what actually happened.
        for item in &mut items {
            match self.processor.ledger().get(item.ledger_id).await {
                Ok(event) => item.verified_status = Some(event.processing_status),
                Err(e) => {
                    warn!("Verification read failed for {}: {}", item.ledger_id, e);
                }
            }
        }

        let succeeded = items
            .iter()
            .filter(|i| i.outcome.as_ref().is_some_and(|o| o.success))
            .count();
        let failed = items.len() - succeeded;

        info!(
            "Reprocessing finished: {} succeeded, {} failed",
            succeeded, failed
        );

        ReprocessReport {
            requested: ids.len(),
            succeeded,
            failed,
            items,
        }
    }

    async fn reprocess_one(&self, ledger_id: Uuid) -> ReprocessItem {
        let mut item = ReprocessItem {
            ledger_id,
            provider_event_id: None,
            outcome: None,
            error: None,
            verified_status: None,
        };

        let event = match self.processor.ledger().get(ledger_id).await {
            Ok(event) => event,
            Err(e) => {
                warn!("Reprocess lookup failed for {}: {}", ledger_id, e);
                item.error = Some(e.to_string());
                return item;
            }
        };
        item.provider_event_id = Some(event.provider_event_id.clone());

        if event.processing_status == ProcessingStatus::Completed {
            item.outcome = Some(ProcessOutcome::already_processed(
                event.created_appointment_id,
            ));
            return item;
        }

        let reclaimed = match self.processor.ledger().reclaim(&event).await {
            Ok(reclaimed) => reclaimed,
            Err(e) => {
                warn!("Reprocess reclaim failed for {}: {}", ledger_id, e);
                item.error = Some(e.to_string());
                return item;
            }
        };

        item.outcome = Some(self.processor.run_booking(&reclaimed).await);
        item
    }
}
