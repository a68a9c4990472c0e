use std::sync::Arc;

use chrono::Utc;

use crate::{
    domain::{
        CreditsError, GatewayEventKind, GatewayNotification, IngestOutcome, OperationId,
        PaymentEvent, Source, WebhookError,
    },
    port::{EventInsert, EventStore, SignatureVerifier},
    service::CreditLedger,
};

/// Webhook ingestion: verifies inbound notification authenticity, records
/// it exactly once, and dispatches its business effect to the ledger.
///
/// Callers map the result to the transport response: `Ok(_)` means the
/// event is durably recorded and the gateway gets success (whether newly
/// processed, a detected duplicate, or recorded-but-failed); `Err(_)` is a
/// boundary rejection (bad signature, unparseable payload, storage fault
/// before the event row landed) and maps to non-success so the gateway
/// redelivers.
pub struct WebhookProcessor {
    verifier: Arc<dyn SignatureVerifier>,
    events: Arc<dyn EventStore>,
    ledger: CreditLedger,
}

impl WebhookProcessor {
    pub fn new(
        verifier: Arc<dyn SignatureVerifier>,
        events: Arc<dyn EventStore>,
        ledger: CreditLedger,
    ) -> Self {
        Self {
            verifier,
            events,
            ledger,
        }
    }

    pub async fn ingest(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<IngestOutcome, WebhookError> {
        if let Err(e) = self.verifier.verify(payload, signature_header) {
            // Logged distinctly from business errors: potential attack.
            tracing::warn!("rejected webhook delivery: signature verification failed");
            return Err(e);
        }

        // Parse once into a value that is persisted verbatim as the audit
        // payload, then take the typed view of it.
        let payload_value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        let notification: GatewayNotification = serde_json::from_value(payload_value.clone())
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        let event_id = notification.id.clone();

        // The store's uniqueness constraint on event_id is the sole dedup
        // guard; no check-then-insert.
        match self
            .events
            .insert(PaymentEvent::received(&notification, payload_value))
            .await?
        {
            EventInsert::Duplicate => {
                tracing::info!(event = %event_id, "duplicate delivery, already recorded");
                return Ok(IngestOutcome::Duplicate);
            }
            EventInsert::Created => {}
        }

        match self.dispatch(&notification).await {
            Ok(()) => {
                self.events.mark_processed(&event_id, Utc::now()).await?;
                tracing::info!(event = %event_id, kind = %notification.event_type, "event processed");
                Ok(IngestOutcome::Processed)
            }
            Err(e) => {
                // The event stays recorded; a failed row relies on gateway
                // redelivery and operator follow-up, never an internal
                // retry loop.
                self.events.mark_failed(&event_id, &e.to_string()).await?;
                tracing::error!(event = %event_id, error = %e, "event processing failed");
                Ok(IngestOutcome::Failed)
            }
        }
    }

    /// Business effect of a first-sighted notification. The event id
    /// doubles as the ledger operation id, so a re-dispatch of the same
    /// event could never credit twice even past the dedup guard.
    async fn dispatch(&self, notification: &GatewayNotification) -> Result<(), CreditsError> {
        let operation_id = OperationId::new(notification.id.as_str());

        match notification.kind() {
            GatewayEventKind::PaymentSucceeded => {
                let data = notification.credit_data()?;
                self.ledger
                    .credit(&data.user_id, data.credits, Source::Purchase, Some(operation_id))
                    .await?;
            }
            GatewayEventKind::SubscriptionRenewed => {
                let data = notification.credit_data()?;
                self.ledger
                    .credit(&data.user_id, data.credits, Source::Bonus, Some(operation_id))
                    .await?;
            }
            GatewayEventKind::PaymentRefunded => {
                let data = notification.credit_data()?;
                self.ledger
                    .reverse(&data.user_id, data.credits, operation_id)
                    .await?;
            }
            GatewayEventKind::PaymentFailed => {
                // Recorded for audit; a failed payment grants nothing.
                tracing::debug!(event = %notification.id, "payment failure recorded, no ledger effect");
            }
            GatewayEventKind::Unrecognized => {
                tracing::debug!(
                    event = %notification.id,
                    kind = %notification.event_type,
                    "unrecognized event type recorded, no ledger effect"
                );
            }
        }
        Ok(())
    }
}
