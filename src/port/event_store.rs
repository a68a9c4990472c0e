use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{EventId, PaymentEvent, WebhookError};

/// Whether an insert claimed first sighting of an event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventInsert {
    Created,
    Duplicate,
}

/// Durable record of every inbound gateway notification, keyed by the
/// gateway-supplied event id. Used purely for deduplication and audit.
///
/// The uniqueness of `event_id` must be enforced by the storage layer
/// itself (unique index, not an application-level existence check), so two
/// concurrent deliveries of the same event can never both claim it.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert a newly received event. Returns `Duplicate` when the event
    /// id is already recorded; the existing row is left untouched.
    async fn insert(&self, event: PaymentEvent) -> Result<EventInsert, WebhookError>;

    /// Transition `received -> processed`.
    async fn mark_processed(
        &self,
        event_id: &EventId,
        processed_at: DateTime<Utc>,
    ) -> Result<(), WebhookError>;

    /// Transition `received -> failed`, keeping the cause for operators.
    async fn mark_failed(&self, event_id: &EventId, error: &str) -> Result<(), WebhookError>;

    /// Recorded event, if any (audit access).
    async fn find(&self, event_id: &EventId) -> Result<Option<PaymentEvent>, WebhookError>;
}
