use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{UserId, WebhookError};

/// Globally unique notification identifier, supplied by the external
/// gateway. The sole deduplication key for webhook deliveries.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct EventId(String);

impl EventId {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a recorded notification: `received` on first sighting,
/// then terminally `processed` or `failed`. Redelivery of the same
/// event id never transitions the row again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Received,
    Processed,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Received => "received",
            EventStatus::Processed => "processed",
            EventStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(EventStatus::Received),
            "processed" => Ok(EventStatus::Processed),
            "failed" => Ok(EventStatus::Failed),
            other => Err(format!("unknown event status: {}", other)),
        }
    }
}

/// One row per distinct external notification, kept for deduplication
/// and audit. Linked to the ledger entry it produced (if any) only via
/// the operation id / event id correlation, not by foreign key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: EventStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentEvent {
    /// Row as created on first sighting of a notification. `payload` is
    /// the delivery as sent, kept verbatim for audit; the typed
    /// notification only carries the fields this subsystem reads.
    pub fn received(notification: &GatewayNotification, payload: serde_json::Value) -> Self {
        Self {
            event_id: notification.id.clone(),
            event_type: notification.event_type.clone(),
            payload,
            status: EventStatus::Received,
            processed_at: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }
}

/// Verified and parsed gateway payload.
///
/// `event_type` stays a free-form string so that notification types this
/// subsystem does not act on are still recorded for audit; `kind()`
/// classifies the ones that carry ledger semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayNotification {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
}

impl GatewayNotification {
    pub fn kind(&self) -> GatewayEventKind {
        match self.event_type.as_str() {
            "payment.succeeded" => GatewayEventKind::PaymentSucceeded,
            "subscription.renewed" => GatewayEventKind::SubscriptionRenewed,
            "payment.refunded" => GatewayEventKind::PaymentRefunded,
            "payment.failed" => GatewayEventKind::PaymentFailed,
            _ => GatewayEventKind::Unrecognized,
        }
    }

    /// Typed `data` for the notification kinds that mutate the ledger.
    pub fn credit_data(&self) -> Result<GatewayCreditData, WebhookError> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))
    }
}

/// Classification of notification types this subsystem acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEventKind {
    PaymentSucceeded,
    SubscriptionRenewed,
    PaymentRefunded,
    PaymentFailed,
    Unrecognized,
}

/// Ledger-relevant fields of a gateway notification's `data` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCreditData {
    pub user_id: UserId,
    pub credits: i64,
}

/// How an ingest call ended, for callers that map outcomes to transport
/// responses. Every variant here means the event is durably recorded and
/// the gateway should be answered with success; verification and parse
/// rejections surface as `WebhookError` instead and map to non-success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First sighting, business effect applied.
    Processed,
    /// Event id already recorded; no further effect. Not an error.
    Duplicate,
    /// Recorded, but downstream processing failed; the row is marked
    /// `failed` for operator follow-up and relies on gateway redelivery.
    Failed,
}
