#![allow(dead_code)]

/// Shared test utilities and helpers
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use credits::{
    adapter::{HmacSha256Verifier, InMemoryEventStore, InMemoryLedgerStore},
    domain::{
        EventId, IngestOutcome, LedgerEntry, LedgerError, OperationId, PaymentEvent, Receipt,
        Source, UserId, WebhookError,
    },
    service::{CreditLedger, WebhookProcessor},
};

pub const TEST_SECRET: &str = "whsec_test";

/// Test context wiring the full subsystem against in-memory stores.
pub struct TestContext {
    pub store: Arc<InMemoryLedgerStore>,
    pub events: Arc<InMemoryEventStore>,
    pub ledger: CreditLedger,
    pub processor: WebhookProcessor,
    signer: HmacSha256Verifier,
}

impl TestContext {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryLedgerStore::new());
        let events = Arc::new(InMemoryEventStore::new());
        let ledger = CreditLedger::new(store.clone());
        let processor = WebhookProcessor::new(
            Arc::new(HmacSha256Verifier::new(TEST_SECRET)),
            events.clone(),
            ledger.clone(),
        );

        Self {
            store,
            events,
            ledger,
            processor,
            signer: HmacSha256Verifier::new(TEST_SECRET),
        }
    }

    pub async fn credit(&self, user: &str, amount: i64, op: &str) -> Result<Receipt, LedgerError> {
        self.ledger
            .credit(
                &user_id(user),
                amount,
                Source::Purchase,
                Some(OperationId::new(op)),
            )
            .await
    }

    pub async fn deduct(&self, user: &str, amount: i64, op: &str) -> Result<Receipt, LedgerError> {
        self.ledger
            .deduct(&user_id(user), amount, OperationId::new(op))
            .await
    }

    pub async fn balance(&self, user: &str) -> i64 {
        self.ledger
            .balance(&user_id(user))
            .await
            .expect("balance query should not fail")
    }

    pub async fn entries(&self, user: &str) -> Vec<LedgerEntry> {
        use credits::port::LedgerStore;
        self.store
            .entries(&user_id(user))
            .await
            .expect("entries query should not fail")
    }

    pub async fn event(&self, event_id: &str) -> Option<PaymentEvent> {
        use credits::port::EventStore;
        self.events
            .find(&EventId::new(event_id))
            .await
            .expect("event query should not fail")
    }

    /// Sign a payload the way the gateway would.
    pub fn sign(&self, payload: &serde_json::Value) -> (Vec<u8>, String) {
        let raw = serde_json::to_vec(payload).expect("payload serializes");
        let signature = self.signer.sign(&raw, Utc::now());
        (raw, signature)
    }

    /// Deliver a correctly signed webhook payload.
    pub async fn deliver(
        &self,
        payload: &serde_json::Value,
    ) -> Result<IngestOutcome, WebhookError> {
        let (raw, signature) = self.sign(payload);
        self.processor.ingest(&raw, &signature).await
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

pub fn user_id(user: &str) -> UserId {
    UserId::new(user)
}

/// Fresh operation id, unique within the test binary.
pub fn next_op() -> OperationId {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    OperationId::new(format!("op-{}", COUNTER.fetch_add(1, Ordering::SeqCst)))
}

pub fn purchase_event(event_id: &str, user: &str, credits: i64) -> serde_json::Value {
    gateway_event(event_id, "payment.succeeded", user, credits)
}

pub fn renewal_event(event_id: &str, user: &str, credits: i64) -> serde_json::Value {
    gateway_event(event_id, "subscription.renewed", user, credits)
}

pub fn refund_event(event_id: &str, user: &str, credits: i64) -> serde_json::Value {
    gateway_event(event_id, "payment.refunded", user, credits)
}

pub fn failed_payment_event(event_id: &str, user: &str) -> serde_json::Value {
    gateway_event(event_id, "payment.failed", user, 0)
}

pub fn gateway_event(
    event_id: &str,
    event_type: &str,
    user: &str,
    credits: i64,
) -> serde_json::Value {
    serde_json::json!({
        "id": event_id,
        "type": event_type,
        "data": {
            "user_id": user,
            "credits": credits,
        },
    })
}
