use std::sync::Arc;

use sqlx::SqlitePool;

use crate::{
    adapter::{
        init_schema, HmacSha256Verifier, InMemoryEventStore, InMemoryLedgerStore,
        SqliteEventStore, SqliteLedgerStore,
    },
    port::{EventStore, LedgerStore, SignatureVerifier},
    service::{CreditLedger, WebhookProcessor},
};

/// Wire the subsystem against the in-memory stores.
pub fn boot(webhook_secret: &str) -> (CreditLedger, WebhookProcessor) {
    let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
    let events: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let verifier: Arc<dyn SignatureVerifier> = Arc::new(HmacSha256Verifier::new(webhook_secret));

    let ledger = CreditLedger::new(store);
    let processor = WebhookProcessor::new(verifier, events, ledger.clone());

    tracing::info!("credit ledger initialized (in-memory stores)");
    (ledger, processor)
}

/// Wire the subsystem against SQLite, creating the schema if needed.
pub async fn boot_sqlite(
    pool: SqlitePool,
    webhook_secret: &str,
) -> Result<(CreditLedger, WebhookProcessor), sqlx::Error> {
    init_schema(&pool).await?;

    let store: Arc<dyn LedgerStore> = Arc::new(SqliteLedgerStore::new(pool.clone()));
    let events: Arc<dyn EventStore> = Arc::new(SqliteEventStore::new(pool));
    let verifier: Arc<dyn SignatureVerifier> = Arc::new(HmacSha256Verifier::new(webhook_secret));

    let ledger = CreditLedger::new(store);
    let processor = WebhookProcessor::new(verifier, events, ledger.clone());

    tracing::info!("credit ledger initialized (sqlite)");
    Ok((ledger, processor))
}
