mod context;

use std::sync::Arc;

use chrono::Utc;
use context::*;
use credits::{
    adapter::{init_schema, SqliteEventStore, SqliteLedgerStore},
    domain::{
        Direction, EventId, EventStatus, LedgerError, Mutation, OperationId, PaymentEvent, Source,
    },
    port::{EventInsert, EventStore, LedgerStore},
    service::CreditLedger,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

async fn test_pool() -> SqlitePool {
    // A single connection so every transaction sees the same in-memory
    // database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    init_schema(&pool).await.expect("schema");
    pool
}

fn credit(amount: i64, op: &str) -> Mutation {
    Mutation {
        amount,
        direction: Direction::Credit,
        source: Source::Purchase,
        operation_id: Some(OperationId::new(op)),
    }
}

fn debit(amount: i64, op: &str) -> Mutation {
    Mutation {
        amount,
        direction: Direction::Debit,
        source: Source::Usage,
        operation_id: Some(OperationId::new(op)),
    }
}

#[tokio::test]
async fn test_sqlite_apply_and_balance() {
    let store = SqliteLedgerStore::new(test_pool().await);
    let user = user_id("alice");

    let applied = store.apply(&user, credit(10, "evt-1")).await.unwrap();
    assert!(!applied.replayed);
    assert_eq!(applied.entry.balance_after, 10);

    let applied = store.apply(&user, debit(3, "op-1")).await.unwrap();
    assert_eq!(applied.entry.balance_after, 7);

    assert_eq!(store.balance(&user).await.unwrap(), 7);

    let entries = store.entries(&user).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].balance_after, 10);
    assert_eq!(entries[1].balance_after, 7);
}

#[tokio::test]
async fn test_sqlite_operation_id_is_idempotent() {
    let store = SqliteLedgerStore::new(test_pool().await);
    let user = user_id("alice");

    store.apply(&user, credit(10, "evt-1")).await.unwrap();

    let first = store.apply(&user, debit(4, "op-1")).await.unwrap();
    let replay = store.apply(&user, debit(4, "op-1")).await.unwrap();

    assert!(!first.replayed);
    assert!(replay.replayed);
    assert_eq!(first.entry.id, replay.entry.id);
    assert_eq!(store.balance(&user).await.unwrap(), 6);

    let found = store
        .find_by_operation(&OperationId::new("op-1"))
        .await
        .unwrap()
        .expect("recorded entry");
    assert_eq!(found.id, first.entry.id);
}

#[tokio::test]
async fn test_sqlite_insufficient_credits_rolls_back() {
    let store = SqliteLedgerStore::new(test_pool().await);
    let user = user_id("alice");

    let result = store.apply(&user, debit(1, "op-1")).await;
    assert!(matches!(
        result,
        Err(LedgerError::InsufficientCredits { current: 0, required: 1 })
    ));

    // No orphaned entries, no recorded operation.
    assert!(store.entries(&user).await.unwrap().is_empty());
    assert!(store
        .find_by_operation(&OperationId::new("op-1"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_sqlite_unknown_user_has_starting_balance() {
    let store = SqliteLedgerStore::new(test_pool().await);
    assert_eq!(store.balance(&user_id("nobody")).await.unwrap(), 0);
    assert!(store.account(&user_id("nobody")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_sqlite_account_row_created_on_first_use() {
    let store = SqliteLedgerStore::new(test_pool().await);
    let user = user_id("alice");

    store.apply(&user, credit(5, "evt-1")).await.unwrap();

    let account = store.account(&user).await.unwrap().expect("account row");
    assert_eq!(account.balance, 5);
    assert_eq!(account.tier, credits::domain::Tier::Free);
}

#[tokio::test]
async fn test_sqlite_event_insert_detects_duplicates() {
    let events = SqliteEventStore::new(test_pool().await);

    let event = PaymentEvent {
        event_id: EventId::new("evt-1"),
        event_type: "payment.succeeded".to_string(),
        payload: serde_json::json!({"id": "evt-1"}),
        status: EventStatus::Received,
        processed_at: None,
        error_message: None,
        created_at: Utc::now(),
    };

    assert_eq!(
        events.insert(event.clone()).await.unwrap(),
        EventInsert::Created
    );
    assert_eq!(
        events.insert(event).await.unwrap(),
        EventInsert::Duplicate
    );
}

#[tokio::test]
async fn test_sqlite_event_status_transitions() {
    let events = SqliteEventStore::new(test_pool().await);

    let event = PaymentEvent {
        event_id: EventId::new("evt-1"),
        event_type: "payment.succeeded".to_string(),
        payload: serde_json::json!({"id": "evt-1"}),
        status: EventStatus::Received,
        processed_at: None,
        error_message: None,
        created_at: Utc::now(),
    };
    events.insert(event).await.unwrap();

    let stored = events.find(&EventId::new("evt-1")).await.unwrap().unwrap();
    assert_eq!(stored.status, EventStatus::Received);

    events
        .mark_processed(&EventId::new("evt-1"), Utc::now())
        .await
        .unwrap();
    let stored = events.find(&EventId::new("evt-1")).await.unwrap().unwrap();
    assert_eq!(stored.status, EventStatus::Processed);
    assert!(stored.processed_at.is_some());

    events
        .mark_failed(&EventId::new("evt-1"), "insufficient credits")
        .await
        .unwrap();
    let stored = events.find(&EventId::new("evt-1")).await.unwrap().unwrap();
    assert_eq!(stored.status, EventStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("insufficient credits"));
}

#[tokio::test]
async fn test_sqlite_concurrent_deducts_serialize() {
    let store: Arc<dyn LedgerStore> = Arc::new(SqliteLedgerStore::new(test_pool().await));
    let ledger = CreditLedger::new(store);
    let user = user_id("alice");

    ledger
        .credit(&user, 10, Source::Purchase, Some(OperationId::new("evt-1")))
        .await
        .unwrap();

    let handles: Vec<_> = (0..15)
        .map(|k| {
            let ledger = ledger.clone();
            let user = user.clone();
            tokio::spawn(async move {
                ledger
                    .deduct(&user, 1, OperationId::new(format!("op-{}", k)))
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(LedgerError::InsufficientCredits { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(rejected, 5);
    assert_eq!(ledger.balance(&user).await.unwrap(), 0);
}

#[tokio::test]
async fn test_multi_connection_pool_serializes_concurrent_deducts() {
    // A file-backed database and a real pool: every writer runs on its own
    // connection, so the store itself must order the mutations rather than
    // lean on a single shared connection.
    let dir = tempfile::tempdir().expect("tempdir");
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("ledger.db"))
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .expect("file-backed sqlite");
    init_schema(&pool).await.expect("schema");

    let ledger = CreditLedger::new(Arc::new(SqliteLedgerStore::new(pool)));
    let user = user_id("alice");
    ledger
        .credit(&user, 50, Source::Purchase, Some(OperationId::new("evt-1")))
        .await
        .unwrap();

    let handles: Vec<_> = (0..30)
        .map(|k| {
            let ledger = ledger.clone();
            let user = user.clone();
            tokio::spawn(async move {
                ledger
                    .deduct(&user, 1, OperationId::new(format!("op-{}", k)))
                    .await
            })
        })
        .collect();

    // The balance covers every deduct; none may spuriously fault on a
    // writer collision.
    for handle in handles {
        handle.await.unwrap().expect("deduct within balance");
    }
    assert_eq!(ledger.balance(&user).await.unwrap(), 20);
}
