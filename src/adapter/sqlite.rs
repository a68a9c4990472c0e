use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{
        Account, Direction, EventId, EventStatus, LedgerEntry, LedgerError, Mutation, OperationId,
        PaymentEvent, Source, UserId, WebhookError, STARTING_BALANCE,
    },
    port::{Applied, EventInsert, EventStore, LedgerStore},
};

/// Create the three durable tables. The unique constraints here are the
/// dedup guards: `payment_events.event_id` against duplicate webhook
/// deliveries, `ledger_entries.operation_id` against retried mutations.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            user_id    TEXT PRIMARY KEY,
            balance    INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
            tier       TEXT NOT NULL DEFAULT 'free'
        );

        CREATE TABLE IF NOT EXISTS ledger_entries (
            id            TEXT PRIMARY KEY,
            user_id       TEXT NOT NULL REFERENCES accounts(user_id),
            amount        INTEGER NOT NULL CHECK (amount > 0),
            direction     TEXT NOT NULL,
            source        TEXT NOT NULL,
            balance_after INTEGER NOT NULL,
            operation_id  TEXT UNIQUE,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_ledger_entries_user
            ON ledger_entries(user_id, created_at);

        CREATE TABLE IF NOT EXISTS payment_events (
            event_id      TEXT PRIMARY KEY,
            event_type    TEXT NOT NULL,
            payload       TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'received',
            processed_at  TEXT,
            error_message TEXT,
            created_at    TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

fn storage_ledger(e: sqlx::Error) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

fn storage_webhook(e: sqlx::Error) -> WebhookError {
    WebhookError::Storage(e.to_string())
}

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, LedgerError> {
    let parse = |msg: String| LedgerError::Storage(msg);

    let id: String = row.try_get("id").map_err(storage_ledger)?;
    let user_id: String = row.try_get("user_id").map_err(storage_ledger)?;
    let direction: String = row.try_get("direction").map_err(storage_ledger)?;
    let source: String = row.try_get("source").map_err(storage_ledger)?;
    let operation_id: Option<String> = row.try_get("operation_id").map_err(storage_ledger)?;

    Ok(LedgerEntry {
        id: Uuid::parse_str(&id).map_err(|e| parse(e.to_string()))?,
        user_id: UserId::new(user_id),
        amount: row.try_get("amount").map_err(storage_ledger)?,
        direction: direction.parse::<Direction>().map_err(parse)?,
        source: source.parse::<Source>().map_err(parse)?,
        balance_after: row.try_get("balance_after").map_err(storage_ledger)?,
        operation_id: operation_id.map(OperationId::new),
        created_at: row.try_get("created_at").map_err(storage_ledger)?,
    })
}

const SELECT_ENTRY: &str = "SELECT id, user_id, amount, direction, source, balance_after, \
                            operation_id, created_at FROM ledger_entries";

/// SQLite-backed ledger store. The transaction is the unit of work: the
/// dedup recheck, balance read, balance update and entry insert either all
/// land or all roll back, and the database serializes writers.
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Unit of work of `apply`, run while holding the database write lock.
    async fn apply_locked(
        conn: &mut SqliteConnection,
        user_id: &UserId,
        mutation: Mutation,
    ) -> Result<Applied, LedgerError> {
        // Recheck the idempotency key under the lock; a fast-path check
        // outside it cannot be trusted under concurrency.
        if let Some(operation_id) = &mutation.operation_id {
            let existing = sqlx::query(&format!("{} WHERE operation_id = ?", SELECT_ENTRY))
                .bind(operation_id.as_str())
                .fetch_optional(&mut *conn)
                .await
                .map_err(storage_ledger)?;
            if let Some(row) = existing {
                return Ok(Applied {
                    entry: entry_from_row(&row)?,
                    replayed: true,
                });
            }
        }

        sqlx::query(
            "INSERT INTO accounts (user_id, balance, tier) VALUES (?, ?, 'free') \
             ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(user_id.as_str())
        .bind(STARTING_BALANCE)
        .execute(&mut *conn)
        .await
        .map_err(storage_ledger)?;

        let balance: i64 = sqlx::query("SELECT balance FROM accounts WHERE user_id = ?")
            .bind(user_id.as_str())
            .fetch_one(&mut *conn)
            .await
            .map_err(storage_ledger)?
            .try_get("balance")
            .map_err(storage_ledger)?;

        let balance_after = match mutation.direction {
            Direction::Credit => balance
                .checked_add(mutation.amount)
                .ok_or(LedgerError::InvalidAmount)?,
            Direction::Debit => {
                if balance < mutation.amount {
                    // The caller rolls back the upsert.
                    return Err(LedgerError::InsufficientCredits {
                        current: balance,
                        required: mutation.amount,
                    });
                }
                balance - mutation.amount
            }
        };

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            user_id: user_id.clone(),
            amount: mutation.amount,
            direction: mutation.direction,
            source: mutation.source,
            balance_after,
            operation_id: mutation.operation_id,
            created_at: Utc::now(),
        };

        sqlx::query("UPDATE accounts SET balance = ? WHERE user_id = ?")
            .bind(balance_after)
            .bind(user_id.as_str())
            .execute(&mut *conn)
            .await
            .map_err(storage_ledger)?;

        sqlx::query(
            "INSERT INTO ledger_entries \
             (id, user_id, amount, direction, source, balance_after, operation_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.to_string())
        .bind(entry.user_id.as_str())
        .bind(entry.amount)
        .bind(entry.direction.as_str())
        .bind(entry.source.as_str())
        .bind(entry.balance_after)
        .bind(entry.operation_id.as_ref().map(|op| op.as_str().to_string()))
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await
        .map_err(storage_ledger)?;

        Ok(Applied {
            entry,
            replayed: false,
        })
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn apply(&self, user_id: &UserId, mutation: Mutation) -> Result<Applied, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(storage_ledger)?;

        // Take the write lock up front. A deferred transaction starts out
        // reading and deadlocks on the read-to-write upgrade when another
        // connection writes concurrently; with IMMEDIATE, writers queue on
        // the busy timeout and mutations stay totally ordered.
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(storage_ledger)?;

        match Self::apply_locked(&mut conn, user_id, mutation).await {
            Ok(applied) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(storage_ledger)?;
                Ok(applied)
            }
            Err(e) => {
                if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    tracing::error!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn find_by_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        let row = sqlx::query(&format!("{} WHERE operation_id = ?", SELECT_ENTRY))
            .bind(operation_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_ledger)?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn balance(&self, user_id: &UserId) -> Result<i64, LedgerError> {
        let row = sqlx::query("SELECT balance FROM accounts WHERE user_id = ?")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_ledger)?;
        match row {
            Some(row) => row.try_get("balance").map_err(storage_ledger),
            None => Ok(STARTING_BALANCE),
        }
    }

    async fn account(&self, user_id: &UserId) -> Result<Option<Account>, LedgerError> {
        let row = sqlx::query("SELECT user_id, balance, tier FROM accounts WHERE user_id = ?")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_ledger)?;
        row.map(|row| {
            let user_id: String = row.try_get("user_id").map_err(storage_ledger)?;
            let tier: String = row.try_get("tier").map_err(storage_ledger)?;
            Ok(Account {
                user_id: UserId::new(user_id),
                balance: row.try_get("balance").map_err(storage_ledger)?,
                tier: tier.parse().map_err(LedgerError::Storage)?,
            })
        })
        .transpose()
    }

    async fn entries(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = sqlx::query(&format!(
            "{} WHERE user_id = ? ORDER BY created_at, id",
            SELECT_ENTRY
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_ledger)?;
        rows.iter().map(entry_from_row).collect()
    }
}

/// SQLite-backed event store. First sighting is claimed by the primary
/// key on `event_id` via `ON CONFLICT DO NOTHING`; zero affected rows
/// means another delivery got there first.
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn insert(&self, event: PaymentEvent) -> Result<EventInsert, WebhookError> {
        let payload = serde_json::to_string(&event.payload)
            .map_err(|e| WebhookError::Storage(e.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO payment_events \
             (event_id, event_type, payload, status, created_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(event_id) DO NOTHING",
        )
        .bind(event.event_id.as_str())
        .bind(&event.event_type)
        .bind(payload)
        .bind(event.status.as_str())
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_webhook)?;

        if result.rows_affected() == 0 {
            Ok(EventInsert::Duplicate)
        } else {
            Ok(EventInsert::Created)
        }
    }

    async fn mark_processed(
        &self,
        event_id: &EventId,
        processed_at: DateTime<Utc>,
    ) -> Result<(), WebhookError> {
        let result = sqlx::query(
            "UPDATE payment_events SET status = 'processed', processed_at = ? WHERE event_id = ?",
        )
        .bind(processed_at)
        .bind(event_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage_webhook)?;

        if result.rows_affected() == 0 {
            return Err(WebhookError::Storage(format!(
                "event {} not found",
                event_id
            )));
        }
        Ok(())
    }

    async fn mark_failed(&self, event_id: &EventId, error: &str) -> Result<(), WebhookError> {
        let result = sqlx::query(
            "UPDATE payment_events SET status = 'failed', error_message = ? WHERE event_id = ?",
        )
        .bind(error)
        .bind(event_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage_webhook)?;

        if result.rows_affected() == 0 {
            return Err(WebhookError::Storage(format!(
                "event {} not found",
                event_id
            )));
        }
        Ok(())
    }

    async fn find(&self, event_id: &EventId) -> Result<Option<PaymentEvent>, WebhookError> {
        let row = sqlx::query(
            "SELECT event_id, event_type, payload, status, processed_at, error_message, \
             created_at FROM payment_events WHERE event_id = ?",
        )
        .bind(event_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_webhook)?;

        row.map(|row| {
            let event_id: String = row.try_get("event_id").map_err(storage_webhook)?;
            let payload: String = row.try_get("payload").map_err(storage_webhook)?;
            let status: String = row.try_get("status").map_err(storage_webhook)?;
            Ok(PaymentEvent {
                event_id: EventId::new(event_id),
                event_type: row.try_get("event_type").map_err(storage_webhook)?,
                payload: serde_json::from_str(&payload)
                    .map_err(|e| WebhookError::Storage(e.to_string()))?,
                status: status
                    .parse::<EventStatus>()
                    .map_err(WebhookError::Storage)?,
                processed_at: row.try_get("processed_at").map_err(storage_webhook)?,
                error_message: row.try_get("error_message").map_err(storage_webhook)?,
                created_at: row.try_get("created_at").map_err(storage_webhook)?,
            })
        })
        .transpose()
    }
}
