use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    domain::{
        Account, Direction, EventId, LedgerEntry, LedgerError, Mutation, OperationId, PaymentEvent,
        UserId, WebhookError,
    },
    port::{Applied, EventInsert, EventStore, LedgerStore},
};

struct LedgerData {
    accounts: HashMap<UserId, Account>,
    entries: Vec<Arc<LedgerEntry>>,
    operation_index: HashMap<OperationId, Arc<LedgerEntry>>,
}

/// In-memory ledger store.
///
/// The single write lock is the serialization primitive: the dedup check,
/// the balance check and the balance update plus entry append all happen
/// inside one critical section, so mutations are totally ordered and
/// concurrent retries of the same operation id collapse to one entry.
pub struct InMemoryLedgerStore {
    data: Arc<RwLock<LedgerData>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LedgerData {
                accounts: HashMap::new(),
                entries: Vec::new(),
                operation_index: HashMap::new(),
            })),
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn apply(&self, user_id: &UserId, mutation: Mutation) -> Result<Applied, LedgerError> {
        let mut data = self.data.write().await;

        if let Some(operation_id) = &mutation.operation_id {
            if let Some(existing) = data.operation_index.get(operation_id) {
                return Ok(Applied {
                    entry: (**existing).clone(),
                    replayed: true,
                });
            }
        }

        let balance = data
            .accounts
            .entry(user_id.clone())
            .or_insert_with(|| Account::new(user_id.clone()))
            .balance;

        let balance_after = match mutation.direction {
            Direction::Credit => balance
                .checked_add(mutation.amount)
                .ok_or(LedgerError::InvalidAmount)?,
            Direction::Debit => {
                if balance < mutation.amount {
                    return Err(LedgerError::InsufficientCredits {
                        current: balance,
                        required: mutation.amount,
                    });
                }
                balance - mutation.amount
            }
        };

        let entry = Arc::new(LedgerEntry {
            id: Uuid::new_v4(),
            user_id: user_id.clone(),
            amount: mutation.amount,
            direction: mutation.direction,
            source: mutation.source,
            balance_after,
            operation_id: mutation.operation_id.clone(),
            created_at: Utc::now(),
        });

        if let Some(account) = data.accounts.get_mut(user_id) {
            account.balance = balance_after;
        }
        data.entries.push(entry.clone());
        if let Some(operation_id) = mutation.operation_id {
            data.operation_index.insert(operation_id, entry.clone());
        }

        Ok(Applied {
            entry: (*entry).clone(),
            replayed: false,
        })
    }

    async fn find_by_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        let data = self.data.read().await;
        Ok(data
            .operation_index
            .get(operation_id)
            .map(|arc| (**arc).clone()))
    }

    async fn balance(&self, user_id: &UserId) -> Result<i64, LedgerError> {
        let data = self.data.read().await;
        Ok(data
            .accounts
            .get(user_id)
            .map(|account| account.balance)
            .unwrap_or(crate::domain::STARTING_BALANCE))
    }

    async fn account(&self, user_id: &UserId) -> Result<Option<Account>, LedgerError> {
        let data = self.data.read().await;
        Ok(data.accounts.get(user_id).cloned())
    }

    async fn entries(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>, LedgerError> {
        let data = self.data.read().await;
        Ok(data
            .entries
            .iter()
            .filter(|e| &e.user_id == user_id)
            .map(|arc| (**arc).clone())
            .collect())
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory event store. The dedup index plays the role of the unique
/// index on `event_id`: insert-or-detect-duplicate under one write lock.
pub struct InMemoryEventStore {
    events: Arc<RwLock<HashMap<EventId, PaymentEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert(&self, event: PaymentEvent) -> Result<EventInsert, WebhookError> {
        let mut events = self.events.write().await;
        if events.contains_key(&event.event_id) {
            return Ok(EventInsert::Duplicate);
        }
        events.insert(event.event_id.clone(), event);
        Ok(EventInsert::Created)
    }

    async fn mark_processed(
        &self,
        event_id: &EventId,
        processed_at: DateTime<Utc>,
    ) -> Result<(), WebhookError> {
        let mut events = self.events.write().await;
        match events.get_mut(event_id) {
            Some(event) => {
                event.status = crate::domain::EventStatus::Processed;
                event.processed_at = Some(processed_at);
                Ok(())
            }
            None => Err(WebhookError::Storage(format!(
                "event {} not found",
                event_id
            ))),
        }
    }

    async fn mark_failed(&self, event_id: &EventId, error: &str) -> Result<(), WebhookError> {
        let mut events = self.events.write().await;
        match events.get_mut(event_id) {
            Some(event) => {
                event.status = crate::domain::EventStatus::Failed;
                event.error_message = Some(error.to_string());
                Ok(())
            }
            None => Err(WebhookError::Storage(format!(
                "event {} not found",
                event_id
            ))),
        }
    }

    async fn find(&self, event_id: &EventId) -> Result<Option<PaymentEvent>, WebhookError> {
        let events = self.events.read().await;
        Ok(events.get(event_id).cloned())
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}
