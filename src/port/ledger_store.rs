use async_trait::async_trait;

use crate::domain::{Account, LedgerEntry, LedgerError, Mutation, OperationId, UserId};

/// Result of `LedgerStore::apply`.
#[derive(Debug, Clone)]
pub struct Applied {
    pub entry: LedgerEntry,
    /// True when the mutation's operation id was already recorded and the
    /// existing entry was returned instead of mutating again.
    pub replayed: bool,
}

/// Durable table of account balances plus the append-only transaction log.
///
/// The store owns the serialization of mutations: all writes to one account
/// happen one after the other, never interleaved, and the balance update
/// plus the entry append are a single atomic unit of work. The critical
/// section never spans a call to an external system.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Atomically apply a balance mutation for one account.
    ///
    /// - Creates the account with the starting balance on first use.
    /// - Idempotent via `operation_id`: a mutation whose key is already in
    ///   the log returns the existing entry with `replayed: true` and does
    ///   not touch the balance again. The check happens inside the same
    ///   critical section as the write, so concurrent duplicates are safe.
    /// - A debit that would take the balance below zero fails with
    ///   `InsufficientCredits` and leaves no trace.
    async fn apply(&self, user_id: &UserId, mutation: Mutation) -> Result<Applied, LedgerError>;

    /// Entry previously recorded under this operation id, if any.
    async fn find_by_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Current balance; the starting balance for accounts never created.
    async fn balance(&self, user_id: &UserId) -> Result<i64, LedgerError>;

    /// Account row, if it has been created.
    async fn account(&self, user_id: &UserId) -> Result<Option<Account>, LedgerError>;

    /// All entries for a user, oldest first (audit access).
    async fn entries(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>, LedgerError>;
}
