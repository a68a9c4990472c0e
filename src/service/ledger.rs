use std::sync::Arc;

use crate::{
    domain::{Direction, LedgerError, Mutation, OperationId, Receipt, Source, UserId},
    port::LedgerStore,
};

/// Credit ledger service: owns all balance mutation logic.
///
/// Every mutation is idempotent by operation id and atomic (balance update
/// plus ledger entry in one unit of work, delegated to the store). No other
/// code path is permitted to write balances.
#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn LedgerStore>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Debit a consumption attempt.
    ///
    /// Exactly one balance change per distinct operation id, regardless of
    /// retries or concurrent callers; a replayed id returns the recorded
    /// result without touching the balance.
    pub async fn deduct(
        &self,
        user_id: &UserId,
        amount: i64,
        operation_id: OperationId,
    ) -> Result<Receipt, LedgerError> {
        self.debit(user_id, amount, Source::Usage, operation_id).await
    }

    /// Reversal path for refund notifications: a debit recorded with
    /// source `refund` instead of `usage`.
    pub async fn reverse(
        &self,
        user_id: &UserId,
        amount: i64,
        operation_id: OperationId,
    ) -> Result<Receipt, LedgerError> {
        self.debit(user_id, amount, Source::Refund, operation_id).await
    }

    /// Grant credits. The operation id is optional for sources that carry
    /// their own natural dedup key upstream, but follows the same replay
    /// rule when present.
    pub async fn credit(
        &self,
        user_id: &UserId,
        amount: i64,
        source: Source,
        operation_id: Option<OperationId>,
    ) -> Result<Receipt, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }

        if let Some(operation_id) = &operation_id {
            if let Some(entry) = self.store.find_by_operation(operation_id).await? {
                tracing::info!(user = %user_id, operation = %operation_id, "credit replayed");
                return Ok(entry.receipt());
            }
        }

        let applied = self
            .store
            .apply(
                user_id,
                Mutation {
                    amount,
                    direction: Direction::Credit,
                    source,
                    operation_id,
                },
            )
            .await?;

        if applied.replayed {
            tracing::info!(user = %user_id, "credit replayed");
        } else {
            tracing::debug!(
                user = %user_id,
                amount,
                balance = applied.entry.balance_after,
                source = source.as_str(),
                "credited"
            );
        }
        Ok(applied.entry.receipt())
    }

    /// Read-only balance query; the starting balance for accounts that
    /// have never been created.
    pub async fn balance(&self, user_id: &UserId) -> Result<i64, LedgerError> {
        self.store.balance(user_id).await
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    async fn debit(
        &self,
        user_id: &UserId,
        amount: i64,
        source: Source,
        operation_id: OperationId,
    ) -> Result<Receipt, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }

        // Fast path: a retried operation returns its recorded result. The
        // store rechecks the key inside its critical section, so this is
        // an optimization, not the guard.
        if let Some(entry) = self.store.find_by_operation(&operation_id).await? {
            tracing::info!(user = %user_id, operation = %operation_id, "debit replayed");
            return Ok(entry.receipt());
        }

        let applied = self
            .store
            .apply(
                user_id,
                Mutation {
                    amount,
                    direction: Direction::Debit,
                    source,
                    operation_id: Some(operation_id.clone()),
                },
            )
            .await?;

        if applied.replayed {
            tracing::info!(user = %user_id, operation = %operation_id, "debit replayed");
        } else {
            tracing::debug!(
                user = %user_id,
                amount,
                balance = applied.entry.balance_after,
                source = source.as_str(),
                "debited"
            );
        }
        Ok(applied.entry.receipt())
    }
}
