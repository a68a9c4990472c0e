use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::UserId;

/// Caller-supplied idempotency token, unique to one logical operation
/// (one per user action, not per retry).
///
/// Examples: "usage:analysis:42", a webhook event id, an API request id.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(Direction::Credit),
            "debit" => Ok(Direction::Debit),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

/// Where a mutation came from, for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Purchase,
    Usage,
    Refund,
    Bonus,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Purchase => "purchase",
            Source::Usage => "usage",
            Source::Refund => "refund",
            Source::Bonus => "bonus",
        }
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(Source::Purchase),
            "usage" => Ok(Source::Usage),
            "refund" => Ok(Source::Refund),
            "bonus" => Ok(Source::Bonus),
            other => Err(format!("unknown source: {}", other)),
        }
    }
}

/// Append-only audit record of a single completed balance mutation.
/// Immutable after creation, never updated or deleted.
///
/// Replaying a user's entries oldest-first must reproduce the account
/// balance exactly; `balance_after` of the newest entry is the balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: UserId,
    /// Always positive; the sign is carried by `direction`.
    pub amount: i64,
    pub direction: Direction,
    pub source: Source,
    /// Balance snapshot taken inside the same atomic unit of work.
    pub balance_after: i64,
    /// Idempotency key; unique across the whole log when present.
    pub operation_id: Option<OperationId>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Signed amount: positive for credits, negative for debits.
    pub fn signed_amount(&self) -> i64 {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }

    /// Reconstruct the receipt this entry was originally answered with.
    /// Used when a replayed operation id must return its recorded result.
    pub fn receipt(&self) -> Receipt {
        Receipt {
            previous_balance: self.balance_after - self.signed_amount(),
            new_balance: self.balance_after,
            amount: self.amount,
        }
    }
}

/// Requested balance mutation, applied atomically by a ledger store.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub amount: i64,
    pub direction: Direction,
    pub source: Source,
    pub operation_id: Option<OperationId>,
}

/// Result of a completed (or replayed) mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub previous_balance: i64,
    pub new_balance: i64,
    pub amount: i64,
}
