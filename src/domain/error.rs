use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Business and validation failures of the credit ledger itself.
///
/// `InsufficientCredits` is an expected rejection, not a fault: the
/// caller's consumption attempt is refused and no mutation occurs.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum LedgerError {
    #[error("insufficient credits: have {current}, need {required}")]
    InsufficientCredits { current: i64, required: i64 },
    #[error("invalid amount (must be positive)")]
    InvalidAmount,
    #[error("storage error: {0}")]
    Storage(String),
}

/// Failures at the webhook ingestion boundary.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum WebhookError {
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum CreditsError {
    Ledger(LedgerError),
    Webhook(WebhookError),
}

impl Display for CreditsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CreditsError::Ledger(e) => e.fmt(f),
            CreditsError::Webhook(e) => e.fmt(f),
        }
    }
}

impl From<LedgerError> for CreditsError {
    fn from(e: LedgerError) -> Self {
        CreditsError::Ledger(e)
    }
}

impl From<WebhookError> for CreditsError {
    fn from(e: WebhookError) -> Self {
        CreditsError::Webhook(e)
    }
}
