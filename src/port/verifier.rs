use crate::domain::WebhookError;

/// Authenticates a raw gateway payload against its signature header
/// before anything is parsed or stored.
///
/// A failure here is a security rejection: the delivery is dropped at the
/// boundary and never reaches the ledger.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, payload: &[u8], signature_header: &str) -> Result<(), WebhookError>;
}
