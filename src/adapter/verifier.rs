use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{domain::WebhookError, port::SignatureVerifier};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verifies the gateway's `t=<unix>,v1=<hex>` signature header: an
/// HMAC-SHA256 over `"{timestamp}.{payload}"` with the shared secret,
/// rejected when the timestamp falls outside the tolerance window.
pub struct HmacSha256Verifier {
    secret: String,
    tolerance_secs: i64,
}

impl HmacSha256Verifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Produce a signature header for a payload. Used by the mock capture
    /// generator and by tests standing in for the gateway.
    pub fn sign(&self, payload: &[u8], at: DateTime<Utc>) -> String {
        let timestamp = at.timestamp();
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }
}

impl SignatureVerifier for HmacSha256Verifier {
    fn verify(&self, payload: &[u8], signature_header: &str) -> Result<(), WebhookError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<&str> = None;

        for part in signature_header.split(',') {
            match part.split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => v1_signature = Some(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::InvalidSignature)?;
        let v1_signature = v1_signature.ok_or(WebhookError::InvalidSignature)?;

        let now = Utc::now().timestamp();
        if (now - timestamp).abs() > self.tolerance_secs {
            return Err(WebhookError::InvalidSignature);
        }

        let expected = hex::decode(v1_signature).map_err(|_| WebhookError::InvalidSignature)?;

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);

        // verify_slice is constant-time
        mac.verify_slice(&expected)
            .map_err(|_| WebhookError::InvalidSignature)
    }
}
