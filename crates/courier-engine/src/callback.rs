// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound callbacks from asynchronous providers.
//!
//! The body is JSON. The signature is the hex HMAC-SHA256 of the raw body
//! bytes under the shared secret; it is checked in constant time before the
//! body is parsed. A callback whose timestamp is further than `max_skew`
//! from the engine clock is rejected.

use chrono::{DateTime, Duration, Utc};
use courier_core::{AttemptOutcome, CourierError};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Final result reported by the vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    Delivered,
    TransientFailure,
    PermanentFailure,
}

impl From<CallbackOutcome> for AttemptOutcome {
    fn from(outcome: CallbackOutcome) -> Self {
        match outcome {
            CallbackOutcome::Delivered => AttemptOutcome::Delivered,
            CallbackOutcome::TransientFailure => AttemptOutcome::TransientFailure,
            CallbackOutcome::PermanentFailure => AttemptOutcome::PermanentFailure,
        }
    }
}

/// Body of a provider callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub provider_request_id: String,
    pub outcome: CallbackOutcome,
    /// Actual cost, if the vendor reports one.
    #[serde(default)]
    pub cost: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, CourierError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| CourierError::Internal(format!("invalid HMAC key: {e}")))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Signature and freshness checks for callbacks.
#[derive(Clone)]
pub struct CallbackVerifier {
    secret: Vec<u8>,
    max_skew: Duration,
}

impl CallbackVerifier {
    pub fn new(secret: impl Into<Vec<u8>>, max_skew: Duration) -> Self {
        Self {
            secret: secret.into(),
            max_skew,
        }
    }

    /// Verify `signature_hex` over `body`, then parse and check the timestamp.
    pub fn verify(
        &self,
        body: &[u8],
        signature_hex: &str,
        now: DateTime<Utc>,
    ) -> Result<CallbackPayload, CourierError> {
        let signature = hex::decode(signature_hex.trim())
            .map_err(|_| CourierError::Signature("signature is not valid hex".into()))?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| CourierError::Internal(format!("invalid HMAC key: {e}")))?;
        mac.update(body);
        mac.verify_slice(&signature)
            .map_err(|_| CourierError::Signature("signature mismatch".into()))?;

        let payload: CallbackPayload = serde_json::from_slice(body)
            .map_err(|e| CourierError::Validation(format!("malformed callback body: {e}")))?;

        let skew = (now - payload.timestamp).abs();
        if skew > self.max_skew {
            return Err(CourierError::Signature(format!(
                "callback timestamp {} is {}s from now, limit is {}s",
                payload.timestamp,
                skew.num_seconds(),
                self.max_skew.num_seconds()
            )));
        }
        Ok(payload)
    }
}

impl std::fmt::Debug for CallbackVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackVerifier")
            .field("secret", &"[REDACTED]")
            .field("max_skew", &self.max_skew)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn body(ts: DateTime<Utc>) -> Vec<u8> {
        serde_json::to_vec(&CallbackPayload {
            provider_request_id: "vendor-42".into(),
            outcome: CallbackOutcome::Delivered,
            cost: Some(0.25),
            timestamp: ts,
            detail: None,
        })
        .unwrap()
    }

    fn verifier() -> CallbackVerifier {
        CallbackVerifier::new(SECRET, Duration::seconds(300))
    }

    #[test]
    fn accepts_valid_signature() {
        let body = body(now());
        let sig = sign(SECRET, &body).unwrap();
        let payload = verifier().verify(&body, &sig, now()).unwrap();
        assert_eq!(payload.provider_request_id, "vendor-42");
        assert_eq!(AttemptOutcome::from(payload.outcome), AttemptOutcome::Delivered);
    }

    #[test]
    fn rejects_tampered_body() {
        let body = body(now());
        let sig = sign(SECRET, &body).unwrap();
        let mut tampered = body.clone();
        let last = tampered.len() - 2;
        tampered[last] ^= 0x01;
        let err = verifier().verify(&tampered, &sig, now()).unwrap_err();
        assert!(matches!(err, CourierError::Signature(_)));
    }

    #[test]
    fn rejects_wrong_secret_and_bad_hex() {
        let body = body(now());
        let sig = sign(b"another-secret-of-sufficient-len", &body).unwrap();
        assert!(matches!(
            verifier().verify(&body, &sig, now()),
            Err(CourierError::Signature(_))
        ));
        assert!(matches!(
            verifier().verify(&body, "not-hex", now()),
            Err(CourierError::Signature(_))
        ));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let body = body(now() - Duration::seconds(301));
        let sig = sign(SECRET, &body).unwrap();
        let err = verifier().verify(&body, &sig, now()).unwrap_err();
        assert!(err.to_string().contains("limit is 300s"), "{err}");
    }
}
