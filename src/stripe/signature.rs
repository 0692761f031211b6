//! Webhook signature verification
//!
//! Stripe signs `"{timestamp}.{raw body}"` with HMAC-SHA256 and sends the
//! result in the `Stripe-Signature` header as `t=<unix>,v1=<hex>`. The
//! verifier recomputes the MAC over the exact bytes received. Callers must
//! hand over the body untouched: a body that went through a JSON
//! parse/serialize cycle will not verify.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::stripe::config::StripeWebhookConfig;
use crate::stripe::error::{StripeError, StripeResult};
use crate::stripe::events::StripeEvent;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Parsed `Stripe-Signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Signed timestamp (Unix seconds)
    pub timestamp: i64,
    /// All `v1` signatures; more than one appears during secret rotation
    pub signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parse `t=<timestamp>,v1=<hex>[,v1=<hex>][,v0=...]`
    pub fn parse(header: &str) -> StripeResult<Self> {
        let header = header.trim();
        if header.is_empty() {
            return Err(StripeError::MissingSignature);
        }

        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                StripeError::InvalidSignatureHeader(format!("malformed element '{}'", part))
            })?;

            match key.trim() {
                "t" => {
                    let ts = value.trim().parse::<i64>().map_err(|_| {
                        StripeError::InvalidSignatureHeader("timestamp is not an integer".into())
                    })?;
                    timestamp = Some(ts);
                }
                "v1" => {
                    let sig = hex::decode(value.trim()).map_err(|_| {
                        StripeError::InvalidSignatureHeader("v1 signature is not hex".into())
                    })?;
                    signatures.push(sig);
                }
                // v0 and unknown schemes are ignored
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| StripeError::InvalidSignatureHeader("missing timestamp".into()))?;
        if signatures.is_empty() {
            return Err(StripeError::InvalidSignatureHeader(
                "missing v1 signature".into(),
            ));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Verifies inbound webhook deliveries against the shared signing secret
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: i64,
    require_livemode: bool,
}

impl SignatureVerifier {
    /// Create a verifier with the given secret and timestamp tolerance
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: i64::try_from(tolerance.as_secs()).unwrap_or(i64::MAX),
            require_livemode: false,
        }
    }

    /// Build from webhook config
    pub fn from_config(config: &StripeWebhookConfig) -> Self {
        let mut verifier = Self::new(config.webhook_secret.clone(), config.tolerance);
        verifier.require_livemode = config.require_livemode;
        verifier
    }

    /// Verify `payload` against `header` using the current clock
    pub fn verify(&self, payload: &[u8], header: &str) -> StripeResult<()> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
    }

    /// Verify `payload` against `header` as of `now` (Unix seconds)
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> StripeResult<()> {
        let parsed = SignatureHeader::parse(header)?;

        let age = now.saturating_sub(parsed.timestamp);
        if age.abs() > self.tolerance_secs {
            tracing::warn!(
                event_timestamp = parsed.timestamp,
                current_time = now,
                age_secs = age,
                "Webhook timestamp outside tolerance"
            );
            return Err(StripeError::TimestampOutOfTolerance {
                age_secs: age,
                tolerance_secs: self.tolerance_secs,
            });
        }

        let expected = self.compute(parsed.timestamp, payload)?;
        let matched = parsed
            .signatures
            .iter()
            .any(|candidate| bool::from(expected.as_slice().ct_eq(candidate.as_slice())));

        if !matched {
            tracing::warn!(
                event_timestamp = parsed.timestamp,
                candidates = parsed.signatures.len(),
                "Webhook signature mismatch"
            );
            return Err(StripeError::SignatureMismatch);
        }

        Ok(())
    }

    /// Verify, then parse the raw bytes into a typed event
    pub fn verify_and_parse(&self, payload: &[u8], header: &str) -> StripeResult<StripeEvent> {
        self.verify(payload, header)?;
        self.parse_verified(payload)
    }

    /// Same as [`verify_and_parse`](Self::verify_and_parse) with an explicit clock
    pub fn verify_and_parse_at(
        &self,
        payload: &[u8],
        header: &str,
        now: i64,
    ) -> StripeResult<StripeEvent> {
        self.verify_at(payload, header, now)?;
        self.parse_verified(payload)
    }

    /// Produce a `Stripe-Signature` header value for `payload`.
    ///
    /// Used by tests and local tooling to forge deliveries for a known secret.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> StripeResult<String> {
        let mac = self.compute(timestamp, payload)?;
        Ok(format!("t={},v1={}", timestamp, hex::encode(mac)))
    }

    fn parse_verified(&self, payload: &[u8]) -> StripeResult<StripeEvent> {
        let event = StripeEvent::from_bytes(payload)?;
        if self.require_livemode && !event.livemode {
            tracing::warn!(event_id = %event.id, "Rejected test mode event");
            return Err(StripeError::LivemodeRequired);
        }
        Ok(event)
    }

    fn compute(&self, timestamp: i64, payload: &[u8]) -> StripeResult<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| StripeError::InternalError(format!("HMAC key rejected: {}", e)))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}
