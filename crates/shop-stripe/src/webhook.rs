//! # Stripe Webhook Handling
//!
//! Signature verification and event parsing for Stripe webhooks.
//! A verified `checkout.session.completed` event carries the session id
//! that the reconciler turns into an order.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use shop_core::{ShopError, ShopResult};
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Maximum clock skew accepted between Stripe and this server
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Events that should be enabled on the Stripe webhook endpoint
pub const REQUIRED_WEBHOOK_EVENTS: &[&str] = &[
    "checkout.session.completed",
    "checkout.session.async_payment_succeeded",
];

/// Verifies the `Stripe-Signature` header and parses the event
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance_secs(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verify against the current time
    pub fn verify(&self, payload: &[u8], signature: &str) -> ShopResult<StripeEvent> {
        self.verify_at(payload, signature, Utc::now().timestamp())
    }

    /// Verify against an explicit unix timestamp
    pub fn verify_at(&self, payload: &[u8], signature: &str, now: i64) -> ShopResult<StripeEvent> {
        let header = parse_signature_header(signature)?;

        if (now - header.timestamp).abs() > self.tolerance_secs {
            return Err(ShopError::WebhookVerificationFailed(
                "Timestamp outside tolerance".to_string(),
            ));
        }

        let valid = header
            .signatures
            .iter()
            .any(|sig| self.signature_matches(header.timestamp, payload, sig));

        if !valid {
            return Err(ShopError::WebhookVerificationFailed(
                "Signature mismatch".to_string(),
            ));
        }

        let event: StripeEvent = serde_json::from_slice(payload).map_err(|e| {
            ShopError::Serialization(format!("Failed to parse webhook: {}", e))
        })?;

        debug!("Verified Stripe webhook: id={}, type={}", event.id, event.event_type);
        Ok(event)
    }

    /// Constant-time comparison through `Mac::verify_slice`
    fn signature_matches(&self, timestamp: i64, payload: &[u8], signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    }
}

/// A verified Stripe event
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    /// Session id for events that mean a checkout session may now be paid
    pub fn checkout_session_id(&self) -> Option<&str> {
        match self.event_type.as_str() {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                self.data.object.get("id").and_then(|v| v.as_str())
            }
            _ => None,
        }
    }
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> ShopResult<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        ShopError::WebhookVerificationFailed("Missing timestamp in signature".to_string())
    })?;

    if signatures.is_empty() {
        return Err(ShopError::WebhookVerificationFailed(
            "No v1 signature found".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

/// Build a `Stripe-Signature` header for a payload, as Stripe would
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> ShopResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ShopError::Internal(format!("HMAC key rejected: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}
