//! Stripe webhook adapter
//!
//! Verifies the `Stripe-Signature` header manually: parse
//! `t=timestamp,v1=signature`, reject stale timestamps, then HMAC-SHA256
//! the `{timestamp}.{payload}` signed string. Payloads are parsed with
//! thin serde structs instead of a full Stripe SDK event model, which
//! keeps normalization independent of the provider's API version churn.
//! Tenant and plan attribution rides in the `metadata` object attached at
//! checkout-session-creation time.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use super::{payload_digest, PaymentEvent, PaymentEventType, ProviderAdapter, ProviderName};
use crate::error::{BillingError, BillingResult};

type HmacSha256 = Hmac<Sha256>;

/// Signature timestamp tolerance (5 minutes).
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Minimal envelope: the event type alone decides whether the rest of the
/// payload is worth parsing.
#[derive(Debug, Deserialize)]
struct EventKind {
    #[serde(rename = "type")]
    event_type: String,
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: ObjectShape,
}

/// The event object arrives either as the bare object or wrapped in
/// `{ "entity": {...} }` by intermediary delivery tooling.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ObjectShape {
    Wrapped { entity: EventObject },
    Direct(EventObject),
}

impl ObjectShape {
    fn into_inner(self) -> EventObject {
        match self {
            ObjectShape::Wrapped { entity } => entity,
            ObjectShape::Direct(object) => object,
        }
    }
}

/// The subset of checkout-session / payment-intent fields normalization
/// reads. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct EventObject {
    id: String,
    payment_intent: Option<String>,
    latest_charge: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
}

fn metadata_value(metadata: &serde_json::Value, key: &str) -> Option<String> {
    metadata
        .as_object()
        .and_then(|map| map.get(key))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn attribution(metadata: &serde_json::Value) -> BillingResult<(Uuid, Uuid)> {
    let tenant = metadata_value(metadata, "tenant_id").ok_or_else(|| {
        BillingError::Unattributable("missing tenant_id in metadata".to_string())
    })?;
    let plan = metadata_value(metadata, "plan_id")
        .ok_or_else(|| BillingError::Unattributable("missing plan_id in metadata".to_string()))?;

    let tenant_id = Uuid::parse_str(&tenant)
        .map_err(|_| BillingError::Unattributable(format!("malformed tenant_id: {tenant}")))?;
    let plan_id = Uuid::parse_str(&plan)
        .map_err(|_| BillingError::Unattributable(format!("malformed plan_id: {plan}")))?;

    Ok((tenant_id, plan_id))
}

/// Adapter for Stripe payment webhooks.
pub struct StripeAdapter {
    webhook_secret: String,
}

impl StripeAdapter {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
        }
    }

    /// Verification against an explicit clock, so tests can pin time.
    fn verify_at(&self, payload: &[u8], signature: &str, now_unix: i64) -> BillingResult<()> {
        // Header shape: t=timestamp,v1=signature[,v0=...]
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<String> = None;

        for part in signature.split(',') {
            let kv: Vec<&str> = part.splitn(2, '=').collect();
            if kv.len() == 2 {
                match kv[0] {
                    "t" => timestamp = kv[1].parse().ok(),
                    "v1" => v1_signature = Some(kv[1].to_string()),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            tracing::warn!("Missing timestamp in Stripe signature header");
            BillingError::WebhookSignatureInvalid
        })?;

        let v1_signature = v1_signature.ok_or_else(|| {
            tracing::warn!("Missing v1 signature in Stripe signature header");
            BillingError::WebhookSignatureInvalid
        })?;

        if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            tracing::warn!(
                timestamp = timestamp,
                now = now_unix,
                "Stripe webhook timestamp outside tolerance"
            );
            return Err(BillingError::WebhookSignatureInvalid);
        }

        // The secret's "whsec_" prefix is not part of the key material.
        let secret_key = self
            .webhook_secret
            .strip_prefix("whsec_")
            .unwrap_or(&self.webhook_secret);

        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).map_err(|_| {
            tracing::error!("Invalid Stripe webhook secret key");
            BillingError::WebhookSignatureInvalid
        })?;
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed != v1_signature {
            tracing::warn!("Stripe signature mismatch");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        Ok(())
    }
}

impl ProviderAdapter for StripeAdapter {
    fn provider(&self) -> ProviderName {
        ProviderName::Stripe
    }

    fn signature_header(&self) -> &'static str {
        "stripe-signature"
    }

    fn verify_signature(&self, payload: &[u8], signature: &str) -> BillingResult<()> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|_| BillingError::WebhookSignatureInvalid)?
            .as_secs() as i64;
        self.verify_at(payload, signature, now)
    }

    fn normalize(&self, payload: &[u8]) -> BillingResult<Option<PaymentEvent>> {
        let kind: EventKind = serde_json::from_slice(payload)
            .map_err(|e| BillingError::InvalidPayload(format!("stripe payload: {e}")))?;

        let event_type = match kind.event_type.as_str() {
            "checkout.session.completed" => PaymentEventType::OrderPaid,
            "payment_intent.succeeded" => PaymentEventType::PaymentCaptured,
            "payment_intent.payment_failed" => PaymentEventType::PaymentFailed,
            other => {
                tracing::debug!(event = %other, "Unhandled Stripe event type");
                return Ok(None);
            }
        };

        let envelope: EventEnvelope = serde_json::from_slice(payload)
            .map_err(|e| BillingError::InvalidPayload(format!("stripe payload: {e}")))?;
        let object = envelope.data.object.into_inner();
        let (tenant_id, plan_id) = attribution(&object.metadata)?;

        let (order_id, payment_id) = match event_type {
            // Checkout session id is the order; the intent settles it.
            PaymentEventType::OrderPaid => {
                let payment = object.payment_intent.clone().unwrap_or_default();
                (object.id, payment)
            }
            // Intent-level events: the intent is the order, the charge the
            // payment (falling back to the intent id for older API shapes).
            PaymentEventType::PaymentCaptured | PaymentEventType::PaymentFailed => {
                let payment = object
                    .latest_charge
                    .clone()
                    .unwrap_or_else(|| object.id.clone());
                (object.id, payment)
            }
        };

        Ok(Some(PaymentEvent {
            provider: ProviderName::Stripe,
            event_type,
            provider_order_id: order_id,
            provider_payment_id: payment_id,
            tenant_id,
            plan_id,
            raw_payload_digest: payload_digest(payload),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let key = secret.strip_prefix("whsec_").unwrap_or(secret);
        let mut mac = HmacSha256::new_from_slice(key.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature_accepted() {
        let adapter = StripeAdapter::new("whsec_test123secret456");
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = sign(payload, "whsec_test123secret456", 1_700_000_000);
        assert!(adapter.verify_at(payload, &header, 1_700_000_000).is_ok());
    }

    #[test]
    fn test_signature_at_tolerance_boundary() {
        let adapter = StripeAdapter::new("whsec_test123secret456");
        let payload = b"{}";
        let header = sign(payload, "whsec_test123secret456", 1_700_000_000);

        // 300s old: accepted. 301s old: rejected.
        assert!(adapter
            .verify_at(payload, &header, 1_700_000_000 + 300)
            .is_ok());
        assert!(adapter
            .verify_at(payload, &header, 1_700_000_000 + 301)
            .is_err());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let adapter = StripeAdapter::new("whsec_test123secret456");
        let header = sign(b"{}", "whsec_test123secret456", 1_700_000_000);
        assert!(adapter
            .verify_at(b"{\"x\":1}", &header, 1_700_000_000)
            .is_err());
    }

    #[test]
    fn test_header_without_v1_rejected() {
        let adapter = StripeAdapter::new("whsec_test123secret456");
        assert!(adapter
            .verify_at(b"{}", "t=1700000000", 1_700_000_000)
            .is_err());
    }
}
