//! Payment provider adapters
//!
//! Each adapter verifies the provider's webhook signature against the raw
//! request body and normalizes provider-specific payloads into a
//! provider-neutral [`PaymentEvent`]. Payload shapes are modeled as closed
//! unions per provider (direct object vs `{ entity: {...} }` wrapper), not
//! probed field-by-field at call sites.

pub mod razorpay;
pub mod stripe;

use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::BillingResult;

pub use razorpay::RazorpayAdapter;
pub use stripe::StripeAdapter;

/// Payment providers this engine accepts webhooks from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderName {
    Razorpay,
    Stripe,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Razorpay => "razorpay",
            ProviderName::Stripe => "stripe",
        }
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider-neutral payment event classes the lifecycle engine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEventType {
    PaymentCaptured,
    PaymentFailed,
    OrderPaid,
}

impl PaymentEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentEventType::PaymentCaptured => "payment_captured",
            PaymentEventType::PaymentFailed => "payment_failed",
            PaymentEventType::OrderPaid => "order_paid",
        }
    }
}

impl std::fmt::Display for PaymentEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider-neutral payment event. Constructed fresh per inbound webhook
/// call; never persisted beyond the idempotency record.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentEvent {
    pub provider: ProviderName,
    pub event_type: PaymentEventType,
    pub provider_order_id: String,
    pub provider_payment_id: String,
    pub tenant_id: Uuid,
    pub plan_id: Uuid,
    pub raw_payload_digest: String,
}

impl PaymentEvent {
    /// Natural idempotency key. Two deliveries describing the same payment
    /// on the same order at the same provider collapse to one key.
    pub fn idempotency_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.provider, self.provider_order_id, self.provider_payment_id
        )
    }
}

/// SHA-256 hex digest of a raw webhook body, kept on the idempotency record
/// for forensics.
pub fn payload_digest(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// A payment provider's webhook adapter.
///
/// `verify_signature` must run against the provider's raw, unparsed request
/// body before `normalize` is called; an event with a bad signature never
/// reaches the idempotency gate.
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> ProviderName;

    /// Header name carrying the signature for this provider.
    fn signature_header(&self) -> &'static str;

    fn verify_signature(&self, payload: &[u8], signature: &str) -> BillingResult<()>;

    /// Normalize a verified payload. `Ok(None)` means the event type is not
    /// one this engine acts on; `Err(Unattributable)` means the event can
    /// never be attributed to a tenant/plan and must be dropped.
    fn normalize(&self, payload: &[u8]) -> BillingResult<Option<PaymentEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_shape() {
        let event = PaymentEvent {
            provider: ProviderName::Razorpay,
            event_type: PaymentEventType::PaymentCaptured,
            provider_order_id: "order_abc".to_string(),
            provider_payment_id: "pay_xyz".to_string(),
            tenant_id: Uuid::nil(),
            plan_id: Uuid::nil(),
            raw_payload_digest: String::new(),
        };
        assert_eq!(event.idempotency_key(), "razorpay:order_abc:pay_xyz");
    }

    #[test]
    fn test_idempotency_key_distinguishes_providers() {
        let mk = |provider| PaymentEvent {
            provider,
            event_type: PaymentEventType::OrderPaid,
            provider_order_id: "o1".to_string(),
            provider_payment_id: "p1".to_string(),
            tenant_id: Uuid::nil(),
            plan_id: Uuid::nil(),
            raw_payload_digest: String::new(),
        };
        assert_ne!(
            mk(ProviderName::Razorpay).idempotency_key(),
            mk(ProviderName::Stripe).idempotency_key()
        );
    }

    #[test]
    fn test_payload_digest_is_stable() {
        let body = br#"{"event":"payment.captured"}"#;
        assert_eq!(payload_digest(body), payload_digest(body));
        assert_ne!(payload_digest(body), payload_digest(b"{}"));
        assert_eq!(payload_digest(body).len(), 64);
    }
}
