//! Razorpay webhook adapter
//!
//! Razorpay signs the raw webhook body with HMAC-SHA256 (hex) under the
//! webhook secret, delivered in `X-Razorpay-Signature`. Payment and order
//! entities arrive either wrapped (`{ "payment": { "entity": {...} } }`)
//! or as the bare entity, depending on the event source; both shapes are
//! accepted. Tenant and plan attribution rides in the `notes` object that
//! checkout attached at order-creation time.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use super::{payload_digest, PaymentEvent, PaymentEventType, ProviderAdapter, ProviderName};
use crate::error::{BillingError, BillingResult};

type HmacSha256 = Hmac<Sha256>;

/// Entity that may or may not be wrapped in `{ "entity": {...} }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MaybeWrapped<T> {
    Wrapped { entity: T },
    Direct(T),
}

impl<T> MaybeWrapped<T> {
    fn into_inner(self) -> T {
        match self {
            MaybeWrapped::Wrapped { entity } => entity,
            MaybeWrapped::Direct(entity) => entity,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    payload: Option<WebhookPayload>,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    payment: Option<MaybeWrapped<PaymentEntity>>,
    order: Option<MaybeWrapped<OrderEntity>>,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: Option<String>,
    #[serde(default)]
    notes: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OrderEntity {
    id: String,
    #[serde(default)]
    notes: serde_json::Value,
}

/// Razorpay sends `notes` as an object normally but as `[]` when empty.
fn note(notes: &serde_json::Value, key: &str) -> Option<String> {
    notes
        .as_object()
        .and_then(|map| map.get(key))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn attribution(notes: &serde_json::Value) -> BillingResult<(Uuid, Uuid)> {
    let tenant = note(notes, "tenant_id")
        .ok_or_else(|| BillingError::Unattributable("missing tenant_id in notes".to_string()))?;
    let plan = note(notes, "plan_id")
        .ok_or_else(|| BillingError::Unattributable("missing plan_id in notes".to_string()))?;

    let tenant_id = Uuid::parse_str(&tenant)
        .map_err(|_| BillingError::Unattributable(format!("malformed tenant_id: {tenant}")))?;
    let plan_id = Uuid::parse_str(&plan)
        .map_err(|_| BillingError::Unattributable(format!("malformed plan_id: {plan}")))?;

    Ok((tenant_id, plan_id))
}

/// Adapter for Razorpay payment webhooks.
pub struct RazorpayAdapter {
    webhook_secret: String,
}

impl RazorpayAdapter {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
        }
    }
}

impl ProviderAdapter for RazorpayAdapter {
    fn provider(&self) -> ProviderName {
        ProviderName::Razorpay
    }

    fn signature_header(&self) -> &'static str {
        "x-razorpay-signature"
    }

    fn verify_signature(&self, payload: &[u8], signature: &str) -> BillingResult<()> {
        if signature.is_empty() {
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes()).map_err(|_| {
            tracing::error!("Invalid Razorpay webhook secret");
            BillingError::WebhookSignatureInvalid
        })?;
        mac.update(payload);
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed != signature {
            tracing::warn!(
                received_sig_len = signature.len(),
                "Razorpay signature mismatch"
            );
            return Err(BillingError::WebhookSignatureInvalid);
        }

        Ok(())
    }

    fn normalize(&self, payload: &[u8]) -> BillingResult<Option<PaymentEvent>> {
        let envelope: WebhookEnvelope = serde_json::from_slice(payload)
            .map_err(|e| BillingError::InvalidPayload(format!("razorpay payload: {e}")))?;

        let event_type = match envelope.event.as_str() {
            "payment.captured" => PaymentEventType::PaymentCaptured,
            "payment.failed" => PaymentEventType::PaymentFailed,
            "order.paid" => PaymentEventType::OrderPaid,
            other => {
                tracing::debug!(event = %other, "Unhandled Razorpay event type");
                return Ok(None);
            }
        };

        let body = envelope
            .payload
            .ok_or_else(|| BillingError::InvalidPayload("razorpay payload missing".to_string()))?;

        let payment = body.payment.map(MaybeWrapped::into_inner);
        let order = body.order.map(MaybeWrapped::into_inner);

        let event = match event_type {
            PaymentEventType::PaymentCaptured | PaymentEventType::PaymentFailed => {
                let payment = payment.ok_or_else(|| {
                    BillingError::InvalidPayload("payment entity missing".to_string())
                })?;
                let (tenant_id, plan_id) = attribution(&payment.notes)?;
                let order_id = payment.order_id.unwrap_or_default();

                PaymentEvent {
                    provider: ProviderName::Razorpay,
                    event_type,
                    provider_order_id: order_id,
                    provider_payment_id: payment.id,
                    tenant_id,
                    plan_id,
                    raw_payload_digest: payload_digest(payload),
                }
            }
            PaymentEventType::OrderPaid => {
                let order = order.ok_or_else(|| {
                    BillingError::InvalidPayload("order entity missing".to_string())
                })?;
                let (tenant_id, plan_id) = attribution(&order.notes)?;
                // order.paid carries the settling payment alongside the order
                let payment_id = payment.map(|p| p.id).unwrap_or_default();

                PaymentEvent {
                    provider: ProviderName::Razorpay,
                    event_type,
                    provider_order_id: order.id,
                    provider_payment_id: payment_id,
                    tenant_id,
                    plan_id,
                    raw_payload_digest: payload_digest(payload),
                }
            }
        };

        Ok(Some(event))
    }
}
