//! Billing audit events
//!
//! Every lifecycle mutation leaves a `billing_events` row. The logger is
//! deliberately non-fatal: a failed audit write is logged and swallowed so
//! it can never roll back the mutation it describes.
//!
//! The `BillingObserver` trait is the seam between orchestration and
//! side-effecting observation (notifications, metrics). Tests install a
//! counting observer and assert on outcomes instead of scraping logs.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;
use crate::providers::{PaymentEvent, PaymentEventType};

/// What happened, for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingEventType {
    TrialStarted,
    SubscriptionActivated,
    SubscriptionCanceled,
    SubscriptionExpired,
    SubscriptionPastDue,
    PaymentFailed,
    WebhookDeduplicated,
    WebhookDropped,
}

impl BillingEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingEventType::TrialStarted => "trial_started",
            BillingEventType::SubscriptionActivated => "subscription_activated",
            BillingEventType::SubscriptionCanceled => "subscription_canceled",
            BillingEventType::SubscriptionExpired => "subscription_expired",
            BillingEventType::SubscriptionPastDue => "subscription_past_due",
            BillingEventType::PaymentFailed => "payment_failed",
            BillingEventType::WebhookDeduplicated => "webhook_deduplicated",
            BillingEventType::WebhookDropped => "webhook_dropped",
        }
    }
}

/// Who initiated the mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    Provider,
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::User => "user",
            ActorType::Provider => "provider",
            ActorType::System => "system",
        }
    }
}

/// Builder for a billing event row.
#[derive(Debug, Clone)]
pub struct BillingEventBuilder {
    tenant_id: Uuid,
    event_type: BillingEventType,
    actor_type: ActorType,
    provider_name: Option<String>,
    provider_event_key: Option<String>,
    subscription_id: Option<Uuid>,
    data: serde_json::Value,
}

impl BillingEventBuilder {
    pub fn new(tenant_id: Uuid, event_type: BillingEventType) -> Self {
        Self {
            tenant_id,
            event_type,
            actor_type: ActorType::System,
            provider_name: None,
            provider_event_key: None,
            subscription_id: None,
            data: serde_json::json!({}),
        }
    }

    pub fn actor_type(mut self, actor: ActorType) -> Self {
        self.actor_type = actor;
        self
    }

    pub fn provider(mut self, name: &str, event_key: &str) -> Self {
        self.provider_name = Some(name.to_string());
        self.provider_event_key = Some(event_key.to_string());
        self
    }

    pub fn subscription(mut self, subscription_id: Uuid) -> Self {
        self.subscription_id = Some(subscription_id);
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Writes billing events to the audit log.
#[derive(Clone)]
pub struct BillingEventLogger {
    pool: PgPool,
}

impl BillingEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn log_event(&self, event: BillingEventBuilder) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO billing_events
                (tenant_id, event_type, actor_type, provider_name, provider_event_key,
                 subscription_id, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.tenant_id)
        .bind(event.event_type.as_str())
        .bind(event.actor_type.as_str())
        .bind(&event.provider_name)
        .bind(&event.provider_event_key)
        .bind(event.subscription_id)
        .bind(&event.data)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Outcome of handling one webhook delivery, as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum WebhookOutcome {
    /// First delivery: a subscription was activated.
    Activated { subscription_id: Uuid },
    /// Attributed payment failure applied to the live subscription.
    MarkedPastDue { subscription_id: Uuid },
    /// Attributed failure with no live subscription to mark.
    FailureRecorded,
    /// A subscription for this order/payment already existed; no mutation.
    AlreadyActive { subscription_id: Uuid },
    /// The idempotency gate had already seen this key.
    Deduplicated,
    /// Event type the engine does not act on.
    Ignored,
}

/// Observation hook, separated from the orchestration path.
///
/// Called at most once per webhook delivery, after the outcome is durable.
/// Implementations must not block the webhook response on slow work; hand
/// off to a queue or task instead.
pub trait BillingObserver: Send + Sync {
    fn observe(&self, event: &PaymentEvent, outcome: &WebhookOutcome);
}

/// Default observer: structured logs only.
pub struct TracingObserver;

impl BillingObserver for TracingObserver {
    fn observe(&self, event: &PaymentEvent, outcome: &WebhookOutcome) {
        match event.event_type {
            PaymentEventType::PaymentFailed => tracing::warn!(
                provider = %event.provider,
                tenant_id = %event.tenant_id,
                order_id = %event.provider_order_id,
                outcome = ?outcome,
                "Payment event observed"
            ),
            _ => tracing::info!(
                provider = %event.provider,
                tenant_id = %event.tenant_id,
                order_id = %event.provider_order_id,
                outcome = ?outcome,
                "Payment event observed"
            ),
        }
    }
}
