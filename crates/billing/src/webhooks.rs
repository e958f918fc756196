//! Webhook ingestion: signature check, idempotency gate, orchestration
//!
//! Payment providers deliver at least once: duplicates, reordering and
//! truly concurrent redeliveries are all expected. The gate claims
//! exclusive processing rights with an atomic
//! `INSERT ... ON CONFLICT ... RETURNING` against the unique idempotency
//! key; only the claim winner orchestrates. Losers observe the prior
//! outcome without re-running side effects.

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::events::{
    ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType, BillingObserver,
    WebhookOutcome,
};
use crate::plans::PlanCatalog;
use crate::providers::{PaymentEvent, PaymentEventType, ProviderAdapter};
use crate::subscriptions::{PaidActivation, SubscriptionService};

/// Events stuck in `processing` longer than this are reclaimed: the worker
/// that claimed them died mid-flight.
const PROCESSING_TIMEOUT_MINUTES: i32 = 30;

/// Webhook handler shared by all provider ingress endpoints.
pub struct WebhookHandler {
    pool: PgPool,
    subscriptions: SubscriptionService,
    plans: PlanCatalog,
    event_logger: BillingEventLogger,
    observer: Arc<dyn BillingObserver>,
}

impl WebhookHandler {
    pub fn new(
        pool: PgPool,
        subscriptions: SubscriptionService,
        plans: PlanCatalog,
        observer: Arc<dyn BillingObserver>,
    ) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self {
            pool,
            subscriptions,
            plans,
            event_logger,
            observer,
        }
    }

    /// Handle one inbound webhook delivery end to end.
    ///
    /// Signature failures and unattributable payloads surface as errors for
    /// the HTTP layer to map (401/400); everything past the gate resolves
    /// to an outcome. A `Database` error after the claim leaves the record
    /// in `error` state, which a redelivery may reclaim.
    pub async fn handle(
        &self,
        adapter: &dyn ProviderAdapter,
        raw_body: &[u8],
        signature: &str,
    ) -> BillingResult<WebhookOutcome> {
        adapter.verify_signature(raw_body, signature)?;

        let event = match adapter.normalize(raw_body) {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(WebhookOutcome::Ignored),
            Err(e) => {
                // Unattributable or unparseable: redelivery cannot fix it.
                tracing::warn!(
                    provider = %adapter.provider(),
                    error = %e,
                    "Dropping webhook payload"
                );
                return Err(e);
            }
        };

        let key = event.idempotency_key();

        // Atomic claim: only one concurrent delivery for this key gets a
        // row back. Stuck 'processing' claims and failed attempts are
        // reclaimable; successful ones never are.
        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO payment_webhook_events
                (idempotency_key, provider, event_type, provider_order_id,
                 provider_payment_id, tenant_id, payload_digest,
                 processing_result, processing_started_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'processing', NOW())
            ON CONFLICT (idempotency_key) DO UPDATE SET
                processing_result = 'processing',
                processing_started_at = NOW()
            WHERE payment_webhook_events.processing_result = 'error'
               OR (payment_webhook_events.processing_result = 'processing'
                   AND payment_webhook_events.processing_started_at
                       < NOW() - ($8 || ' minutes')::INTERVAL)
            RETURNING id
            "#,
        )
        .bind(&key)
        .bind(event.provider.as_str())
        .bind(event.event_type.as_str())
        .bind(&event.provider_order_id)
        .bind(&event.provider_payment_id)
        .bind(event.tenant_id)
        .bind(&event.raw_payload_digest)
        .bind(PROCESSING_TIMEOUT_MINUTES)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(key = %key, error = %e, "Failed to claim webhook event");
            BillingError::Database(e.to_string())
        })?;

        if claimed.is_none() {
            let prior: Option<(String,)> = sqlx::query_as(
                "SELECT processing_result FROM payment_webhook_events WHERE idempotency_key = $1",
            )
            .bind(&key)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten();

            tracing::info!(
                key = %key,
                provider = %event.provider,
                prior_result = prior.as_ref().map(|(r,)| r.as_str()).unwrap_or("unknown"),
                "Duplicate webhook delivery deduplicated"
            );

            self.log_event(
                BillingEventBuilder::new(event.tenant_id, BillingEventType::WebhookDeduplicated)
                    .actor_type(ActorType::Provider)
                    .provider(event.provider.as_str(), &key),
            )
            .await;

            return Ok(WebhookOutcome::Deduplicated);
        }

        tracing::info!(
            key = %key,
            provider = %event.provider,
            event_type = %event.event_type,
            tenant_id = %event.tenant_id,
            "Processing webhook event (claimed exclusive rights)"
        );

        let result = self.apply(&event).await;

        let (processing_result, error_message) = match &result {
            Ok(_) => ("success".to_string(), None),
            Err(e) => ("error".to_string(), Some(e.to_string())),
        };
        self.record_outcome(&key, &processing_result, error_message.as_deref())
            .await;

        let outcome = result?;

        // Downstream notification fires exactly once per effect: replays
        // stop at the gate, and AlreadyActive means an earlier event for
        // the same payment already notified.
        match &outcome {
            WebhookOutcome::Activated { .. }
            | WebhookOutcome::MarkedPastDue { .. }
            | WebhookOutcome::FailureRecorded => {
                self.observer.observe(&event, &outcome);
            }
            _ => {}
        }

        Ok(outcome)
    }

    /// Apply a claimed event to the subscription store.
    async fn apply(&self, event: &PaymentEvent) -> BillingResult<WebhookOutcome> {
        match event.event_type {
            PaymentEventType::PaymentCaptured | PaymentEventType::OrderPaid => {
                let plan = self.plans.get_plan(event.plan_id).await?;
                let activation = self
                    .subscriptions
                    .activate_paid_subscription(PaidActivation {
                        tenant_id: event.tenant_id,
                        plan,
                        provider_name: event.provider.as_str().to_string(),
                        provider_order_id: event.provider_order_id.clone(),
                        provider_payment_id: event.provider_payment_id.clone(),
                        provider_customer_id: None,
                    })
                    .await?;

                if activation.newly_created {
                    Ok(WebhookOutcome::Activated {
                        subscription_id: activation.subscription.id,
                    })
                } else {
                    Ok(WebhookOutcome::AlreadyActive {
                        subscription_id: activation.subscription.id,
                    })
                }
            }
            PaymentEventType::PaymentFailed => {
                self.log_event(
                    BillingEventBuilder::new(event.tenant_id, BillingEventType::PaymentFailed)
                        .actor_type(ActorType::Provider)
                        .provider(event.provider.as_str(), &event.idempotency_key())
                        .data(serde_json::json!({
                            "order_id": event.provider_order_id,
                            "payment_id": event.provider_payment_id,
                        })),
                )
                .await;

                let marked = self
                    .subscriptions
                    .mark_past_due(
                        event.tenant_id,
                        event.provider.as_str(),
                        &event.provider_order_id,
                    )
                    .await?;

                match marked {
                    Some(sub) => Ok(WebhookOutcome::MarkedPastDue {
                        subscription_id: sub.id,
                    }),
                    None => Ok(WebhookOutcome::FailureRecorded),
                }
            }
        }
    }

    /// Update the idempotency record with the processing outcome, retrying
    /// once — the record is what keeps redeliveries honest.
    async fn record_outcome(&self, key: &str, result: &str, error_message: Option<&str>) {
        for attempt in 0..2 {
            let update = sqlx::query(
                r#"
                UPDATE payment_webhook_events
                SET processing_result = $1, error_message = $2
                WHERE idempotency_key = $3
                "#,
            )
            .bind(result)
            .bind(error_message)
            .bind(key)
            .execute(&self.pool)
            .await;

            match update {
                Ok(_) => return,
                Err(e) if attempt == 0 => {
                    tracing::warn!(
                        key = %key,
                        error = %e,
                        "Failed to update webhook outcome, retrying"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        key = %key,
                        intended_result = %result,
                        error = %e,
                        "CRITICAL: webhook outcome not recorded after retry; \
                         record may appear stuck in 'processing' until timeout recovery"
                    );
                }
            }
        }
    }

    async fn log_event(&self, event: BillingEventBuilder) {
        if let Err(e) = self.event_logger.log_event(event).await {
            tracing::warn!(error = %e, "Failed to write billing event");
        }
    }
}

/// Delete idempotency records older than the retention window. The window
/// must stay comfortably longer than any provider's maximum redelivery
/// window so a pruned key can never be redelivered.
pub async fn prune_webhook_events(pool: &PgPool, retention_days: i64) -> BillingResult<u64> {
    let result = sqlx::query(
        "DELETE FROM payment_webhook_events WHERE created_at < NOW() - ($1 || ' days')::INTERVAL",
    )
    .bind(retention_days)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
