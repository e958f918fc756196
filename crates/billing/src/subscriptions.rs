//! Subscription store and lifecycle orchestration
//!
//! This is the ONLY writer of subscription records. All lifecycle
//! transitions (free trial, paid activation, cancellation, payment
//! failure, expiry sweep) go through `SubscriptionService`. The store
//! invariant — at most one live subscription per tenant — is enforced
//! three ways: a partial unique index on the table, a per-tenant advisory
//! lock around supersede-then-insert, and monotonic status transitions
//! that never resurrect a terminal record.

use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::limits::{self, TrialUsageSnapshot};
use crate::plans::PlanRecord;
use visitflow_shared::{BillingCycle, PlanType, SubscriptionStatus};

/// Default free-trial length in days, overridable via `TRIAL_PERIOD_DAYS`.
pub const DEFAULT_TRIAL_PERIOD_DAYS: i64 = 14;

/// A tenant's subscription record.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub status: SubscriptionStatus,
    pub plan_type: PlanType,
    pub billing_cycle: BillingCycle,
    pub amount_cents: i64,
    pub currency: String,
    pub start_date: OffsetDateTime,
    pub end_date: Option<OffsetDateTime>,
    pub trial_end_date: Option<OffsetDateTime>,
    pub is_auto_renew: bool,
    pub provider_name: Option<String>,
    pub provider_customer_id: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub provider_order_id: Option<String>,
    pub provider_payment_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const SUBSCRIPTION_COLUMNS: &str = r#"
    id, tenant_id, plan_id, status, plan_type, billing_cycle, amount_cents,
    currency, start_date, end_date, trial_end_date, is_auto_renew,
    provider_name, provider_customer_id, provider_subscription_id,
    provider_order_id, provider_payment_id, metadata, created_at, updated_at
"#;

/// Parameters for activating a paid subscription from a payment event.
#[derive(Debug, Clone)]
pub struct PaidActivation {
    pub tenant_id: Uuid,
    pub plan: PlanRecord,
    pub provider_name: String,
    pub provider_order_id: String,
    pub provider_payment_id: String,
    pub provider_customer_id: Option<String>,
}

/// Result of a paid activation: the record plus whether this call created it.
#[derive(Debug, Clone)]
pub struct ActivationResult {
    pub subscription: Subscription,
    pub newly_created: bool,
}

/// Trial state as rendered to the tenant.
#[derive(Debug, Clone, Serialize)]
pub struct TrialStatus {
    pub is_trialing: bool,
    pub trial_end_date: Option<OffsetDateTime>,
    pub days_remaining: i64,
    pub usage: TrialUsageSnapshot,
}

/// Lifecycle orchestrator over the subscription store.
#[derive(Clone)]
pub struct SubscriptionService {
    pool: PgPool,
    event_logger: BillingEventLogger,
    trial_period_days: i64,
}

impl SubscriptionService {
    pub fn new(pool: PgPool) -> Self {
        let trial_period_days = std::env::var("TRIAL_PERIOD_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TRIAL_PERIOD_DAYS);
        Self::with_trial_period(pool, trial_period_days)
    }

    pub fn with_trial_period(pool: PgPool, trial_period_days: i64) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self {
            pool,
            event_logger,
            trial_period_days,
        }
    }

    /// The tenant's live subscription, if any.
    pub async fn get_active_subscription(
        &self,
        tenant_id: Uuid,
    ) -> BillingResult<Option<Subscription>> {
        let sub: Option<Subscription> = sqlx::query_as(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE tenant_id = $1
              AND status IN ('trialing', 'active', 'past_due')
            "#
        ))
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sub)
    }

    /// Full subscription history for a tenant, newest first.
    pub async fn list_subscriptions(&self, tenant_id: Uuid) -> BillingResult<Vec<Subscription>> {
        let subs: Vec<Subscription> = sqlx::query_as(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(subs)
    }

    /// Assign a free trial to a tenant with no live subscription.
    ///
    /// Re-invoking while a free trial is already running returns the
    /// existing record. A live paid subscription is a `Conflict`.
    pub async fn create_free_trial(&self, tenant_id: Uuid) -> BillingResult<Subscription> {
        let mut tx = self.pool.begin().await?;
        lock_tenant(&mut tx, tenant_id).await?;

        let existing: Option<Subscription> = sqlx::query_as(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE tenant_id = $1
              AND status IN ('trialing', 'active', 'past_due')
            "#
        ))
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(sub) = existing {
            if sub.plan_type == PlanType::Free && sub.status == SubscriptionStatus::Trialing {
                tx.rollback().await?;
                tracing::debug!(tenant_id = %tenant_id, "Free trial already running");
                return Ok(sub);
            }
            tx.rollback().await?;
            return Err(BillingError::Conflict(format!(
                "tenant {tenant_id} already has a {} subscription",
                sub.status
            )));
        }

        let now = OffsetDateTime::now_utc();
        let trial_end = now + Duration::days(self.trial_period_days);

        let sub: Subscription = sqlx::query_as(&format!(
            r#"
            INSERT INTO subscriptions
                (tenant_id, status, plan_type, billing_cycle, amount_cents, currency,
                 start_date, end_date, trial_end_date, is_auto_renew)
            VALUES ($1, 'trialing', 'free', 'monthly', 0, 'INR', $2, $3, $3, FALSE)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(now)
        .bind(trial_end)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            tenant_id = %tenant_id,
            subscription_id = %sub.id,
            trial_end = %trial_end,
            "Free trial started"
        );

        self.log_event(
            BillingEventBuilder::new(tenant_id, BillingEventType::TrialStarted)
                .subscription(sub.id)
                .actor_type(ActorType::User)
                .data(serde_json::json!({ "trial_end_date": trial_end.to_string() })),
        )
        .await;

        Ok(sub)
    }

    /// Activate a paid subscription from a verified, deduplicated payment
    /// event. Supersedes any live record for the tenant.
    ///
    /// Idempotent on `(provider_order_id, provider_payment_id)`: a second
    /// call for the same payment returns the record created by the first
    /// and reports `newly_created = false`.
    pub async fn activate_paid_subscription(
        &self,
        params: PaidActivation,
    ) -> BillingResult<ActivationResult> {
        let mut tx = self.pool.begin().await?;
        lock_tenant(&mut tx, params.tenant_id).await?;

        // payment.captured and order.paid for the same purchase arrive as
        // separate events; whichever lands second must not supersede twice.
        let existing: Option<Subscription> = sqlx::query_as(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE provider_name = $1
              AND provider_order_id = $2
              AND provider_payment_id = $3
            "#
        ))
        .bind(&params.provider_name)
        .bind(&params.provider_order_id)
        .bind(&params.provider_payment_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(sub) = existing {
            tx.rollback().await?;
            tracing::info!(
                tenant_id = %params.tenant_id,
                subscription_id = %sub.id,
                order_id = %params.provider_order_id,
                "Subscription already exists for this payment"
            );
            return Ok(ActivationResult {
                subscription: sub,
                newly_created: false,
            });
        }

        // Supersede first, insert second: the worst interleaving leaves the
        // tenant briefly with zero live subscriptions, never two.
        let superseded = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'canceled', is_auto_renew = FALSE, updated_at = NOW()
            WHERE tenant_id = $1
              AND status IN ('trialing', 'active', 'past_due')
            "#,
        )
        .bind(params.tenant_id)
        .execute(&mut *tx)
        .await?;

        let now = OffsetDateTime::now_utc();
        let end_date = now + Duration::days(params.plan.billing_cycle.period_days());

        let sub: Subscription = sqlx::query_as(&format!(
            r#"
            INSERT INTO subscriptions
                (tenant_id, plan_id, status, plan_type, billing_cycle, amount_cents,
                 currency, start_date, end_date, is_auto_renew,
                 provider_name, provider_customer_id, provider_order_id, provider_payment_id)
            VALUES ($1, $2, 'active', $3, $4, $5, $6, $7, $8, TRUE, $9, $10, $11, $12)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(params.tenant_id)
        .bind(params.plan.id)
        .bind(params.plan.plan_type)
        .bind(params.plan.billing_cycle)
        .bind(params.plan.amount_cents)
        .bind(&params.plan.currency)
        .bind(now)
        .bind(end_date)
        .bind(&params.provider_name)
        .bind(&params.provider_customer_id)
        .bind(&params.provider_order_id)
        .bind(&params.provider_payment_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            tenant_id = %params.tenant_id,
            subscription_id = %sub.id,
            plan = %params.plan.name,
            superseded = superseded.rows_affected(),
            end_date = %end_date,
            "Paid subscription activated"
        );

        self.log_event(
            BillingEventBuilder::new(params.tenant_id, BillingEventType::SubscriptionActivated)
                .subscription(sub.id)
                .actor_type(ActorType::Provider)
                .provider(&params.provider_name, &params.provider_order_id)
                .data(serde_json::json!({
                    "plan_id": params.plan.id,
                    "plan_name": params.plan.name,
                    "superseded": superseded.rows_affected(),
                })),
        )
        .await;

        Ok(ActivationResult {
            subscription: sub,
            newly_created: true,
        })
    }

    /// Cancel a subscription. Allowed from any non-terminal state; auto
    /// renew is switched off so the record rides out its paid period.
    pub async fn cancel_subscription(&self, subscription_id: Uuid) -> BillingResult<Subscription> {
        let updated: Option<Subscription> = sqlx::query_as(&format!(
            r#"
            UPDATE subscriptions
            SET status = 'canceled', is_auto_renew = FALSE, updated_at = NOW()
            WHERE id = $1
              AND status IN ('trialing', 'active', 'past_due')
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(sub) => {
                tracing::info!(
                    tenant_id = %sub.tenant_id,
                    subscription_id = %sub.id,
                    "Subscription canceled"
                );
                self.log_event(
                    BillingEventBuilder::new(sub.tenant_id, BillingEventType::SubscriptionCanceled)
                        .subscription(sub.id)
                        .actor_type(ActorType::User),
                )
                .await;
                Ok(sub)
            }
            None => {
                // Distinguish missing from already-terminal for the caller.
                let exists: Option<(String,)> =
                    sqlx::query_as("SELECT status FROM subscriptions WHERE id = $1")
                        .bind(subscription_id)
                        .fetch_optional(&self.pool)
                        .await?;
                match exists {
                    Some((status,)) => Err(BillingError::Conflict(format!(
                        "subscription {subscription_id} is already {status}"
                    ))),
                    None => Err(BillingError::NotFound(format!(
                        "subscription {subscription_id} not found"
                    ))),
                }
            }
        }
    }

    /// Apply a payment failure to the tenant's live subscription. Terminal
    /// records are never touched; an already-past-due record stays as is.
    pub async fn mark_past_due(
        &self,
        tenant_id: Uuid,
        provider_name: &str,
        provider_order_id: &str,
    ) -> BillingResult<Option<Subscription>> {
        let updated: Option<Subscription> = sqlx::query_as(&format!(
            r#"
            UPDATE subscriptions
            SET status = 'past_due', updated_at = NOW()
            WHERE tenant_id = $1
              AND status IN ('trialing', 'active')
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(sub) = &updated {
            tracing::warn!(
                tenant_id = %tenant_id,
                subscription_id = %sub.id,
                provider = provider_name,
                "Subscription marked past due after payment failure"
            );
            self.log_event(
                BillingEventBuilder::new(tenant_id, BillingEventType::SubscriptionPastDue)
                    .subscription(sub.id)
                    .actor_type(ActorType::Provider)
                    .provider(provider_name, provider_order_id),
            )
            .await;
        }

        Ok(updated)
    }

    /// Expiry sweep: every live subscription whose end date has passed
    /// transitions to `expired`. Monotonic and safe to run concurrently
    /// with itself and with webhook-driven transitions; terminal records
    /// are never selected, so nothing is ever resurrected.
    pub async fn process_expired_subscriptions(&self) -> BillingResult<u64> {
        let expired: Vec<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            UPDATE subscriptions
            SET status = 'expired', is_auto_renew = FALSE, updated_at = NOW()
            WHERE status IN ('trialing', 'active', 'past_due')
              AND end_date IS NOT NULL
              AND end_date <= NOW()
            RETURNING id, tenant_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let count = expired.len() as u64;
        if count > 0 {
            tracing::info!(count = count, "Expired subscriptions swept");
        }

        for (subscription_id, tenant_id) in expired {
            self.log_event(
                BillingEventBuilder::new(tenant_id, BillingEventType::SubscriptionExpired)
                    .subscription(subscription_id)
                    .actor_type(ActorType::System),
            )
            .await;
        }

        Ok(count)
    }

    /// Trial state plus a fresh usage snapshot for "X of Y used" rendering.
    pub async fn get_trial_status(&self, tenant_id: Uuid) -> BillingResult<TrialStatus> {
        let sub = self.get_active_subscription(tenant_id).await?;
        let usage = limits::usage_snapshot(&self.pool, tenant_id).await?;

        let (is_trialing, trial_end_date) = match &sub {
            Some(sub) if sub.status == SubscriptionStatus::Trialing => (true, sub.trial_end_date),
            Some(_) | None => (false, None),
        };

        let days_remaining = trial_end_date
            .map(|end| (end - OffsetDateTime::now_utc()).whole_days().max(0))
            .unwrap_or(0);

        Ok(TrialStatus {
            is_trialing,
            trial_end_date,
            days_remaining,
            usage,
        })
    }

    /// Audit writes never fail the mutation they describe.
    async fn log_event(&self, event: BillingEventBuilder) {
        if let Err(e) = self.event_logger.log_event(event).await {
            tracing::warn!(error = %e, "Failed to write billing event");
        }
    }
}

/// Serialize lifecycle mutations per tenant without serializing unrelated
/// tenants against each other. Advisory locks release at transaction end.
async fn lock_tenant(tx: &mut Transaction<'_, Postgres>, tenant_id: Uuid) -> BillingResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(tenant_id.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(())
}
