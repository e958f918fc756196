//! Trial usage ceilings
//!
//! Counts are computed fresh per call against the live tables — no running
//! counters to drift under concurrent creates and deletes. Soft-deleted
//! rows never count.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;
use crate::subscriptions::SubscriptionService;
use visitflow_shared::{ResourceKind, SubscriptionStatus};

/// Per-resource ceilings enforced while a tenant is trialing.
#[derive(Debug, Clone, Copy)]
pub struct TrialLimits {
    pub employees: i64,
    pub visitors: i64,
    pub appointments: i64,
}

pub const TRIAL_LIMITS: TrialLimits = TrialLimits {
    employees: 5,
    visitors: 100,
    appointments: 50,
};

impl TrialLimits {
    pub fn ceiling(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::Employee => self.employees,
            ResourceKind::Visitor => self.visitors,
            ResourceKind::Appointment => self.appointments,
        }
    }
}

/// Decision returned by the trial gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum LimitDecision {
    Allowed,
    Denied {
        kind: ResourceKind,
        limit: i64,
        current: i64,
    },
}

impl LimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, LimitDecision::Allowed)
    }

    /// "5/5" style message for the caller's error rendering.
    pub fn deny_message(&self) -> Option<String> {
        match self {
            LimitDecision::Allowed => None,
            LimitDecision::Denied {
                kind,
                limit,
                current,
            } => Some(format!(
                "Trial limit reached for {kind}s: {current}/{limit} used. Upgrade to add more."
            )),
        }
    }
}

/// Pure ceiling check, separated from counting so it can be exercised
/// without a store.
pub fn evaluate(kind: ResourceKind, current: i64, limit: i64) -> LimitDecision {
    if current >= limit {
        LimitDecision::Denied {
            kind,
            limit,
            current,
        }
    } else {
        LimitDecision::Allowed
    }
}

/// On-demand counts of a tenant's countable resources.
#[derive(Debug, Clone, Serialize)]
pub struct TrialUsageSnapshot {
    pub employees: i64,
    pub employees_limit: i64,
    pub visitors: i64,
    pub visitors_limit: i64,
    pub appointments: i64,
    pub appointments_limit: i64,
}

/// Count one resource kind for a tenant, non-deleted rows only.
pub async fn count_active(
    pool: &PgPool,
    tenant_id: Uuid,
    kind: ResourceKind,
) -> BillingResult<i64> {
    let count: (i64,) = match kind {
        ResourceKind::Employee => {
            sqlx::query_as(
                r#"
                SELECT COUNT(*) FROM employees
                WHERE creator_account_id = $1 AND deleted_at IS NULL
                "#,
            )
            .bind(tenant_id)
            .fetch_one(pool)
            .await?
        }
        ResourceKind::Visitor => {
            sqlx::query_as(
                r#"
                SELECT COUNT(*) FROM visitors
                WHERE tenant_id = $1 AND deleted_at IS NULL
                "#,
            )
            .bind(tenant_id)
            .fetch_one(pool)
            .await?
        }
        ResourceKind::Appointment => {
            sqlx::query_as(
                r#"
                SELECT COUNT(*) FROM appointments
                WHERE tenant_id = $1 AND deleted_at IS NULL
                "#,
            )
            .bind(tenant_id)
            .fetch_one(pool)
            .await?
        }
    };

    Ok(count.0)
}

/// Counts for all three kinds, with their ceilings.
pub async fn usage_snapshot(pool: &PgPool, tenant_id: Uuid) -> BillingResult<TrialUsageSnapshot> {
    let employees = count_active(pool, tenant_id, ResourceKind::Employee).await?;
    let visitors = count_active(pool, tenant_id, ResourceKind::Visitor).await?;
    let appointments = count_active(pool, tenant_id, ResourceKind::Appointment).await?;

    Ok(TrialUsageSnapshot {
        employees,
        employees_limit: TRIAL_LIMITS.employees,
        visitors,
        visitors_limit: TRIAL_LIMITS.visitors,
        appointments,
        appointments_limit: TRIAL_LIMITS.appointments,
    })
}

/// Gate consulted before create-operations on counted resources.
#[derive(Clone)]
pub struct TrialLimitService {
    pool: PgPool,
    subscriptions: SubscriptionService,
}

impl TrialLimitService {
    pub fn new(pool: PgPool, subscriptions: SubscriptionService) -> Self {
        Self {
            pool,
            subscriptions,
        }
    }

    /// Check whether the tenant may create one more resource of `kind`.
    ///
    /// Ceilings only bind while the subscription is explicitly `trialing`.
    /// A tenant with no subscription record fails open: absence is not a
    /// reason to block first-time usage.
    pub async fn check_limit(
        &self,
        tenant_id: Uuid,
        kind: ResourceKind,
    ) -> BillingResult<LimitDecision> {
        let sub = self.subscriptions.get_active_subscription(tenant_id).await?;

        let trialing = matches!(
            &sub,
            Some(sub) if sub.status == SubscriptionStatus::Trialing
        );
        if !trialing {
            return Ok(LimitDecision::Allowed);
        }

        let current = count_active(&self.pool, tenant_id, kind).await?;
        let decision = evaluate(kind, current, TRIAL_LIMITS.ceiling(kind));

        if let LimitDecision::Denied { limit, current, .. } = &decision {
            tracing::info!(
                tenant_id = %tenant_id,
                kind = %kind,
                current = current,
                limit = limit,
                "Trial limit reached"
            );
        }

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denies_exactly_at_ceiling() {
        for kind in ResourceKind::all() {
            let limit = TRIAL_LIMITS.ceiling(kind);
            assert!(evaluate(kind, limit - 1, limit).is_allowed());
            assert!(!evaluate(kind, limit, limit).is_allowed());
            assert!(!evaluate(kind, limit + 1, limit).is_allowed());
        }
    }

    #[test]
    fn test_deny_carries_ceiling_and_count() {
        let decision = evaluate(ResourceKind::Employee, 5, 5);
        assert_eq!(
            decision,
            LimitDecision::Denied {
                kind: ResourceKind::Employee,
                limit: 5,
                current: 5,
            }
        );
        let msg = decision.deny_message().unwrap();
        assert!(msg.contains("5/5"), "message should cite usage: {msg}");
    }

    #[test]
    fn test_allowed_has_no_message() {
        assert_eq!(evaluate(ResourceKind::Visitor, 0, 100).deny_message(), None);
    }

    #[test]
    fn test_ceilings() {
        assert_eq!(TRIAL_LIMITS.ceiling(ResourceKind::Employee), 5);
        assert_eq!(TRIAL_LIMITS.ceiling(ResourceKind::Visitor), 100);
        assert_eq!(TRIAL_LIMITS.ceiling(ResourceKind::Appointment), 50);
    }
}
