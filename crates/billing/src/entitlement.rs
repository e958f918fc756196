//! Entitlement decisions
//!
//! Pure predicates over a subscription record plus gate wrappers for the
//! access-control boundary. The predicates never touch the store; the same
//! inputs always produce the same answer. A tenant with no subscription
//! record is never entitled — callers must not infer free access from
//! absence.

use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::subscriptions::{Subscription, SubscriptionService};
use visitflow_shared::SubscriptionStatus;

/// Whether the subscription grants access at `now`.
///
/// `past_due` still counts: billing trouble degrades, it does not cut off.
pub fn is_active(sub: &Subscription, now: OffsetDateTime) -> bool {
    if !sub.status.is_live() {
        return false;
    }
    match sub.end_date {
        Some(end) => end > now,
        None => true,
    }
}

/// Whether the subscription is on a paid tier.
pub fn is_premium(sub: &Subscription) -> bool {
    sub.plan_type.is_paid()
}

pub fn is_trialing(sub: &Subscription) -> bool {
    sub.status == SubscriptionStatus::Trialing
}

/// Entitlement gates that load the current record and fail the caller's
/// request with `Forbidden` instead of returning a boolean.
#[derive(Clone)]
pub struct EntitlementService {
    subscriptions: SubscriptionService,
}

impl EntitlementService {
    pub fn new(subscriptions: SubscriptionService) -> Self {
        Self { subscriptions }
    }

    /// Require any active (or trialing/past-due, unexpired) subscription.
    pub async fn require_active(&self, tenant_id: Uuid) -> BillingResult<Subscription> {
        let sub = self.load(tenant_id).await?;
        if !is_active(&sub, OffsetDateTime::now_utc()) {
            return Err(BillingError::Forbidden(
                "Subscription is not active. Choose a plan to continue.".to_string(),
            ));
        }
        Ok(sub)
    }

    /// Require an active subscription on a paid tier.
    pub async fn require_premium(&self, tenant_id: Uuid) -> BillingResult<Subscription> {
        let sub = self.require_active(tenant_id).await?;
        if !is_premium(&sub) {
            return Err(BillingError::Forbidden(
                "This feature requires a paid plan. Upgrade to continue.".to_string(),
            ));
        }
        Ok(sub)
    }

    /// Require an active subscription on one specific plan.
    pub async fn require_plan(&self, tenant_id: Uuid, plan_id: Uuid) -> BillingResult<Subscription> {
        let sub = self.require_active(tenant_id).await?;
        if sub.plan_id != Some(plan_id) {
            return Err(BillingError::Forbidden(
                "Your current plan does not include this feature.".to_string(),
            ));
        }
        Ok(sub)
    }

    async fn load(&self, tenant_id: Uuid) -> BillingResult<Subscription> {
        self.subscriptions
            .get_active_subscription(tenant_id)
            .await?
            .ok_or_else(|| {
                BillingError::Forbidden(
                    "No subscription found. Choose a plan to continue.".to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use visitflow_shared::{BillingCycle, PlanType};

    fn subscription(
        status: SubscriptionStatus,
        plan_type: PlanType,
        end_date: Option<OffsetDateTime>,
    ) -> Subscription {
        let now = OffsetDateTime::now_utc();
        Subscription {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            plan_id: (plan_type != PlanType::Free).then(Uuid::new_v4),
            status,
            plan_type,
            billing_cycle: BillingCycle::Monthly,
            amount_cents: 0,
            currency: "INR".to_string(),
            start_date: now,
            end_date,
            trial_end_date: None,
            is_auto_renew: false,
            provider_name: None,
            provider_customer_id: None,
            provider_subscription_id: None,
            provider_order_id: None,
            provider_payment_id: None,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_live_statuses_are_active_without_end_date() {
        let now = OffsetDateTime::now_utc();
        for status in [
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
        ] {
            let sub = subscription(status, PlanType::Standard, None);
            assert!(is_active(&sub, now), "{status} should be active");
        }
    }

    #[test]
    fn test_terminal_statuses_are_never_active() {
        let now = OffsetDateTime::now_utc();
        let future = Some(now + Duration::days(30));
        for status in [SubscriptionStatus::Canceled, SubscriptionStatus::Expired] {
            let sub = subscription(status, PlanType::Premium, future);
            assert!(!is_active(&sub, now), "{status} should not be active");
        }
    }

    #[test]
    fn test_past_end_date_deactivates() {
        let now = OffsetDateTime::now_utc();
        let sub = subscription(
            SubscriptionStatus::Active,
            PlanType::Standard,
            Some(now - Duration::seconds(1)),
        );
        assert!(!is_active(&sub, now));
    }

    #[test]
    fn test_end_date_boundary_is_exclusive() {
        let now = OffsetDateTime::now_utc();
        let sub = subscription(SubscriptionStatus::Active, PlanType::Standard, Some(now));
        // end_date == now is expired; strictly-greater keeps access
        assert!(!is_active(&sub, now));
        assert!(is_active(&sub, now - Duration::seconds(1)));
    }

    #[test]
    fn test_premium_tracks_plan_type() {
        let free = subscription(SubscriptionStatus::Trialing, PlanType::Free, None);
        let paid = subscription(SubscriptionStatus::Active, PlanType::Premium, None);
        assert!(!is_premium(&free));
        assert!(is_premium(&paid));
    }

    #[test]
    fn test_paid_plan_can_be_trialing() {
        let sub = subscription(SubscriptionStatus::Trialing, PlanType::Premium, None);
        assert!(is_trialing(&sub));
        assert!(is_premium(&sub));
    }
}
