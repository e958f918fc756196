//! Common types used across VisitFlow

use serde::{Deserialize, Serialize};

/// Subscription lifecycle status.
///
/// `Trialing`, `Active` and `PastDue` are the "live" states: a tenant may
/// hold at most one subscription in a live state at any instant (enforced
/// by a partial unique index on the subscriptions table). `Canceled` and
/// `Expired` are terminal and are never resurrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    /// Whether this status counts toward the one-live-subscription-per-tenant
    /// invariant.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trialing
                | SubscriptionStatus::Active
                | SubscriptionStatus::PastDue
        )
    }

    /// Terminal states stay terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Canceled | SubscriptionStatus::Expired
        )
    }

    /// Whether a transition to `next` is allowed. Transitions out of a
    /// terminal state are never allowed; everything else is monotonic
    /// toward cancellation/expiry.
    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if *self == next {
            return false;
        }
        match next {
            SubscriptionStatus::Trialing => false,
            SubscriptionStatus::Active => true,
            SubscriptionStatus::PastDue => true,
            SubscriptionStatus::Canceled => true,
            SubscriptionStatus::Expired => true,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "active" => Ok(SubscriptionStatus::Active),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            "expired" => Ok(SubscriptionStatus::Expired),
            other => Err(format!("unknown subscription status: {other}")),
        }
    }
}

/// Plan pricing class. `Free` is the trial plan; everything else is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum PlanType {
    Free,
    Standard,
    Premium,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Free => "free",
            PlanType::Standard => "standard",
            PlanType::Premium => "premium",
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, PlanType::Free)
    }
}

impl std::fmt::Display for PlanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PlanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(PlanType::Free),
            "standard" => Ok(PlanType::Standard),
            "premium" => Ok(PlanType::Premium),
            other => Err(format!("unknown plan type: {other}")),
        }
    }
}

/// Billing cycle for paid plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Quarterly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Quarterly => "quarterly",
            BillingCycle::Yearly => "yearly",
        }
    }

    /// Length of one paid period in days. Calendar-month arithmetic is not
    /// worth the edge cases for subscription expiry; fixed-day periods match
    /// what the payment providers bill.
    pub fn period_days(&self) -> i64 {
        match self {
            BillingCycle::Monthly => 30,
            BillingCycle::Quarterly => 90,
            BillingCycle::Yearly => 365,
        }
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BillingCycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(BillingCycle::Monthly),
            "quarterly" => Ok(BillingCycle::Quarterly),
            "yearly" => Ok(BillingCycle::Yearly),
            other => Err(format!("unknown billing cycle: {other}")),
        }
    }
}

/// Tenant-scoped resource kinds that trial ceilings apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Employee,
    Visitor,
    Appointment,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Employee => "employee",
            ResourceKind::Visitor => "visitor",
            ResourceKind::Appointment => "appointment",
        }
    }

    pub fn all() -> [ResourceKind; 3] {
        [
            ResourceKind::Employee,
            ResourceKind::Visitor,
            ResourceKind::Appointment,
        ]
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "employee" | "employees" => Ok(ResourceKind::Employee),
            "visitor" | "visitors" => Ok(ResourceKind::Visitor),
            "appointment" | "appointments" => Ok(ResourceKind::Appointment),
            other => Err(format!("unknown resource kind: {other}")),
        }
    }
}

/// Role carried on an account record. Admins own a tenant; employees act on
/// behalf of the admin that created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum AccountRole {
    Admin,
    Employee,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::Admin => "admin",
            AccountRole::Employee => "employee",
        }
    }
}

impl std::fmt::Display for AccountRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AccountRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(AccountRole::Admin),
            "employee" => Ok(AccountRole::Employee),
            other => Err(format!("unknown account role: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Expired,
        ] {
            assert_eq!(
                SubscriptionStatus::from_str(status.as_str()).unwrap(),
                status
            );
        }
    }

    #[test]
    fn test_live_statuses() {
        assert!(SubscriptionStatus::Trialing.is_live());
        assert!(SubscriptionStatus::Active.is_live());
        assert!(SubscriptionStatus::PastDue.is_live());
        assert!(!SubscriptionStatus::Canceled.is_live());
        assert!(!SubscriptionStatus::Expired.is_live());
    }

    #[test]
    fn test_terminal_states_never_transition() {
        for next in [
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Expired,
        ] {
            assert!(!SubscriptionStatus::Canceled.can_transition_to(next));
            assert!(!SubscriptionStatus::Expired.can_transition_to(next));
        }
    }

    #[test]
    fn test_nothing_transitions_back_to_trialing() {
        assert!(!SubscriptionStatus::Active.can_transition_to(SubscriptionStatus::Trialing));
        assert!(!SubscriptionStatus::PastDue.can_transition_to(SubscriptionStatus::Trialing));
    }

    #[test]
    fn test_live_states_can_expire() {
        assert!(SubscriptionStatus::Trialing.can_transition_to(SubscriptionStatus::Expired));
        assert!(SubscriptionStatus::Active.can_transition_to(SubscriptionStatus::Expired));
        assert!(SubscriptionStatus::PastDue.can_transition_to(SubscriptionStatus::Expired));
    }

    #[test]
    fn test_plan_type_paid() {
        assert!(!PlanType::Free.is_paid());
        assert!(PlanType::Standard.is_paid());
        assert!(PlanType::Premium.is_paid());
    }

    #[test]
    fn test_billing_cycle_periods() {
        assert_eq!(BillingCycle::Monthly.period_days(), 30);
        assert_eq!(BillingCycle::Quarterly.period_days(), 90);
        assert_eq!(BillingCycle::Yearly.period_days(), 365);
    }

    #[test]
    fn test_resource_kind_accepts_plural() {
        assert_eq!(
            ResourceKind::from_str("employees").unwrap(),
            ResourceKind::Employee
        );
        assert_eq!(
            ResourceKind::from_str("visitor").unwrap(),
            ResourceKind::Visitor
        );
    }
}
