//! Plan catalog
//!
//! Read-mostly registry of purchasable plans. The lifecycle engine consumes
//! it when activating paid subscriptions; it never mutates it.

use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use visitflow_shared::{BillingCycle, PlanType};

/// A purchasable plan.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlanRecord {
    pub id: Uuid,
    pub name: String,
    pub plan_type: PlanType,
    pub billing_cycle: BillingCycle,
    pub amount_cents: i64,
    pub currency: String,
    pub is_active: bool,
}

impl PlanRecord {
    /// Synthetic free plan used for trials. Not stored in the catalog; free
    /// trials carry no plan row and no charge.
    pub fn free_trial() -> Self {
        Self {
            id: Uuid::nil(),
            name: "Free Trial".to_string(),
            plan_type: PlanType::Free,
            billing_cycle: BillingCycle::Monthly,
            amount_cents: 0,
            currency: "INR".to_string(),
            is_active: true,
        }
    }
}

/// Catalog reader.
#[derive(Clone)]
pub struct PlanCatalog {
    pool: PgPool,
}

impl PlanCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a plan by id regardless of active flag. Webhooks for a plan
    /// retired between checkout and payment must still activate it.
    pub async fn get_plan(&self, plan_id: Uuid) -> BillingResult<PlanRecord> {
        let plan: Option<PlanRecord> = sqlx::query_as(
            r#"
            SELECT id, name, plan_type, billing_cycle, amount_cents, currency, is_active
            FROM plans
            WHERE id = $1
            "#,
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;

        plan.ok_or_else(|| BillingError::NotFound(format!("plan {plan_id} not found")))
    }

    /// All currently purchasable plans, cheapest first.
    pub async fn list_active_plans(&self) -> BillingResult<Vec<PlanRecord>> {
        let plans: Vec<PlanRecord> = sqlx::query_as(
            r#"
            SELECT id, name, plan_type, billing_cycle, amount_cents, currency, is_active
            FROM plans
            WHERE is_active = TRUE
            ORDER BY amount_cents ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(plans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_trial_plan_is_free() {
        let plan = PlanRecord::free_trial();
        assert_eq!(plan.plan_type, PlanType::Free);
        assert_eq!(plan.amount_cents, 0);
        assert!(plan.id.is_nil());
    }
}
