//! Billing invariants
//!
//! Runnable consistency checks over the subscription store. Each invariant
//! is a real SQL query; checks only read, never write, and violations carry
//! enough context to debug. Run after webhook replays or from the worker's
//! daily job.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Tenant(s) affected
    pub tenant_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - tenants may be double-billed or wrongly entitled
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - potential issue, should investigate
    Medium,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct MultipleLiveSubsRow {
    tenant_id: Uuid,
    sub_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct TerminalAutoRenewRow {
    sub_id: Uuid,
    tenant_id: Uuid,
    status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct ExpiredFutureEndRow {
    sub_id: Uuid,
    tenant_id: Uuid,
    end_date: Option<OffsetDateTime>,
}

#[derive(Debug, sqlx::FromRow)]
struct FreeNotTrialingRow {
    sub_id: Uuid,
    tenant_id: Uuid,
    status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct StuckWebhookRow {
    idempotency_key: String,
    tenant_id: Option<Uuid>,
    processing_started_at: OffsetDateTime,
}

/// Service for running billing invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_single_live_subscription().await?);
        violations.extend(self.check_terminal_never_auto_renews().await?);
        violations.extend(self.check_expired_has_past_end_date().await?);
        violations.extend(self.check_free_plan_live_rows_are_trialing().await?);
        violations.extend(self.check_no_stuck_webhook_events().await?);

        let checks_run = 5;
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: At most 1 live subscription per tenant
    ///
    /// Two live subscriptions mean double-billing and ambiguous
    /// entitlement decisions.
    async fn check_single_live_subscription(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<MultipleLiveSubsRow> = sqlx::query_as(
            r#"
            SELECT tenant_id, COUNT(*) as sub_count
            FROM subscriptions
            WHERE status IN ('trialing', 'active', 'past_due')
            GROUP BY tenant_id
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "single_live_subscription".to_string(),
                tenant_ids: vec![row.tenant_id],
                description: format!(
                    "Tenant has {} live subscriptions (expected at most 1)",
                    row.sub_count
                ),
                context: serde_json::json!({
                    "subscription_count": row.sub_count,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 2: Canceled/expired subscriptions never auto-renew
    async fn check_terminal_never_auto_renews(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<TerminalAutoRenewRow> = sqlx::query_as(
            r#"
            SELECT id as sub_id, tenant_id, status
            FROM subscriptions
            WHERE status IN ('canceled', 'expired')
              AND is_auto_renew = TRUE
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "terminal_never_auto_renews".to_string(),
                tenant_ids: vec![row.tenant_id],
                description: format!("{} subscription still flagged auto-renew", row.status),
                context: serde_json::json!({
                    "subscription_id": row.sub_id,
                    "status": row.status,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 3: Expired subscriptions have an end date in the past
    ///
    /// An expired row with no end date (or a future one) means the sweep
    /// or a webhook transitioned something it should not have.
    async fn check_expired_has_past_end_date(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<ExpiredFutureEndRow> = sqlx::query_as(
            r#"
            SELECT id as sub_id, tenant_id, end_date
            FROM subscriptions
            WHERE status = 'expired'
              AND (end_date IS NULL OR end_date > NOW())
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "expired_has_past_end_date".to_string(),
                tenant_ids: vec![row.tenant_id],
                description: "Expired subscription with missing or future end date".to_string(),
                context: serde_json::json!({
                    "subscription_id": row.sub_id,
                    "end_date": row.end_date.map(|d| d.to_string()),
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 4: Live free-plan rows are trials
    ///
    /// A free subscription only exists in the `trialing` state while live;
    /// 'active free' would bypass every trial ceiling.
    async fn check_free_plan_live_rows_are_trialing(
        &self,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<FreeNotTrialingRow> = sqlx::query_as(
            r#"
            SELECT id as sub_id, tenant_id, status
            FROM subscriptions
            WHERE plan_type = 'free'
              AND status IN ('active', 'past_due')
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "free_plan_live_rows_are_trialing".to_string(),
                tenant_ids: vec![row.tenant_id],
                description: format!("Free-plan subscription in '{}' state", row.status),
                context: serde_json::json!({
                    "subscription_id": row.sub_id,
                    "status": row.status,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 5: No webhook events stuck in processing
    ///
    /// Claims older than an hour were abandoned mid-flight and are waiting
    /// on timeout recovery; a persistent backlog means a crashing handler.
    async fn check_no_stuck_webhook_events(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<StuckWebhookRow> = sqlx::query_as(
            r#"
            SELECT idempotency_key, tenant_id, processing_started_at
            FROM payment_webhook_events
            WHERE processing_result = 'processing'
              AND processing_started_at < NOW() - INTERVAL '1 hour'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "no_stuck_webhook_events".to_string(),
                tenant_ids: row.tenant_id.into_iter().collect(),
                description: format!(
                    "Webhook event '{}' stuck in processing since {}",
                    row.idempotency_key, row.processing_started_at
                ),
                context: serde_json::json!({
                    "idempotency_key": row.idempotency_key,
                    "processing_started_at": row.processing_started_at.to_string(),
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str) -> BillingResult<Vec<InvariantViolation>> {
        match name {
            "single_live_subscription" => self.check_single_live_subscription().await,
            "terminal_never_auto_renews" => self.check_terminal_never_auto_renews().await,
            "expired_has_past_end_date" => self.check_expired_has_past_end_date().await,
            "free_plan_live_rows_are_trialing" => {
                self.check_free_plan_live_rows_are_trialing().await
            }
            "no_stuck_webhook_events" => self.check_no_stuck_webhook_events().await,
            _ => Ok(vec![]),
        }
    }

    /// Get list of all available invariant checks
    pub fn available_checks() -> Vec<&'static str> {
        vec![
            "single_live_subscription",
            "terminal_never_auto_renews",
            "expired_has_past_end_date",
            "free_plan_live_rows_are_trialing",
            "no_stuck_webhook_events",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_severity_display() {
        assert_eq!(ViolationSeverity::Critical.to_string(), "CRITICAL");
        assert_eq!(ViolationSeverity::High.to_string(), "HIGH");
        assert_eq!(ViolationSeverity::Medium.to_string(), "MEDIUM");
    }

    #[test]
    fn test_available_checks() {
        let checks = InvariantChecker::available_checks();
        assert_eq!(checks.len(), 5);
        assert!(checks.contains(&"single_live_subscription"));
        assert!(checks.contains(&"free_plan_live_rows_are_trialing"));
    }
}
