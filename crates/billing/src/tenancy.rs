//! Ownership resolution
//!
//! Every caller is either an admin (owns a tenant) or an employee acting on
//! behalf of exactly one admin. All data scoping and every billing decision
//! keys off the resolved tenant id, never the raw caller id.

use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use visitflow_shared::AccountRole;

/// Account row as consumed by the resolver.
#[derive(Debug, Clone, FromRow)]
pub struct AccountRecord {
    pub id: Uuid,
    pub email: String,
    pub role: AccountRole,
    pub is_active: bool,
}

/// Delegated-worker row as consumed by the resolver.
#[derive(Debug, Clone, FromRow)]
pub struct WorkerRecord {
    pub id: Uuid,
    pub creator_account_id: Uuid,
    pub account_id: Option<Uuid>,
    pub email: String,
    pub is_active: bool,
}

/// Resolves a caller account to the tenant that owns its data.
#[derive(Clone)]
pub struct TenantResolver {
    pool: PgPool,
}

impl TenantResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve the canonical tenant id for a caller account.
    ///
    /// Admin accounts are their own tenant. Employee accounts resolve to
    /// the admin that registered them: the explicit `account_id` link wins;
    /// a case-insensitive email match on active, non-deleted worker records
    /// is the fallback for workers registered before their login existed.
    pub async fn resolve_tenant_id(&self, account_id: Uuid) -> BillingResult<Uuid> {
        let account: Option<AccountRecord> = sqlx::query_as(
            r#"
            SELECT id, email, role, is_active
            FROM accounts
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        let account = account
            .ok_or_else(|| BillingError::NotFound(format!("account {account_id} not found")))?;

        if !account.is_active {
            return Err(BillingError::NotFound(format!(
                "account {account_id} is inactive"
            )));
        }

        if account.role == AccountRole::Admin {
            return Ok(account.id);
        }

        // Explicit link first.
        let linked: Option<WorkerRecord> = sqlx::query_as(
            r#"
            SELECT id, creator_account_id, account_id, email, is_active
            FROM employees
            WHERE account_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(worker) = linked {
            if !worker.is_active {
                return Err(BillingError::NotFound(format!(
                    "worker record for account {account_id} is inactive"
                )));
            }
            tracing::debug!(
                account_id = %account_id,
                tenant_id = %worker.creator_account_id,
                "Resolved tenant via worker link"
            );
            return Ok(worker.creator_account_id);
        }

        // Fallback: match by email, active records only.
        let by_email: Option<WorkerRecord> = sqlx::query_as(
            r#"
            SELECT id, creator_account_id, account_id, email, is_active
            FROM employees
            WHERE LOWER(email) = LOWER($1)
              AND is_active = TRUE
              AND deleted_at IS NULL
            "#,
        )
        .bind(&account.email)
        .fetch_optional(&self.pool)
        .await?;

        match by_email {
            Some(worker) => {
                tracing::debug!(
                    account_id = %account_id,
                    tenant_id = %worker.creator_account_id,
                    "Resolved tenant via email match"
                );
                Ok(worker.creator_account_id)
            }
            None => Err(BillingError::NotFound(format!(
                "no tenant found for account {account_id}"
            ))),
        }
    }

    /// Look up an account record by id (active, non-deleted only).
    pub async fn get_account(&self, account_id: Uuid) -> BillingResult<AccountRecord> {
        let account: Option<AccountRecord> = sqlx::query_as(
            r#"
            SELECT id, email, role, is_active
            FROM accounts
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        account.ok_or_else(|| BillingError::NotFound(format!("account {account_id} not found")))
    }
}
