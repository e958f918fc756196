//! Billing and entitlement routes
//!
//! The narrow interface the rest of the product consumes: current
//! subscription, trial status, trial-limit decisions, free trial
//! assignment, cancellation. All of it is scoped by the resolved tenant
//! id, never the raw caller id.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use std::str::FromStr;

use visitflow_billing::BillingError;
use visitflow_shared::ResourceKind;

use crate::auth::TenantContext;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn list_plans(
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let plans = state.billing.plans.list_active_plans().await?;
    Ok(Json(json!({ "plans": plans })))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> ApiResult<Json<serde_json::Value>> {
    let sub = state
        .billing
        .subscriptions
        .get_active_subscription(ctx.tenant_id)
        .await?
        .ok_or_else(|| {
            BillingError::NotFound(format!("no active subscription for tenant {}", ctx.tenant_id))
        })?;

    Ok(Json(json!({ "subscription": sub })))
}

pub async fn get_trial_status(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> ApiResult<Json<serde_json::Value>> {
    let status = state
        .billing
        .subscriptions
        .get_trial_status(ctx.tenant_id)
        .await?;

    Ok(Json(json!({ "trial": status })))
}

/// Trial-limit decision for one resource kind, for "X of Y used" rendering
/// and for collaborator services gating their create operations.
pub async fn check_limit(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(kind): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let kind = ResourceKind::from_str(&kind).map_err(ApiError::BadRequest)?;

    let decision = state.billing.limits.check_limit(ctx.tenant_id, kind).await?;
    let allowed = decision.is_allowed();
    let message = decision.deny_message();

    Ok(Json(json!({
        "kind": kind,
        "allowed": allowed,
        "message": message,
        "decision": decision,
    })))
}

pub async fn create_trial(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let sub = state
        .billing
        .subscriptions
        .create_free_trial(ctx.tenant_id)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "subscription": sub }))))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> ApiResult<Json<serde_json::Value>> {
    // Scope the cancel to the caller's own live subscription; a raw
    // subscription id from the client could belong to another tenant.
    let sub = state
        .billing
        .subscriptions
        .get_active_subscription(ctx.tenant_id)
        .await?
        .ok_or_else(|| {
            BillingError::NotFound(format!("no active subscription for tenant {}", ctx.tenant_id))
        })?;

    let canceled = state.billing.subscriptions.cancel_subscription(sub.id).await?;

    Ok(Json(json!({ "subscription": canceled })))
}
