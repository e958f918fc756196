//! Authentication middleware and tenant context extraction

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated caller, attached to the request by `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthAccount {
    pub account_id: Uuid,
    pub role: String,
}

/// Middleware requiring a valid bearer token on every request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = state.jwt_manager.validate(token)?;

    request.extensions_mut().insert(AuthAccount {
        account_id: claims.sub,
        role: claims.role,
    });

    Ok(next.run(request).await)
}

/// Resolved tenant scope for the caller.
///
/// `tenant_id` is the canonical billing/scoping id: the caller's own id for
/// admins, the registering admin's id for employee accounts. Every
/// tenant-scoped query below this point filters by `tenant_id`, never by
/// the raw caller id.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub account_id: Uuid,
    pub tenant_id: Uuid,
    pub role: String,
}

impl FromRequestParts<AppState> for TenantContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .extensions
            .get::<AuthAccount>()
            .cloned()
            .ok_or(ApiError::Unauthorized)?;

        let tenant_id = state
            .billing
            .tenants
            .resolve_tenant_id(auth.account_id)
            .await?;

        Ok(TenantContext {
            account_id: auth.account_id,
            tenant_id,
            role: auth.role,
        })
    }
}
