//! API routes

mod billing;
mod webhooks;

use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::auth::require_auth;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let authed = Router::new()
        .route("/api/billing/plans", get(billing::list_plans))
        .route("/api/billing/subscription", get(billing::get_subscription))
        .route("/api/billing/trial-status", get(billing::get_trial_status))
        .route("/api/billing/limits/{kind}", get(billing::check_limit))
        .route("/api/billing/trial", post(billing::create_trial))
        .route("/api/billing/cancel", post(billing::cancel_subscription))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/webhooks/razorpay", post(webhooks::razorpay_webhook))
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        .merge(authed)
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}
