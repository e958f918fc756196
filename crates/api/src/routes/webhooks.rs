//! Webhook ingress
//!
//! Both endpoints hand the raw, unparsed request body to the adapter:
//! signature verification is over the exact bytes the provider signed, not
//! a re-serialized copy. Response policy: 401 for signature failure, 400
//! for payloads that can never be attributed, 200 for everything the
//! engine processed or deduplicated, 500 only for transient store failures
//! (redelivery is safe behind the idempotency gate).

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use visitflow_billing::{ProviderAdapter, WebhookOutcome};

use crate::state::AppState;

pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let adapter = state.razorpay.clone();
    handle(&state, adapter.as_ref(), &headers, &body).await
}

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let adapter = state.stripe.clone();
    handle(&state, adapter.as_ref(), &headers, &body).await
}

async fn handle(
    state: &AppState,
    adapter: &dyn ProviderAdapter,
    headers: &HeaderMap,
    body: &[u8],
) -> Response {
    let signature = headers
        .get(adapter.signature_header())
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    match state.billing.webhooks.handle(adapter, body, signature).await {
        Ok(outcome) => {
            let status = match &outcome {
                WebhookOutcome::Activated { .. } => "processed",
                WebhookOutcome::MarkedPastDue { .. } => "processed",
                WebhookOutcome::FailureRecorded => "processed",
                WebhookOutcome::AlreadyActive { .. } => "processed",
                WebhookOutcome::Deduplicated => "duplicate",
                WebhookOutcome::Ignored => "ignored",
            };
            (StatusCode::OK, Json(json!({ "status": status }))).into_response()
        }
        Err(err) => {
            use visitflow_billing::BillingError;

            match &err {
                BillingError::WebhookSignatureInvalid => (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "invalid signature" })),
                )
                    .into_response(),
                BillingError::Unattributable(_) | BillingError::InvalidPayload(_) => {
                    tracing::warn!(
                        provider = %adapter.provider(),
                        error = %err,
                        "Webhook payload dropped"
                    );
                    (
                        StatusCode::BAD_REQUEST,
                        Json(json!({ "error": "unattributable payload" })),
                    )
                        .into_response()
                }
                _ if err.is_retryable() => {
                    // Let the provider redeliver; the gate makes it safe.
                    tracing::error!(
                        provider = %adapter.provider(),
                        error = %err,
                        "Webhook processing failed transiently, requesting redelivery"
                    );
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "error": "processing failed" })),
                    )
                        .into_response()
                }
                _ => {
                    // Permanent condition a retry cannot fix (plan deleted,
                    // tenant gone). Acknowledge so the provider stops; the
                    // idempotency record keeps the error for reconciliation.
                    tracing::error!(
                        provider = %adapter.provider(),
                        error = %err,
                        "Webhook processing failed permanently, acknowledging"
                    );
                    (StatusCode::OK, Json(json!({ "status": "acknowledged" }))).into_response()
                }
            }
        }
    }
}
