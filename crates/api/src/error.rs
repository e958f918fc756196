//! HTTP error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use visitflow_billing::BillingError;

/// API-level error; wraps engine errors and adds auth failures.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error("Missing or invalid authentication token")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Billing(err) => match err {
                BillingError::NotFound(_) => StatusCode::NOT_FOUND,
                BillingError::WebhookSignatureInvalid => StatusCode::UNAUTHORIZED,
                BillingError::Forbidden(_) => StatusCode::FORBIDDEN,
                BillingError::Conflict(_) => StatusCode::CONFLICT,
                BillingError::Unattributable(_) | BillingError::InvalidPayload(_) => {
                    StatusCode::BAD_REQUEST
                }
                BillingError::Database(_) | BillingError::Config(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Store failures get a generic message; everything else is already
        // written to be user-safe.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Internal error");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billing_error_status_mapping() {
        let cases = [
            (
                ApiError::Billing(BillingError::NotFound("x".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Billing(BillingError::WebhookSignatureInvalid),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::Billing(BillingError::Forbidden("x".into())),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::Billing(BillingError::Conflict("x".into())),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Billing(BillingError::Unattributable("x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Billing(BillingError::Database("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status_code(), expected, "{err}");
        }
    }
}
