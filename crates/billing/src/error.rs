//! Billing error types

use thiserror::Error;

/// Errors produced by the entitlement and subscription lifecycle engine.
#[derive(Debug, Error)]
pub enum BillingError {
    /// No tenant, subscription or plan matching the request.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Webhook signature missing, malformed or failed verification.
    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    /// Entitlement check failed; the message is safe to surface to the
    /// caller ("upgrade required", "trial limit reached").
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Attempted to create a second concurrent live subscription.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Webhook payload that cannot be attributed to a tenant/plan.
    /// Never retried: the metadata will not appear on redelivery either.
    #[error("Unattributable payload: {0}")]
    Unattributable(String),

    /// Payload failed to parse at all.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Store unavailable or query failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Missing or malformed configuration (secrets, trial length).
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BillingError {
    /// Whether a webhook-path failure should surface as a 5xx so the
    /// provider redelivers. Only transient store failures qualify; the
    /// idempotency gate makes redelivery safe. Everything else is a
    /// permanent condition a retry cannot fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::Database(_))
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_database_errors_are_retryable() {
        assert!(BillingError::Database("connection reset".into()).is_retryable());
        assert!(!BillingError::WebhookSignatureInvalid.is_retryable());
        assert!(!BillingError::Unattributable("no tenant".into()).is_retryable());
        assert!(!BillingError::NotFound("plan".into()).is_retryable());
        assert!(!BillingError::Forbidden("upgrade required".into()).is_retryable());
    }
}
