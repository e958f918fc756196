//! API server configuration

use anyhow::Context;

/// Configuration loaded from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub razorpay_webhook_secret: String,
    pub stripe_webhook_secret: String,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;

        let jwt_expiry_hours = std::env::var("JWT_EXPIRY_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24);

        // Webhook secrets may be absent in development; the corresponding
        // ingress endpoint then rejects everything, which is the safe default.
        let razorpay_webhook_secret =
            std::env::var("RAZORPAY_WEBHOOK_SECRET").unwrap_or_default();
        let stripe_webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default();

        if razorpay_webhook_secret.is_empty() {
            tracing::warn!("RAZORPAY_WEBHOOK_SECRET not set - Razorpay webhooks will be rejected");
        }
        if stripe_webhook_secret.is_empty() {
            tracing::warn!("STRIPE_WEBHOOK_SECRET not set - Stripe webhooks will be rejected");
        }

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            bind_address,
            database_url,
            jwt_secret,
            jwt_expiry_hours,
            razorpay_webhook_secret,
            stripe_webhook_secret,
            allowed_origins,
        })
    }
}
