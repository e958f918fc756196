//! Application state

use std::sync::Arc;

use sqlx::PgPool;
use visitflow_billing::{BillingService, RazorpayAdapter, StripeAdapter};

use crate::auth::JwtManager;
use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub jwt_manager: JwtManager,
    pub billing: Arc<BillingService>,
    pub razorpay: Arc<RazorpayAdapter>,
    pub stripe: Arc<StripeAdapter>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let jwt_manager = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);

        let billing = Arc::new(BillingService::new(pool.clone()));
        tracing::info!("Billing service initialized");

        let razorpay = Arc::new(RazorpayAdapter::new(config.razorpay_webhook_secret.clone()));
        let stripe = Arc::new(StripeAdapter::new(config.stripe_webhook_secret.clone()));

        Self {
            pool,
            config,
            jwt_manager,
            billing,
            razorpay,
            stripe,
        }
    }
}
