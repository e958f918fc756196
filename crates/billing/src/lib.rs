// Billing crate clippy configuration
#![allow(clippy::result_large_err)]
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! VisitFlow Entitlement & Subscription Lifecycle Engine
//!
//! Resolves which tenant owns a caller's data, tracks each tenant's
//! subscription through its lifecycle, enforces trial ceilings, and applies
//! provider payment webhooks to subscription state exactly once.
//!
//! ## Features
//!
//! - **Ownership resolution**: admins own a tenant; employee accounts
//!   resolve to their registering admin for all scoping and billing
//! - **Subscription lifecycle**: free trials, paid activation from payment
//!   events, cancellation, payment failure, expiry sweep
//! - **Entitlement checks**: pure predicates plus request gates
//! - **Trial ceilings**: live counts against fixed per-resource limits
//! - **Webhooks**: Razorpay and Stripe adapters behind an atomic
//!   idempotency gate
//! - **Audit**: billing event log and runnable invariant checks

pub mod entitlement;
pub mod error;
pub mod events;
pub mod invariants;
pub mod limits;
pub mod plans;
pub mod providers;
pub mod subscriptions;
pub mod tenancy;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Entitlement
pub use entitlement::{is_active, is_premium, is_trialing, EntitlementService};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{
    ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType, BillingObserver,
    TracingObserver, WebhookOutcome,
};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Limits
pub use limits::{LimitDecision, TrialLimitService, TrialLimits, TrialUsageSnapshot, TRIAL_LIMITS};

// Plans
pub use plans::{PlanCatalog, PlanRecord};

// Providers
pub use providers::{
    PaymentEvent, PaymentEventType, ProviderAdapter, ProviderName, RazorpayAdapter, StripeAdapter,
};

// Subscriptions
pub use subscriptions::{
    ActivationResult, PaidActivation, Subscription, SubscriptionService, TrialStatus,
    DEFAULT_TRIAL_PERIOD_DAYS,
};

// Tenancy
pub use tenancy::{AccountRecord, TenantResolver, WorkerRecord};

// Webhooks
pub use webhooks::{prune_webhook_events, WebhookHandler};

use std::sync::Arc;

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub tenants: TenantResolver,
    pub plans: PlanCatalog,
    pub subscriptions: SubscriptionService,
    pub entitlements: EntitlementService,
    pub limits: TrialLimitService,
    pub webhooks: WebhookHandler,
    pub invariants: InvariantChecker,
}

impl BillingService {
    /// Create a billing service with the default tracing observer.
    pub fn new(pool: PgPool) -> Self {
        Self::with_observer(pool, Arc::new(TracingObserver))
    }

    /// Create a billing service with an explicit observer, for callers that
    /// fan payment outcomes into notification queues.
    pub fn with_observer(pool: PgPool, observer: Arc<dyn BillingObserver>) -> Self {
        let subscriptions = SubscriptionService::new(pool.clone());
        let plans = PlanCatalog::new(pool.clone());

        Self {
            tenants: TenantResolver::new(pool.clone()),
            plans: plans.clone(),
            entitlements: EntitlementService::new(subscriptions.clone()),
            limits: TrialLimitService::new(pool.clone(), subscriptions.clone()),
            webhooks: WebhookHandler::new(pool.clone(), subscriptions.clone(), plans, observer),
            invariants: InvariantChecker::new(pool),
            subscriptions,
        }
    }
}
