#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Shared types and database plumbing for VisitFlow services.
//!
//! Keeps the enums that cross crate boundaries (subscription status, plan
//! type, billing cycle, resource kinds) plus pool construction and the
//! schema migrator. No business logic lives here.

pub mod db;
pub mod types;

pub use db::{create_migration_pool, create_pool, run_migrations};
pub use types::{AccountRole, BillingCycle, PlanType, ResourceKind, SubscriptionStatus};
