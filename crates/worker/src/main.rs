//! VisitFlow Background Worker
//!
//! Handles scheduled jobs including:
//! - Subscription expiry sweep (every 5 minutes)
//! - Webhook idempotency record pruning (daily at 3:00 AM UTC)
//! - Billing invariant checks (daily at 4:00 AM UTC)
//! - Health check heartbeat (every 5 minutes)

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use visitflow_billing::{prune_webhook_events, BillingService};

/// Idempotency records older than this are safe to prune: both providers'
/// maximum redelivery windows are measured in days, not months.
const WEBHOOK_RETENTION_DAYS: i64 = 90;

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<sqlx::PgPool> {
    #[allow(clippy::expect_used)] // Fail-fast on startup if required config is missing
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting VisitFlow Worker");

    let pool = create_db_pool().await?;
    let billing = Arc::new(BillingService::new(pool.clone()));

    let scheduler = JobScheduler::new().await?;

    // Job 1: Expiry sweep (every 5 minutes)
    // Transitions live subscriptions whose end date has passed to expired.
    // Safe to run concurrently with webhook-driven transitions.
    let sweep_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 */5 * * * *", move |_uuid, _l| {
            let billing = sweep_billing.clone();
            Box::pin(async move {
                match billing.subscriptions.process_expired_subscriptions().await {
                    Ok(0) => {}
                    Ok(count) => info!(expired = count, "Expiry sweep complete"),
                    Err(e) => error!(error = %e, "Expiry sweep failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Subscription expiry sweep (every 5 minutes)");

    // Job 2: Prune old webhook idempotency records (daily at 3:00 AM UTC)
    let prune_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let pool = prune_pool.clone();
            Box::pin(async move {
                match prune_webhook_events(&pool, WEBHOOK_RETENTION_DAYS).await {
                    Ok(deleted) => info!(deleted = deleted, "Webhook event pruning complete"),
                    Err(e) => error!(error = %e, "Webhook event pruning failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Webhook event pruning (daily at 3:00 AM UTC)");

    // Job 3: Billing invariant checks (daily at 4:00 AM UTC)
    let invariant_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 0 4 * * *", move |_uuid, _l| {
            let billing = invariant_billing.clone();
            Box::pin(async move {
                match billing.invariants.run_all_checks().await {
                    Ok(summary) if summary.healthy => {
                        info!(
                            checks_run = summary.checks_run,
                            "Billing invariant checks passed"
                        );
                    }
                    Ok(summary) => {
                        for violation in &summary.violations {
                            warn!(
                                invariant = %violation.invariant,
                                severity = %violation.severity,
                                description = %violation.description,
                                "Billing invariant violated"
                            );
                        }
                    }
                    Err(e) => error!(error = %e, "Billing invariant checks failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Billing invariant checks (daily at 4:00 AM UTC)");

    // Job 4: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("VisitFlow Worker started successfully with {} scheduled jobs", 4);

    // Keep the main task running
    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
