use crate::metrics;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

pub mod tasks;

/// Magic links are purged hourly
const MAGIC_LINK_PURGE_SECS: u64 = 3600;
const HEALTH_CHECK_SECS: u64 = 300;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        if self.context.config.reminders.enabled {
            tokio::spawn(Self::event_reminder_job(Arc::clone(&self)));
            tokio::spawn(Self::receipt_reconciliation_job(Arc::clone(&self)));
        } else {
            info!("Scheduled reminders disabled");
        }

        tokio::spawn(Self::magic_link_purge_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Send reminders for the upcoming window (every `interval_secs`)
    async fn event_reminder_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(
            scheduler.context.config.reminders.interval_secs,
        ));
        // A late tick must not send the same window twice
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cursor = tasks::ReminderCursor::default();

        loop {
            interval.tick().await;

            let run = tasks::dispatch_reminders(&scheduler.context, &mut cursor, Utc::now());
            match timed("event_reminders", run).await {
                Ok(0) => {}
                Ok(count) => info!("Sent {} event reminders", count),
                Err(e) => error!("Failed to dispatch event reminders: {}", e),
            }
        }
    }

    /// Check delivery receipts of stored tickets (every `receipt_interval_secs`)
    async fn receipt_reconciliation_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(
            scheduler.context.config.reminders.receipt_interval_secs,
        ));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            match timed(
                "push_receipts",
                tasks::reconcile_stored_receipts(&scheduler.context, Utc::now()),
            )
            .await
            {
                Ok(report) => {
                    if report.processed > 0 {
                        info!(
                            "Checked {} receipts, disabled {} tokens",
                            report.processed,
                            report.disabled_tokens.len()
                        );
                    }
                }
                Err(e) => error!("Failed to reconcile push receipts: {}", e),
            }
        }
    }

    /// Delete expired magic links (runs hourly)
    async fn magic_link_purge_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(MAGIC_LINK_PURGE_SECS));

        loop {
            interval.tick().await;

            match timed("magic_link_purge", tasks::purge_magic_links(&scheduler.context, Utc::now())).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Purged {} expired magic links", count);
                    }
                }
                Err(e) => error!("Failed to purge magic links: {}", e),
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(HEALTH_CHECK_SECS));

        loop {
            interval.tick().await;

            if let Err(e) = tasks::health_check(&scheduler.context).await {
                error!("Health check failed: {}", e);
            }
        }
    }
}

/// Run a job body and record its outcome and duration
async fn timed<T, E>(job_type: &str, job: impl Future<Output = Result<T, E>>) -> Result<T, E> {
    let start = Instant::now();
    let result = job.await;
    let status = if result.is_ok() { "success" } else { "failure" };
    metrics::record_background_job(job_type, status, start.elapsed().as_secs_f64());
    result
}
