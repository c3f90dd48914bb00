//! Periodic background work: trial expiry and reminders, plus pruning of the in-memory limiters.

use chrono::Utc;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::db::services::run_trial_sweep;
use crate::services::lockout::LoginAttemptTracker;
use crate::services::rate_limit::RateLimiter;

pub const SWEEP_INTERVAL_SECS: u64 = 3600;

/// Runs one pass of every lifecycle job.
pub async fn run_once(
    db: &DatabaseConnection,
    chat_limiter: &RateLimiter,
    login_tracker: &LoginAttemptTracker,
) {
    let now = Utc::now();
    match run_trial_sweep(db, now).await {
        Ok(report) if report.expired > 0 || report.reminded > 0 => {
            info!(expired = report.expired, reminded = report.reminded, "Trial sweep finished.");
        }
        Ok(_) => {}
        Err(e) => error!(error = %e, "Trial sweep failed."),
    }
    chat_limiter.prune(now);
    let dropped = login_tracker.prune(now);
    if dropped > 0 {
        debug!(dropped, "Pruned login attempt records.");
    }
}

pub fn spawn_lifecycle_tasks(
    db: DatabaseConnection,
    chat_limiter: Arc<RateLimiter>,
    login_tracker: Arc<LoginAttemptTracker>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            // The first tick completes immediately, so a sweep runs at startup.
            ticker.tick().await;
            run_once(&db, &chat_limiter, &login_tracker).await;
        }
    })
}
