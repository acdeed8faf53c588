// Background retention job: per assignment, delete expired raw observations,
// roll expired hourly rows into daily rows, delete expired daily rows.
// Runs on a cron schedule (local time) or a fixed interval fallback.
// A tick that finds the previous one still running skips (overlap guard).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::history_repo::HistoryRepo;
use crate::history_repo::aggregation::{MS_PER_DAY, floor_to_day};
use crate::models::RetentionPolicy;
use tracing::{info, instrument, warn};

/// Config for the retention worker.
#[derive(Debug, Clone)]
pub struct RetentionWorkerConfig {
    /// Optional cron expression (e.g. "0 0 4 * * *" = 04:00 daily). Uses local time.
    pub schedule: Option<String>,
    /// Run every N seconds when schedule is not set.
    pub tick_interval_secs: u64,
    /// Windows for assignments without a stored retention config.
    pub default_policy: RetentionPolicy,
}

/// What one tick did, for logging and assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionSummary {
    pub assignments: u64,
    pub failed_assignments: u64,
    pub raw_deleted: u64,
    pub daily_rows_written: u64,
    pub daily_deleted: u64,
}

/// Spawns the retention worker. Returns a join handle.
pub fn spawn(repo: Arc<HistoryRepo>, config: RetentionWorkerConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(repo, config).await;
    })
}

// Single consumer + try_send scheduler: a tick that fires while the previous
// one is still running is dropped, so two invocations can never overlap.
#[instrument(skip(repo, config))]
async fn run(repo: Arc<HistoryRepo>, config: RetentionWorkerConfig) {
    let (tick_tx, mut tick_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(tick_scheduler(config.clone(), tick_tx));

    while tick_rx.recv().await.is_some() {
        let now_ms = match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
            Ok(d) => d.as_millis() as i64,
            Err(e) => {
                warn!(error = %e, "system time error");
                continue;
            }
        };
        match run_one_tick(&repo, now_ms, &config.default_policy).await {
            Ok(summary) => {
                info!(
                    assignments = summary.assignments,
                    failed_assignments = summary.failed_assignments,
                    raw_deleted = summary.raw_deleted,
                    daily_rows_written = summary.daily_rows_written,
                    daily_deleted = summary.daily_deleted,
                    "retention tick complete"
                );
            }
            Err(e) => warn!(error = %e, "retention tick failed"),
        }
    }
}

/// Sends a message on `tx` at each retention time (cron or fixed interval).
/// A tick that lands while the consumer is busy is dropped, not queued.
async fn tick_scheduler(config: RetentionWorkerConfig, tx: tokio::sync::mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid retention schedule; retention will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            let next = schedule.after(&now).next();
            if let Some(next) = next {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if send_tick(&tx).is_break() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        let mut interval = tokio::time::interval(Duration::from_secs(config.tick_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await; // immediate first tick is the backfill's job
        loop {
            interval.tick().await;
            if send_tick(&tx).is_break() {
                break;
            }
        }
    }
}

fn send_tick(tx: &tokio::sync::mpsc::Sender<()>) -> std::ops::ControlFlow<()> {
    match tx.try_send(()) {
        Ok(()) => std::ops::ControlFlow::Continue(()),
        Err(tokio::sync::mpsc::error::TrySendError::Full(())) => {
            warn!("retention tick skipped: previous tick still running");
            std::ops::ControlFlow::Continue(())
        }
        Err(tokio::sync::mpsc::error::TrySendError::Closed(())) => std::ops::ControlFlow::Break(()),
    }
}

/// Runs one retention pass over every assignment with stored data. One
/// assignment's failure never aborts the others; partial success is the
/// normal operating mode. Used by the worker loop and by startup backfill.
pub async fn run_one_tick(
    repo: &HistoryRepo,
    now_ms: i64,
    default_policy: &RetentionPolicy,
) -> anyhow::Result<RetentionSummary> {
    let assignments = repo.list_assignments().await?;
    let mut summary = RetentionSummary {
        assignments: assignments.len() as u64,
        ..Default::default()
    };

    for (system_id, configuration_id) in assignments {
        match process_assignment(repo, &system_id, &configuration_id, now_ms, default_policy).await
        {
            Ok((raw_deleted, daily_written, daily_deleted)) => {
                summary.raw_deleted += raw_deleted;
                summary.daily_rows_written += daily_written;
                summary.daily_deleted += daily_deleted;
            }
            Err(e) => {
                summary.failed_assignments += 1;
                warn!(
                    error = %e,
                    system_id = %system_id,
                    configuration_id = %configuration_id,
                    "retention failed for assignment"
                );
            }
        }
    }
    Ok(summary)
}

/// Raw deletion → hourly rollup → daily deletion, strictly in order: the
/// rollup reads hourly rows the earlier steps must not have touched.
async fn process_assignment(
    repo: &HistoryRepo,
    system_id: &str,
    configuration_id: &str,
    now_ms: i64,
    default_policy: &RetentionPolicy,
) -> anyhow::Result<(u64, u64, u64)> {
    let policy = repo
        .get_retention_policy(system_id, configuration_id)
        .await?
        .unwrap_or(*default_policy);

    let raw_cutoff = now_ms - (policy.raw_retention_days as i64) * MS_PER_DAY;
    let raw_deleted = repo
        .delete_observations_before(system_id, configuration_id, raw_cutoff)
        .await?;

    // Day-floored cutoff: only whole days roll up, so each daily row is
    // written from a complete group.
    let hourly_cutoff = floor_to_day(now_ms - (policy.hourly_retention_days as i64) * MS_PER_DAY);
    let daily_written = repo
        .rollup_hourly_before(system_id, configuration_id, hourly_cutoff)
        .await?;

    let daily_cutoff = now_ms - (policy.daily_retention_days as i64) * MS_PER_DAY;
    let daily_deleted = repo
        .delete_daily_before(system_id, configuration_id, daily_cutoff)
        .await?;

    Ok((raw_deleted, daily_written, daily_deleted))
}
