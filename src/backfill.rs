// One-time backfill: run one retention pass at startup so a long-stopped
// instance compacts its backlog immediately instead of waiting for the tick.

use crate::history_repo::HistoryRepo;
use crate::models::RetentionPolicy;
use crate::retention_worker::run_one_tick;
use std::sync::Arc;
use tracing::info;

/// Runs one retention pass (raw delete → hourly rollup → daily delete).
pub async fn run_backfill(
    repo: Arc<HistoryRepo>,
    default_policy: &RetentionPolicy,
) -> anyhow::Result<()> {
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_millis() as i64;
    let summary = run_one_tick(repo.as_ref(), now_ms, default_policy).await?;
    info!(
        assignments = summary.assignments,
        daily_rows_written = summary.daily_rows_written,
        "backfill complete"
    );
    Ok(())
}
