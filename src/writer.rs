// Real-time aggregate writer: on each completed check, persist the raw
// observation and refresh its hourly aggregate row in one transaction.
// Hourly p95 is recomputed from the hour's raw latencies (nearest-rank); raw
// retention always outlives the hour being written, so the samples exist.

use std::sync::Arc;

use crate::history_repo::HistoryRepo;
use crate::models::Observation;
use crate::registry::StrategyRegistry;
use tokio::sync::mpsc;

pub struct AggregateWriter {
    repo: Arc<HistoryRepo>,
    strategies: Arc<StrategyRegistry>,
}

impl AggregateWriter {
    pub fn new(repo: Arc<HistoryRepo>, strategies: Arc<StrategyRegistry>) -> Self {
        Self { repo, strategies }
    }

    /// Records one completed check run. The hourly row's aggregated_result is
    /// refreshed from the hour's observations via the assignment's strategy;
    /// a missing configuration or strategy just leaves it absent.
    pub async fn record(&self, observation: &Observation) -> anyhow::Result<()> {
        let strategy_id = self
            .repo
            .get_configuration_strategy(&observation.system_id, &observation.configuration_id)
            .await?;

        let strategies = self.strategies.clone();
        self.repo
            .record_run(observation, move |hour_observations| {
                let strategy_id = strategy_id?;
                strategies.aggregate(&strategy_id, hour_observations)
            })
            .await?;
        Ok(())
    }
}

/// Spawns the task that drains completed runs from the check-execution path.
/// A failed write is logged and skipped; the channel closing ends the task.
pub fn spawn_writer(
    mut rx: mpsc::Receiver<Observation>,
    writer: AggregateWriter,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(observation) = rx.recv().await {
            if let Err(e) = writer.record(&observation).await {
                tracing::warn!(
                    error = %e,
                    system_id = %observation.system_id,
                    configuration_id = %observation.configuration_id,
                    "aggregate writer: record failed"
                );
            }
        }
        tracing::debug!("Aggregate writer shutting down");
    })
}
