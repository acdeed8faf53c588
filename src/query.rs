// Bucket query engine: partitions an assignment's history into at most
// target_points time buckets and derives per-bucket statistics. Recent data
// comes from raw observations; the part of the range past the raw-retention
// horizon is served from hourly/daily aggregate rows (already summarized).

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::history_repo::HistoryRepo;
use crate::history_repo::aggregation::{MS_PER_DAY, percentile_nearest_rank};
use crate::models::{
    AggregateRow, AggregatedHistory, Bucket, BucketSize, CheckStatus, Observation,
};
use crate::registry::{CollectorRegistry, StrategyRegistry};
use serde_json::Value;
use tracing::instrument;

pub const DEFAULT_TARGET_POINTS: u32 = 60;

/// Time range and resolution of a history query. Timestamps are unix ms;
/// the range is half-open [start, end).
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub system_id: String,
    pub configuration_id: String,
    pub start: i64,
    pub end: i64,
    pub target_points: Option<u32>,
}

/// bucket_interval_seconds = max(1, round(range_secs / target_points)).
pub fn bucket_interval_seconds(start_ms: i64, end_ms: i64, target_points: u32) -> u32 {
    let range_secs = (end_ms - start_ms).max(0) as f64 / 1000.0;
    let interval = (range_secs / target_points.max(1) as f64).round() as i64;
    interval.max(1) as u32
}

pub struct QueryEngine {
    repo: Arc<HistoryRepo>,
    strategies: Arc<StrategyRegistry>,
    collectors: Arc<CollectorRegistry>,
}

impl QueryEngine {
    pub fn new(
        repo: Arc<HistoryRepo>,
        strategies: Arc<StrategyRegistry>,
        collectors: Arc<CollectorRegistry>,
    ) -> Self {
        Self {
            repo,
            strategies,
            collectors,
        }
    }

    /// Bucketed history for one assignment. Only non-empty buckets are
    /// emitted. A missing configuration, strategy, or collector degrades the
    /// response (field omitted); it never fails the query.
    #[instrument(skip(self, query), fields(
        system_id = %query.system_id,
        configuration_id = %query.configuration_id,
        operation = "get_aggregated_history"
    ))]
    pub async fn get_aggregated_history(
        &self,
        query: &HistoryQuery,
        include_aggregated_result: bool,
    ) -> anyhow::Result<AggregatedHistory> {
        let target_points = query.target_points.unwrap_or(DEFAULT_TARGET_POINTS);
        let interval_secs = bucket_interval_seconds(query.start, query.end, target_points);

        let strategy_id = self
            .repo
            .get_configuration_strategy(&query.system_id, &query.configuration_id)
            .await?;

        let policy = self
            .repo
            .get_retention_policy(&query.system_id, &query.configuration_id)
            .await?
            .unwrap_or_default();
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)?
            .as_millis() as i64;
        let raw_cutoff = now_ms - (policy.raw_retention_days as i64) * MS_PER_DAY;

        // Older portion: pre-summarized hourly/daily rows.
        let mut buckets: Vec<Bucket> = if query.start < raw_cutoff {
            let agg_end = query.end.min(raw_cutoff);
            let mut rows = self
                .repo
                .get_aggregates_in_range(
                    &query.system_id,
                    &query.configuration_id,
                    query.start,
                    agg_end,
                    BucketSize::Daily,
                )
                .await?;
            rows.extend(
                self.repo
                    .get_aggregates_in_range(
                        &query.system_id,
                        &query.configuration_id,
                        query.start,
                        agg_end,
                        BucketSize::Hourly,
                    )
                    .await?,
            );
            rows.sort_by_key(|r| r.bucket_start);
            rows.iter()
                .map(|row| aggregate_row_to_bucket(row, interval_secs, include_aggregated_result))
                .collect()
        } else {
            Vec::new()
        };

        // Recent portion: raw observations, bucketed on demand.
        if query.end > raw_cutoff {
            let raw_start = query.start.max(raw_cutoff);
            let observations = self
                .repo
                .get_observations_in_range(
                    &query.system_id,
                    &query.configuration_id,
                    raw_start,
                    query.end,
                )
                .await?;

            for (bucket_start, group) in assign_buckets(observations, query.start, interval_secs) {
                let mut bucket = summarize_bucket(&group, bucket_start, interval_secs);
                if include_aggregated_result {
                    bucket.aggregated_result = self.annotate_bucket(strategy_id.as_deref(), &group);
                }
                buckets.push(bucket);
            }
        }

        buckets.sort_by_key(|b| b.bucket_start);
        Ok(AggregatedHistory {
            bucket_interval_seconds: interval_secs,
            buckets,
        })
    }

    /// Strategy output merged with per-collector output under "collectors".
    /// None when neither produces anything.
    fn annotate_bucket(
        &self,
        strategy_id: Option<&str>,
        observations: &[Observation],
    ) -> Option<Value> {
        let mut result = strategy_id
            .and_then(|id| self.strategies.aggregate(id, observations))
            .and_then(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default();

        let mut collector_results = serde_json::Map::new();
        for (correlation_id, payloads) in collect_collector_payloads(observations) {
            // Unknown collector ids are skipped silently.
            if let Some(aggregated) = self.collectors.aggregate(&correlation_id, &payloads) {
                collector_results.insert(correlation_id, aggregated);
            }
        }
        if !collector_results.is_empty() {
            result.insert("collectors".into(), Value::Object(collector_results));
        }

        if result.is_empty() {
            None
        } else {
            Some(Value::Object(result))
        }
    }
}

/// Groups observations by bucket index; only non-empty buckets come back.
/// Keyed by bucket start (unix ms) in ascending order.
pub fn assign_buckets(
    observations: Vec<Observation>,
    range_start: i64,
    interval_secs: u32,
) -> BTreeMap<i64, Vec<Observation>> {
    let interval_ms = interval_secs as i64 * 1000;
    let mut by_bucket: BTreeMap<i64, Vec<Observation>> = BTreeMap::new();
    for obs in observations {
        let idx = (obs.created_at - range_start) / interval_ms;
        let bucket_start = range_start + idx * interval_ms;
        by_bucket.entry(bucket_start).or_default().push(obs);
    }
    by_bucket
}

/// Derives one bucket's statistics. Observations without a latency are
/// excluded from the average, extrema, and percentile.
pub fn summarize_bucket(
    observations: &[Observation],
    bucket_start: i64,
    interval_secs: u32,
) -> Bucket {
    let run_count = observations.len() as u64;
    let healthy_count = observations.iter().filter(|o| o.is_healthy()).count() as u64;
    let degraded_count = observations
        .iter()
        .filter(|o| o.status == CheckStatus::Degraded)
        .count() as u64;
    let unhealthy_count = observations
        .iter()
        .filter(|o| o.status == CheckStatus::Unhealthy)
        .count() as u64;

    let latencies: Vec<f64> = observations.iter().filter_map(|o| o.latency_ms).collect();
    let avg_latency_ms = (!latencies.is_empty())
        .then(|| (latencies.iter().sum::<f64>() / latencies.len() as f64).round());

    Bucket {
        bucket_start,
        bucket_interval_seconds: interval_secs,
        run_count,
        healthy_count,
        degraded_count,
        unhealthy_count,
        success_rate: if run_count == 0 {
            0.0
        } else {
            healthy_count as f64 / run_count as f64
        },
        avg_latency_ms,
        p95_latency_ms: percentile_nearest_rank(&latencies, 0.95),
        aggregated_result: None,
    }
}

/// Payloads per distinct collector correlation id across the bucket.
fn collect_collector_payloads(observations: &[Observation]) -> BTreeMap<String, Vec<Value>> {
    let mut by_correlation: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for obs in observations {
        let Some(collectors) = obs.collector_payloads() else {
            continue;
        };
        for (correlation_id, payload) in collectors {
            by_correlation
                .entry(correlation_id.clone())
                .or_default()
                .push(payload.clone());
        }
    }
    by_correlation
}

/// A pre-summarized aggregate row surfaced as one bucket. Daily rows never
/// carry aggregated_result, so only hourly rows can contribute it.
fn aggregate_row_to_bucket(
    row: &AggregateRow,
    interval_secs: u32,
    include_aggregated_result: bool,
) -> Bucket {
    Bucket {
        bucket_start: row.bucket_start,
        bucket_interval_seconds: interval_secs,
        run_count: row.run_count,
        healthy_count: row.healthy_count,
        degraded_count: row.degraded_count,
        unhealthy_count: row.unhealthy_count,
        success_rate: if row.run_count == 0 {
            0.0
        } else {
            row.healthy_count as f64 / row.run_count as f64
        },
        avg_latency_ms: row.avg_latency_ms,
        p95_latency_ms: row.p95_latency_ms,
        aggregated_result: include_aggregated_result
            .then(|| row.aggregated_result.clone())
            .flatten(),
    }
}
