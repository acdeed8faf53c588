// Pure aggregation logic: raw observations → hourly row, hourly rows → daily
// rows. DB access (fetch, upsert, delete) stays in history_repo::mod.

use std::collections::BTreeMap;

use crate::models::{AggregateRow, BucketSize, CheckStatus, LatencySum, Observation};

use super::merge::{self, AverageState, CounterState, MinMaxState};

pub const MS_PER_HOUR: i64 = 3_600_000;
pub const MS_PER_DAY: i64 = 86_400_000;

/// Floors a unix-ms timestamp to its hour boundary.
pub fn floor_to_hour(ts_ms: i64) -> i64 {
    (ts_ms / MS_PER_HOUR) * MS_PER_HOUR
}

/// Floors a unix-ms timestamp to its UTC day boundary.
pub fn floor_to_day(ts_ms: i64) -> i64 {
    (ts_ms / MS_PER_DAY) * MS_PER_DAY
}

/// Nearest-rank percentile: sort ascending, take index ceil(pct × n) − 1 (0-based).
/// None on an empty slice.
pub fn percentile_nearest_rank(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (pct * sorted.len() as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(sorted.len() - 1);
    Some(sorted[idx])
}

/// Folds one hour of raw observations into an hourly aggregate row.
/// Latency statistics skip observations without a latency; the sum is exact.
/// `aggregated_result` is left to the caller (strategy output).
pub fn aggregate_hour(
    observations: &[Observation],
    system_id: &str,
    configuration_id: &str,
    hour_start: i64,
) -> Option<AggregateRow> {
    if observations.is_empty() {
        return None;
    }

    let mut runs: Option<CounterState> = None;
    let mut healthy: Option<CounterState> = None;
    let mut degraded: Option<CounterState> = None;
    let mut unhealthy: Option<CounterState> = None;
    let mut latency: Option<AverageState> = None;
    let mut extrema: Option<MinMaxState> = None;

    for obs in observations {
        runs = Some(merge::merge_counter(runs, true));
        healthy = Some(merge::merge_counter(
            healthy,
            obs.status == CheckStatus::Healthy,
        ));
        degraded = Some(merge::merge_counter(
            degraded,
            obs.status == CheckStatus::Degraded,
        ));
        unhealthy = Some(merge::merge_counter(
            unhealthy,
            obs.status == CheckStatus::Unhealthy,
        ));
        latency = Some(merge::merge_average(latency, obs.latency_ms));
        if obs.latency_ms.is_some() {
            extrema = Some(merge::merge_min_max(extrema, obs.latency_ms));
        }
    }

    let latency = latency.unwrap_or_default();
    let latencies: Vec<f64> = observations.iter().filter_map(|o| o.latency_ms).collect();

    Some(AggregateRow {
        system_id: system_id.to_string(),
        configuration_id: configuration_id.to_string(),
        bucket_start: hour_start,
        bucket_size: BucketSize::Hourly,
        run_count: runs.map(|s| s.count).unwrap_or(0),
        healthy_count: healthy.map(|s| s.count).unwrap_or(0),
        degraded_count: degraded.map(|s| s.count).unwrap_or(0),
        unhealthy_count: unhealthy.map(|s| s.count).unwrap_or(0),
        latency_sum_ms: (latency.count > 0).then_some(LatencySum::Exact(latency.sum)),
        avg_latency_ms: (latency.count > 0).then_some(latency.avg),
        min_latency_ms: extrema.map(|e| e.min),
        max_latency_ms: extrema.map(|e| e.max),
        p95_latency_ms: percentile_nearest_rank(&latencies, 0.95),
        aggregated_result: None,
    })
}

/// Groups rows by UTC calendar day and merges each group into one daily row.
/// Input may mix hourly rows with an existing daily row for the same day (the
/// rollup transaction re-reads it so retries replace instead of double-count).
pub fn rollup_to_daily(rows: &[AggregateRow]) -> Vec<AggregateRow> {
    let mut by_day: BTreeMap<i64, Vec<&AggregateRow>> = BTreeMap::new();
    for row in rows {
        by_day.entry(floor_to_day(row.bucket_start)).or_default().push(row);
    }
    by_day
        .into_iter()
        .filter_map(|(day_start, group)| rollup_day_group(&group, day_start))
        .collect()
}

/// Merges one day's rows into a single daily row.
/// p95 is the max of the group's p95 values: an upper bound, not an exact
/// percentile, because the individual samples are gone at this tier.
fn rollup_day_group(group: &[&AggregateRow], day_start: i64) -> Option<AggregateRow> {
    let first = group.first()?;

    let mut runs: Option<CounterState> = None;
    let mut healthy: Option<CounterState> = None;
    let mut degraded: Option<CounterState> = None;
    let mut unhealthy: Option<CounterState> = None;
    let mut extrema: Option<MinMaxState> = None;

    let mut latency_sum = 0.0_f64;
    let mut have_latency = false;
    let mut approximated = false;
    let mut p95: Option<f64> = None;

    for row in group {
        runs = Some(merge::merge_counter(runs, row.run_count));
        healthy = Some(merge::merge_counter(healthy, row.healthy_count));
        degraded = Some(merge::merge_counter(degraded, row.degraded_count));
        unhealthy = Some(merge::merge_counter(unhealthy, row.unhealthy_count));

        match row.latency_sum_ms {
            Some(LatencySum::Exact(sum)) => {
                latency_sum += sum;
                have_latency = true;
            }
            Some(LatencySum::Approximated(sum)) => {
                latency_sum += sum;
                have_latency = true;
                approximated = true;
            }
            // Legacy/partial row without a stored sum: approximate from avg × count.
            None => {
                if let Some(avg) = row.avg_latency_ms {
                    latency_sum += avg * row.run_count as f64;
                    have_latency = true;
                    approximated = true;
                }
            }
        }

        if row.min_latency_ms.is_some() {
            extrema = Some(merge::merge_min_max(extrema, row.min_latency_ms));
        }
        if row.max_latency_ms.is_some() {
            extrema = Some(merge::merge_min_max(extrema, row.max_latency_ms));
        }
        if let Some(row_p95) = row.p95_latency_ms {
            p95 = Some(p95.map_or(row_p95, |v: f64| v.max(row_p95)));
        }
    }

    let run_count = runs.map(|s| s.count).unwrap_or(0);
    let latency_sum_ms = have_latency.then_some(if approximated {
        LatencySum::Approximated(latency_sum)
    } else {
        LatencySum::Exact(latency_sum)
    });
    let avg_latency_ms = (have_latency && run_count > 0)
        .then(|| (latency_sum / run_count as f64).round());

    Some(AggregateRow {
        system_id: first.system_id.clone(),
        configuration_id: first.configuration_id.clone(),
        bucket_start: day_start,
        bucket_size: BucketSize::Daily,
        run_count,
        healthy_count: healthy.map(|s| s.count).unwrap_or(0),
        degraded_count: degraded.map(|s| s.count).unwrap_or(0),
        unhealthy_count: unhealthy.map(|s| s.count).unwrap_or(0),
        latency_sum_ms,
        avg_latency_ms,
        min_latency_ms: extrema.map(|e| e.min),
        max_latency_ms: extrema.map(|e| e.max),
        p95_latency_ms: p95,
        aggregated_result: None,
    })
}
