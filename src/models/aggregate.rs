// Aggregate row: one row per (system, configuration, bucket_size, bucket_start).
// Hourly rows are written incrementally; daily rows only by rollup.

use serde::{Deserialize, Serialize};

/// Granularity of an aggregate row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketSize {
    Hourly,
    Daily,
}

impl BucketSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketSize::Hourly => "hourly",
            BucketSize::Daily => "daily",
        }
    }

    pub fn from_column(s: &str) -> BucketSize {
        match s {
            "daily" => BucketSize::Daily,
            _ => BucketSize::Hourly,
        }
    }
}

/// Latency sum with provenance. Rollup substitutes `avg × count` for hourly
/// rows that lack an exact sum; the result is then Approximated so downstream
/// consumers can tell the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "ms")]
pub enum LatencySum {
    Exact(f64),
    Approximated(f64),
}

impl LatencySum {
    pub fn ms(&self) -> f64 {
        match self {
            LatencySum::Exact(v) | LatencySum::Approximated(v) => *v,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, LatencySum::Exact(_))
    }
}

/// One aggregate row. Daily rows never carry `aggregated_result`: opaque
/// per-strategy payloads are not generically mergeable across hour boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRow {
    pub system_id: String,
    pub configuration_id: String,
    /// Unix ms, floored to the bucket size.
    pub bucket_start: i64,
    pub bucket_size: BucketSize,
    pub run_count: u64,
    pub healthy_count: u64,
    pub degraded_count: u64,
    pub unhealthy_count: u64,
    pub latency_sum_ms: Option<LatencySum>,
    pub avg_latency_ms: Option<f64>,
    pub min_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<f64>,
    pub aggregated_result: Option<serde_json::Value>,
}
