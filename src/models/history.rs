// Query response: non-empty time buckets with derived statistics.

use serde::{Deserialize, Serialize};

/// One non-empty time bucket. `aggregated_result` is present only when the
/// caller asked for it and a strategy (or collector) produced output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    /// Unix ms of the bucket's start.
    pub bucket_start: i64,
    pub bucket_interval_seconds: u32,
    pub run_count: u64,
    pub healthy_count: u64,
    pub degraded_count: u64,
    pub unhealthy_count: u64,
    /// healthy_count / run_count as a ratio in [0, 1].
    pub success_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p95_latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated_result: Option<serde_json::Value>,
}

/// `get_aggregated_history` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedHistory {
    pub bucket_interval_seconds: u32,
    pub buckets: Vec<Bucket>,
}
