// Shared test helpers (not every test binary uses every helper)
#![allow(dead_code)]

use pulsewatch::history_repo::HistoryRepo;
use pulsewatch::models::{AggregateRow, BucketSize, CheckStatus, LatencySum, Observation};

pub async fn temp_repo(dir: &tempfile::TempDir) -> HistoryRepo {
    let path = dir.path().join("history.db");
    let repo = HistoryRepo::connect(path.to_str().unwrap()).await.unwrap();
    repo.init().await.unwrap();
    repo
}

pub fn observation(
    system_id: &str,
    configuration_id: &str,
    status: CheckStatus,
    latency_ms: Option<f64>,
    created_at: i64,
) -> Observation {
    Observation {
        id: 0,
        system_id: system_id.into(),
        configuration_id: configuration_id.into(),
        status,
        latency_ms,
        result: None,
        created_at,
    }
}

pub fn hourly_row(
    system_id: &str,
    configuration_id: &str,
    bucket_start: i64,
    run_count: u64,
    healthy_count: u64,
    unhealthy_count: u64,
    latency_sum_ms: Option<LatencySum>,
    avg_latency_ms: Option<f64>,
    min_latency_ms: Option<f64>,
    max_latency_ms: Option<f64>,
    p95_latency_ms: Option<f64>,
) -> AggregateRow {
    AggregateRow {
        system_id: system_id.into(),
        configuration_id: configuration_id.into(),
        bucket_start,
        bucket_size: BucketSize::Hourly,
        run_count,
        healthy_count,
        degraded_count: 0,
        unhealthy_count,
        latency_sum_ms,
        avg_latency_ms,
        min_latency_ms,
        max_latency_ms,
        p95_latency_ms,
        aggregated_result: None,
    }
}

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}
