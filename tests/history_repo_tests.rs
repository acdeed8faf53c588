// HistoryRepo tests: init, record_run, range queries, retention policy, rollup transaction

mod common;

use common::{hourly_row, now_ms, observation, temp_repo};
use pulsewatch::history_repo::aggregation::{MS_PER_DAY, MS_PER_HOUR, floor_to_hour};
use pulsewatch::models::{BucketSize, CheckStatus, LatencySum, RetentionPolicy};
use tempfile::TempDir;

#[tokio::test]
async fn connect_and_init_twice() {
    let dir = TempDir::new().unwrap();
    let repo = temp_repo(&dir).await;
    // Second init is a no-op (IF NOT EXISTS)
    repo.init().await.unwrap();
}

#[tokio::test]
async fn record_run_persists_observation_and_hourly_row() {
    let dir = TempDir::new().unwrap();
    let repo = temp_repo(&dir).await;

    // Pin both runs well inside one hour so they share a bucket.
    let hour = floor_to_hour(now_ms());
    let ts = hour + 60_000;
    repo.record_run(
        &observation("sys-1", "cfg-1", CheckStatus::Healthy, Some(100.0), ts),
        |_| None,
    )
    .await
    .unwrap();
    repo.record_run(
        &observation("sys-1", "cfg-1", CheckStatus::Unhealthy, Some(300.0), ts + 1),
        |_| None,
    )
    .await
    .unwrap();

    let observations = repo
        .get_observations_in_range("sys-1", "cfg-1", hour, hour + MS_PER_HOUR)
        .await
        .unwrap();
    assert_eq!(observations.len(), 2);
    assert_eq!(observations[0].status, CheckStatus::Healthy);
    assert_eq!(observations[0].latency_ms, Some(100.0));

    let rows = repo
        .get_aggregates_in_range("sys-1", "cfg-1", hour, hour + MS_PER_HOUR, BucketSize::Hourly)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.bucket_start, hour);
    assert_eq!(row.run_count, 2);
    assert_eq!(row.healthy_count, 1);
    assert_eq!(row.unhealthy_count, 1);
    assert_eq!(row.latency_sum_ms, Some(LatencySum::Exact(400.0)));
    assert_eq!(row.avg_latency_ms, Some(200.0));
    assert_eq!(row.min_latency_ms, Some(100.0));
    assert_eq!(row.max_latency_ms, Some(300.0));
    // Nearest rank over [100, 300]: ceil(0.95 × 2) − 1 = 1
    assert_eq!(row.p95_latency_ms, Some(300.0));
}

#[tokio::test]
async fn record_run_annotates_hourly_row() {
    let dir = TempDir::new().unwrap();
    let repo = temp_repo(&dir).await;

    let now = now_ms();
    repo.record_run(
        &observation("sys-1", "cfg-1", CheckStatus::Healthy, Some(50.0), now),
        |hour_observations| {
            Some(serde_json::json!({ "checked": hour_observations.len() }))
        },
    )
    .await
    .unwrap();

    let hour = floor_to_hour(now);
    let rows = repo
        .get_aggregates_in_range("sys-1", "cfg-1", hour, hour + MS_PER_HOUR, BucketSize::Hourly)
        .await
        .unwrap();
    assert_eq!(
        rows[0].aggregated_result,
        Some(serde_json::json!({ "checked": 1 }))
    );
}

#[tokio::test]
async fn retention_policy_roundtrip_and_fallback() {
    let dir = TempDir::new().unwrap();
    let repo = temp_repo(&dir).await;

    assert_eq!(
        repo.get_retention_policy("sys-1", "cfg-1").await.unwrap(),
        None
    );

    let policy = RetentionPolicy {
        raw_retention_days: 3,
        hourly_retention_days: 14,
        daily_retention_days: 90,
    };
    repo.upsert_retention_policy("sys-1", "cfg-1", &policy)
        .await
        .unwrap();
    assert_eq!(
        repo.get_retention_policy("sys-1", "cfg-1").await.unwrap(),
        Some(policy)
    );
}

#[tokio::test]
async fn configuration_strategy_lookup() {
    let dir = TempDir::new().unwrap();
    let repo = temp_repo(&dir).await;

    assert_eq!(
        repo.get_configuration_strategy("sys-1", "cfg-1").await.unwrap(),
        None
    );
    repo.upsert_configuration("sys-1", "cfg-1", "tcp").await.unwrap();
    assert_eq!(
        repo.get_configuration_strategy("sys-1", "cfg-1").await.unwrap(),
        Some("tcp".into())
    );
}

#[tokio::test]
async fn list_assignments_spans_both_tables() {
    let dir = TempDir::new().unwrap();
    let repo = temp_repo(&dir).await;

    let now = now_ms();
    repo.record_run(
        &observation("sys-a", "cfg-1", CheckStatus::Healthy, None, now),
        |_| None,
    )
    .await
    .unwrap();
    // Aggregate-only assignment (its raw rows already expired).
    repo.save_aggregate(&hourly_row(
        "sys-b", "cfg-2", 0, 1, 1, 0, None, None, None, None, None,
    ))
    .await
    .unwrap();

    let assignments = repo.list_assignments().await.unwrap();
    assert_eq!(
        assignments,
        vec![
            ("sys-a".to_string(), "cfg-1".to_string()),
            ("sys-b".to_string(), "cfg-2".to_string()),
        ]
    );
}

#[tokio::test]
async fn delete_observations_before_cutoff() {
    let dir = TempDir::new().unwrap();
    let repo = temp_repo(&dir).await;

    let now = now_ms();
    let old = now - 8 * MS_PER_DAY;
    repo.record_run(
        &observation("sys-1", "cfg-1", CheckStatus::Healthy, None, old),
        |_| None,
    )
    .await
    .unwrap();
    repo.record_run(
        &observation("sys-1", "cfg-1", CheckStatus::Healthy, None, now),
        |_| None,
    )
    .await
    .unwrap();

    let deleted = repo
        .delete_observations_before("sys-1", "cfg-1", now - 7 * MS_PER_DAY)
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let remaining = repo
        .get_observations_in_range("sys-1", "cfg-1", 0, now + 1)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].created_at, now);
}

#[tokio::test]
async fn rollup_consumes_hourly_rows() {
    let dir = TempDir::new().unwrap();
    let repo = temp_repo(&dir).await;

    let day = 100 * MS_PER_DAY;
    repo.save_aggregate(&hourly_row(
        "sys-1",
        "cfg-1",
        day,
        2,
        2,
        0,
        Some(LatencySum::Exact(300.0)),
        Some(150.0),
        Some(100.0),
        Some(200.0),
        Some(200.0),
    ))
    .await
    .unwrap();
    repo.save_aggregate(&hourly_row(
        "sys-1",
        "cfg-1",
        day + MS_PER_HOUR,
        4,
        3,
        1,
        Some(LatencySum::Exact(1000.0)),
        Some(250.0),
        Some(50.0),
        Some(400.0),
        Some(390.0),
    ))
    .await
    .unwrap();

    let written = repo
        .rollup_hourly_before("sys-1", "cfg-1", day + MS_PER_DAY)
        .await
        .unwrap();
    assert_eq!(written, 1);

    let hourly_left = repo
        .get_aggregates_in_range("sys-1", "cfg-1", 0, i64::MAX, BucketSize::Hourly)
        .await
        .unwrap();
    assert!(hourly_left.is_empty(), "consumed hourly rows must be gone");

    let dailies = repo
        .get_aggregates_in_range("sys-1", "cfg-1", 0, i64::MAX, BucketSize::Daily)
        .await
        .unwrap();
    assert_eq!(dailies.len(), 1);
    let d = &dailies[0];
    assert_eq!(d.run_count, 6);
    assert_eq!(d.healthy_count, 5);
    assert_eq!(d.unhealthy_count, 1);
    assert_eq!(d.latency_sum_ms, Some(LatencySum::Exact(1300.0)));
    assert_eq!(d.avg_latency_ms, Some(217.0));
    assert_eq!(d.min_latency_ms, Some(50.0));
    assert_eq!(d.max_latency_ms, Some(400.0));
    assert_eq!(d.p95_latency_ms, Some(390.0));
    assert!(d.aggregated_result.is_none());
}

#[tokio::test]
async fn rollup_merges_into_existing_daily_row() {
    let dir = TempDir::new().unwrap();
    let repo = temp_repo(&dir).await;

    let day = 100 * MS_PER_DAY;
    repo.save_aggregate(&hourly_row(
        "sys-1",
        "cfg-1",
        day,
        2,
        2,
        0,
        Some(LatencySum::Exact(200.0)),
        Some(100.0),
        Some(50.0),
        Some(150.0),
        Some(150.0),
    ))
    .await
    .unwrap();
    repo.rollup_hourly_before("sys-1", "cfg-1", day + MS_PER_DAY)
        .await
        .unwrap();

    // A late hourly row for the same (already rolled up) day.
    repo.save_aggregate(&hourly_row(
        "sys-1",
        "cfg-1",
        day + 2 * MS_PER_HOUR,
        1,
        0,
        1,
        Some(LatencySum::Exact(500.0)),
        Some(500.0),
        Some(500.0),
        Some(500.0),
        Some(500.0),
    ))
    .await
    .unwrap();
    repo.rollup_hourly_before("sys-1", "cfg-1", day + MS_PER_DAY)
        .await
        .unwrap();

    let dailies = repo
        .get_aggregates_in_range("sys-1", "cfg-1", 0, i64::MAX, BucketSize::Daily)
        .await
        .unwrap();
    assert_eq!(dailies.len(), 1);
    let d = &dailies[0];
    assert_eq!(d.run_count, 3);
    assert_eq!(d.healthy_count, 2);
    assert_eq!(d.unhealthy_count, 1);
    assert_eq!(d.latency_sum_ms, Some(LatencySum::Exact(700.0)));
    assert_eq!(d.max_latency_ms, Some(500.0));
}

#[tokio::test]
async fn rollup_without_hourly_rows_is_noop() {
    let dir = TempDir::new().unwrap();
    let repo = temp_repo(&dir).await;
    let written = repo
        .rollup_hourly_before("sys-1", "cfg-1", i64::MAX)
        .await
        .unwrap();
    assert_eq!(written, 0);
}
