// SQLite history for check runs. Three tables: observations (raw runs),
// check_aggregates (hourly + daily summary rows), retention_configs
// (per-assignment windows). check_configurations maps an assignment to its
// strategy id for query-time metadata.

pub mod aggregation;
pub mod merge;

use crate::models::{
    AggregateRow, BucketSize, CheckStatus, LatencySum, Observation, RetentionPolicy,
};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

pub struct HistoryRepo {
    pool: SqlitePool,
}

impl HistoryRepo {
    pub async fn connect(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                system_id TEXT NOT NULL,
                configuration_id TEXT NOT NULL,
                status TEXT NOT NULL,
                latency_ms REAL,
                result TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_observations_assignment_created_at
             ON observations(system_id, configuration_id, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS check_aggregates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                system_id TEXT NOT NULL,
                configuration_id TEXT NOT NULL,
                bucket_start INTEGER NOT NULL,
                bucket_size TEXT NOT NULL,
                run_count INTEGER NOT NULL,
                healthy_count INTEGER NOT NULL,
                degraded_count INTEGER NOT NULL,
                unhealthy_count INTEGER NOT NULL,
                latency_sum_ms REAL,
                latency_sum_exact INTEGER NOT NULL DEFAULT 1,
                avg_latency_ms REAL,
                min_latency_ms REAL,
                max_latency_ms REAL,
                p95_latency_ms REAL,
                aggregated_result TEXT,
                UNIQUE(system_id, configuration_id, bucket_size, bucket_start)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_aggregates_assignment_size_start
             ON check_aggregates(system_id, configuration_id, bucket_size, bucket_start)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS retention_configs (
                system_id TEXT NOT NULL,
                configuration_id TEXT NOT NULL,
                raw_retention_days INTEGER NOT NULL,
                hourly_retention_days INTEGER NOT NULL,
                daily_retention_days INTEGER NOT NULL,
                PRIMARY KEY (system_id, configuration_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS check_configurations (
                system_id TEXT NOT NULL,
                configuration_id TEXT NOT NULL,
                strategy_id TEXT NOT NULL,
                PRIMARY KEY (system_id, configuration_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_configuration(
        &self,
        system_id: &str,
        configuration_id: &str,
        strategy_id: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO check_configurations (system_id, configuration_id, strategy_id)
             VALUES ($1, $2, $3)",
        )
        .bind(system_id)
        .bind(configuration_id)
        .bind(strategy_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Strategy id for an assignment; None when the configuration no longer exists.
    pub async fn get_configuration_strategy(
        &self,
        system_id: &str,
        configuration_id: &str,
    ) -> anyhow::Result<Option<String>> {
        let row = sqlx::query_scalar::<_, String>(
            "SELECT strategy_id FROM check_configurations
             WHERE system_id = $1 AND configuration_id = $2",
        )
        .bind(system_id)
        .bind(configuration_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn upsert_retention_policy(
        &self,
        system_id: &str,
        configuration_id: &str,
        policy: &RetentionPolicy,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO retention_configs
             (system_id, configuration_id, raw_retention_days, hourly_retention_days, daily_retention_days)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(system_id)
        .bind(configuration_id)
        .bind(policy.raw_retention_days as i64)
        .bind(policy.hourly_retention_days as i64)
        .bind(policy.daily_retention_days as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stored retention windows for an assignment; None when the assignment
    /// has no row (callers fall back to their configured defaults).
    pub async fn get_retention_policy(
        &self,
        system_id: &str,
        configuration_id: &str,
    ) -> anyhow::Result<Option<RetentionPolicy>> {
        let row = sqlx::query(
            "SELECT raw_retention_days, hourly_retention_days, daily_retention_days
             FROM retention_configs WHERE system_id = $1 AND configuration_id = $2",
        )
        .bind(system_id)
        .bind(configuration_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(RetentionPolicy {
            raw_retention_days: row.try_get::<i64, _>("raw_retention_days")? as u32,
            hourly_retention_days: row.try_get::<i64, _>("hourly_retention_days")? as u32,
            daily_retention_days: row.try_get::<i64, _>("daily_retention_days")? as u32,
        }))
    }

    /// Persists a completed run and refreshes its hourly aggregate row in one
    /// transaction. `annotate` receives the hour's observations (including the
    /// new one) and produces the row's aggregated_result, typically via the
    /// assignment's strategy.
    #[instrument(skip(self, observation, annotate), fields(repo = "history", operation = "record_run"))]
    pub async fn record_run<F>(
        &self,
        observation: &Observation,
        annotate: F,
    ) -> anyhow::Result<AggregateRow>
    where
        F: FnOnce(&[Observation]) -> Option<serde_json::Value>,
    {
        let mut tx = self.pool.begin().await?;

        let result_text = observation
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            "INSERT INTO observations (system_id, configuration_id, status, latency_ms, result, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&observation.system_id)
        .bind(&observation.configuration_id)
        .bind(observation.status.as_str())
        .bind(observation.latency_ms)
        .bind(&result_text)
        .bind(observation.created_at)
        .execute(&mut *tx)
        .await?;

        let hour_start = aggregation::floor_to_hour(observation.created_at);
        let rows = sqlx::query(
            "SELECT id, system_id, configuration_id, status, latency_ms, result, created_at
             FROM observations
             WHERE system_id = $1 AND configuration_id = $2 AND created_at >= $3 AND created_at < $4
             ORDER BY created_at ASC",
        )
        .bind(&observation.system_id)
        .bind(&observation.configuration_id)
        .bind(hour_start)
        .bind(hour_start + aggregation::MS_PER_HOUR)
        .fetch_all(&mut *tx)
        .await?;

        let mut hour_observations = Vec::with_capacity(rows.len());
        for row in rows {
            hour_observations.push(parse_observation_row(&row)?);
        }

        let mut agg = aggregation::aggregate_hour(
            &hour_observations,
            &observation.system_id,
            &observation.configuration_id,
            hour_start,
        )
        .ok_or_else(|| anyhow::anyhow!("hour bucket empty after insert"))?;
        agg.aggregated_result = annotate(&hour_observations);

        upsert_aggregate(&mut tx, &agg).await?;
        tx.commit().await?;
        Ok(agg)
    }

    /// Writes one aggregate row directly (replacing any row with the same
    /// key). The writer path maintains hourly rows itself; this is for
    /// rollup seeding and migrations.
    #[instrument(skip(self, agg), fields(repo = "history", operation = "save_aggregate"))]
    pub async fn save_aggregate(&self, agg: &AggregateRow) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_aggregate(&mut tx, agg).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Raw observations in [from_ts, to_ts) for one assignment, ascending by created_at.
    #[instrument(
        skip(self),
        fields(repo = "history", operation = "get_observations_in_range")
    )]
    pub async fn get_observations_in_range(
        &self,
        system_id: &str,
        configuration_id: &str,
        from_ts: i64,
        to_ts: i64,
    ) -> anyhow::Result<Vec<Observation>> {
        let rows = sqlx::query(
            "SELECT id, system_id, configuration_id, status, latency_ms, result, created_at
             FROM observations
             WHERE system_id = $1 AND configuration_id = $2 AND created_at >= $3 AND created_at < $4
             ORDER BY created_at ASC",
        )
        .bind(system_id)
        .bind(configuration_id)
        .bind(from_ts)
        .bind(to_ts)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(parse_observation_row(&row)?);
        }
        Ok(out)
    }

    /// Aggregate rows in [from_ts, to_ts) for the given size, ascending by bucket_start.
    #[instrument(
        skip(self),
        fields(repo = "history", operation = "get_aggregates_in_range")
    )]
    pub async fn get_aggregates_in_range(
        &self,
        system_id: &str,
        configuration_id: &str,
        from_ts: i64,
        to_ts: i64,
        size: BucketSize,
    ) -> anyhow::Result<Vec<AggregateRow>> {
        let rows = sqlx::query(
            "SELECT system_id, configuration_id, bucket_start, bucket_size, run_count,
                    healthy_count, degraded_count, unhealthy_count, latency_sum_ms,
                    latency_sum_exact, avg_latency_ms, min_latency_ms, max_latency_ms,
                    p95_latency_ms, aggregated_result
             FROM check_aggregates
             WHERE system_id = $1 AND configuration_id = $2 AND bucket_size = $3
               AND bucket_start >= $4 AND bucket_start < $5
             ORDER BY bucket_start ASC",
        )
        .bind(system_id)
        .bind(configuration_id)
        .bind(size.as_str())
        .bind(from_ts)
        .bind(to_ts)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(parse_aggregate_row(&row)?);
        }
        Ok(out)
    }

    /// Delete raw observations with created_at < cutoff_ts.
    #[instrument(
        skip(self),
        fields(repo = "history", operation = "delete_observations_before")
    )]
    pub async fn delete_observations_before(
        &self,
        system_id: &str,
        configuration_id: &str,
        cutoff_ts: i64,
    ) -> anyhow::Result<u64> {
        let r = sqlx::query(
            "DELETE FROM observations
             WHERE system_id = $1 AND configuration_id = $2 AND created_at < $3",
        )
        .bind(system_id)
        .bind(configuration_id)
        .bind(cutoff_ts)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }

    /// Rolls hourly rows with bucket_start < cutoff_ts into daily rows.
    /// Fetch, daily upsert, and hourly delete run in ONE transaction: a retry
    /// after a crash re-reads surviving hourly rows plus any existing daily
    /// row, so nothing is double-counted or dropped. Returns the number of
    /// daily rows written.
    #[instrument(
        skip(self),
        fields(repo = "history", operation = "rollup_hourly_before")
    )]
    pub async fn rollup_hourly_before(
        &self,
        system_id: &str,
        configuration_id: &str,
        cutoff_ts: i64,
    ) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "SELECT system_id, configuration_id, bucket_start, bucket_size, run_count,
                    healthy_count, degraded_count, unhealthy_count, latency_sum_ms,
                    latency_sum_exact, avg_latency_ms, min_latency_ms, max_latency_ms,
                    p95_latency_ms, aggregated_result
             FROM check_aggregates
             WHERE system_id = $1 AND configuration_id = $2 AND bucket_size = 'hourly'
               AND bucket_start < $3
             ORDER BY bucket_start ASC",
        )
        .bind(system_id)
        .bind(configuration_id)
        .bind(cutoff_ts)
        .fetch_all(&mut *tx)
        .await?;

        if rows.is_empty() {
            return Ok(0);
        }

        let mut group = Vec::with_capacity(rows.len());
        for row in rows {
            group.push(parse_aggregate_row(&row)?);
        }

        // Fold in existing daily rows for the affected days so a rerun merges
        // instead of overwriting.
        let mut days: Vec<i64> = group
            .iter()
            .map(|r| aggregation::floor_to_day(r.bucket_start))
            .collect();
        days.sort_unstable();
        days.dedup();
        for day_start in &days {
            let existing = sqlx::query(
                "SELECT system_id, configuration_id, bucket_start, bucket_size, run_count,
                        healthy_count, degraded_count, unhealthy_count, latency_sum_ms,
                        latency_sum_exact, avg_latency_ms, min_latency_ms, max_latency_ms,
                        p95_latency_ms, aggregated_result
                 FROM check_aggregates
                 WHERE system_id = $1 AND configuration_id = $2 AND bucket_size = 'daily'
                   AND bucket_start = $3",
            )
            .bind(system_id)
            .bind(configuration_id)
            .bind(day_start)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(row) = existing {
                group.push(parse_aggregate_row(&row)?);
            }
        }

        let dailies = aggregation::rollup_to_daily(&group);
        for daily in &dailies {
            upsert_aggregate(&mut tx, daily).await?;
        }

        sqlx::query(
            "DELETE FROM check_aggregates
             WHERE system_id = $1 AND configuration_id = $2 AND bucket_size = 'hourly'
               AND bucket_start < $3",
        )
        .bind(system_id)
        .bind(configuration_id)
        .bind(cutoff_ts)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(dailies.len() as u64)
    }

    /// Delete daily rows with bucket_start < cutoff_ts.
    #[instrument(
        skip(self),
        fields(repo = "history", operation = "delete_daily_before")
    )]
    pub async fn delete_daily_before(
        &self,
        system_id: &str,
        configuration_id: &str,
        cutoff_ts: i64,
    ) -> anyhow::Result<u64> {
        let r = sqlx::query(
            "DELETE FROM check_aggregates
             WHERE system_id = $1 AND configuration_id = $2 AND bucket_size = 'daily'
               AND bucket_start < $3",
        )
        .bind(system_id)
        .bind(configuration_id)
        .bind(cutoff_ts)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }

    /// Every system+configuration pair with stored data. Drawn from the data
    /// tables (not check_configurations) so deleted configurations still get
    /// their leftovers retired.
    pub async fn list_assignments(&self) -> anyhow::Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            "SELECT DISTINCT system_id, configuration_id FROM observations
             UNION
             SELECT DISTINCT system_id, configuration_id FROM check_aggregates
             ORDER BY system_id, configuration_id",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push((row.try_get("system_id")?, row.try_get("configuration_id")?));
        }
        Ok(out)
    }

    /// Reclaim space after deletes (run periodically after retention).
    #[instrument(skip(self), fields(repo = "history", operation = "vacuum"))]
    pub async fn vacuum(&self) -> anyhow::Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}

async fn upsert_aggregate(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    agg: &AggregateRow,
) -> anyhow::Result<()> {
    let (latency_sum_ms, latency_sum_exact) = match agg.latency_sum_ms {
        Some(LatencySum::Exact(v)) => (Some(v), true),
        Some(LatencySum::Approximated(v)) => (Some(v), false),
        None => (None, true),
    };
    let aggregated_result = agg
        .aggregated_result
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO check_aggregates
        (system_id, configuration_id, bucket_start, bucket_size, run_count,
         healthy_count, degraded_count, unhealthy_count, latency_sum_ms,
         latency_sum_exact, avg_latency_ms, min_latency_ms, max_latency_ms,
         p95_latency_ms, aggregated_result)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT(system_id, configuration_id, bucket_size, bucket_start) DO UPDATE SET
            run_count = excluded.run_count,
            healthy_count = excluded.healthy_count,
            degraded_count = excluded.degraded_count,
            unhealthy_count = excluded.unhealthy_count,
            latency_sum_ms = excluded.latency_sum_ms,
            latency_sum_exact = excluded.latency_sum_exact,
            avg_latency_ms = excluded.avg_latency_ms,
            min_latency_ms = excluded.min_latency_ms,
            max_latency_ms = excluded.max_latency_ms,
            p95_latency_ms = excluded.p95_latency_ms,
            aggregated_result = excluded.aggregated_result
        "#,
    )
    .bind(&agg.system_id)
    .bind(&agg.configuration_id)
    .bind(agg.bucket_start)
    .bind(agg.bucket_size.as_str())
    .bind(agg.run_count as i64)
    .bind(agg.healthy_count as i64)
    .bind(agg.degraded_count as i64)
    .bind(agg.unhealthy_count as i64)
    .bind(latency_sum_ms)
    .bind(latency_sum_exact)
    .bind(agg.avg_latency_ms)
    .bind(agg.min_latency_ms)
    .bind(agg.max_latency_ms)
    .bind(agg.p95_latency_ms)
    .bind(&aggregated_result)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn parse_observation_row(row: &SqliteRow) -> anyhow::Result<Observation> {
    let status: String = row.try_get("status")?;
    let result_text: Option<String> = row.try_get("result")?;
    let result = result_text.and_then(|s| match serde_json::from_str(&s) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::debug!(error = %e, "corrupt result payload, dropping");
            None
        }
    });
    Ok(Observation {
        id: row.try_get("id")?,
        system_id: row.try_get("system_id")?,
        configuration_id: row.try_get("configuration_id")?,
        status: CheckStatus::from_column(&status),
        latency_ms: row.try_get("latency_ms")?,
        result,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_aggregate_row(row: &SqliteRow) -> anyhow::Result<AggregateRow> {
    let bucket_size: String = row.try_get("bucket_size")?;
    let latency_sum_ms: Option<f64> = row.try_get("latency_sum_ms")?;
    let latency_sum_exact: bool = row.try_get("latency_sum_exact")?;
    let latency_sum_ms = latency_sum_ms.map(|v| {
        if latency_sum_exact {
            LatencySum::Exact(v)
        } else {
            LatencySum::Approximated(v)
        }
    });
    let aggregated_result_text: Option<String> = row.try_get("aggregated_result")?;
    let aggregated_result = aggregated_result_text.and_then(|s| match serde_json::from_str(&s) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::debug!(error = %e, "corrupt aggregated_result, dropping");
            None
        }
    });
    Ok(AggregateRow {
        system_id: row.try_get("system_id")?,
        configuration_id: row.try_get("configuration_id")?,
        bucket_start: row.try_get("bucket_start")?,
        bucket_size: BucketSize::from_column(&bucket_size),
        run_count: row.try_get::<i64, _>("run_count")? as u64,
        healthy_count: row.try_get::<i64, _>("healthy_count")? as u64,
        degraded_count: row.try_get::<i64, _>("degraded_count")? as u64,
        unhealthy_count: row.try_get::<i64, _>("unhealthy_count")? as u64,
        latency_sum_ms,
        avg_latency_ms: row.try_get("avg_latency_ms")?,
        min_latency_ms: row.try_get("min_latency_ms")?,
        max_latency_ms: row.try_get("max_latency_ms")?,
        p95_latency_ms: row.try_get("p95_latency_ms")?,
        aggregated_result,
    })
}
