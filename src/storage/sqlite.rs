//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for API reads during writes
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Timestamps are stored as Unix milliseconds and latencies as microseconds.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use crate::actors::messages::{AggregateWindow, ProbeOutcome};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (or create) the database file and run migrations
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // fail fast, the log processor retries on its own
            .busy_timeout(Duration::from_secs(2));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn duration_to_micros(duration: Duration) -> i64 {
        i64::try_from(duration.as_micros()).unwrap_or(i64::MAX)
    }

    fn micros_to_duration(micros: i64) -> Duration {
        Duration::from_micros(micros.max(0) as u64)
    }

    fn outcome_from_row(row: &SqliteRow) -> StorageResult<ProbeOutcome> {
        let status_code: Option<i64> = row.try_get("status_code")?;
        let status_code = status_code
            .map(u16::try_from)
            .transpose()
            .map_err(|e| StorageError::SerializationError(format!("invalid status code: {e}")))?;

        Ok(ProbeOutcome {
            target: row.try_get("target")?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?),
            success: row.try_get("success")?,
            status_code,
            latency: Self::micros_to_duration(row.try_get("latency_us")?),
            error_detail: row.try_get("error_detail")?,
        })
    }

    fn window_from_row(row: &SqliteRow) -> StorageResult<AggregateWindow> {
        let window_ms: i64 = row.try_get("window_ms")?;
        let success_count: i64 = row.try_get("success_count")?;
        let failure_count: i64 = row.try_get("failure_count")?;

        Ok(AggregateWindow {
            target: row.try_get("target")?,
            window_start: Self::millis_to_timestamp(row.try_get("window_start")?),
            window_duration: Duration::from_millis(window_ms.max(0) as u64),
            success_count: success_count.max(0) as u64,
            failure_count: failure_count.max(0) as u64,
            avg_latency: Self::micros_to_duration(row.try_get("avg_latency_us")?),
            partial: row.try_get("partial")?,
        })
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip_all, fields(target = %outcome.target))]
    async fn store_outcome(&self, outcome: &ProbeOutcome) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO probe_outcomes (
                target, timestamp, success, status_code, latency_us, error_detail
            )
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&outcome.target)
        .bind(outcome.timestamp.timestamp_millis())
        .bind(outcome.success)
        .bind(outcome.status_code.map(i64::from))
        .bind(Self::duration_to_micros(outcome.latency))
        .bind(&outcome.error_detail)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip_all, fields(target = %window.target))]
    async fn store_window(&self, window: &AggregateWindow) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO aggregate_windows (
                target, window_start, window_ms, success_count,
                failure_count, avg_latency_us, partial
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (target, window_start) DO UPDATE SET
                window_ms = excluded.window_ms,
                success_count = excluded.success_count,
                failure_count = excluded.failure_count,
                avg_latency_us = excluded.avg_latency_us,
                partial = excluded.partial
            "#,
        )
        .bind(&window.target)
        .bind(window.window_start.timestamp_millis())
        .bind(i64::try_from(window.window_duration.as_millis()).unwrap_or(i64::MAX))
        .bind(window.success_count as i64)
        .bind(window.failure_count as i64)
        .bind(Self::duration_to_micros(window.avg_latency))
        .bind(window.partial)
        .execute(&self.pool)
        .await?;

        debug!("stored window starting at {}", window.window_start);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_windows(&self, target: &str, limit: usize) -> StorageResult<Vec<AggregateWindow>> {
        let rows = sqlx::query(
            r#"
            SELECT target, window_start, window_ms, success_count,
                   failure_count, avg_latency_us, partial
            FROM aggregate_windows
            WHERE target = ?
            ORDER BY window_start DESC
            LIMIT ?
            "#,
        )
        .bind(target)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::window_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn query_latest_outcomes(&self, target: &str, limit: usize) -> StorageResult<Vec<ProbeOutcome>> {
        let rows = sqlx::query(
            r#"
            SELECT target, timestamp, success, status_code, latency_us, error_detail
            FROM probe_outcomes
            WHERE target = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(target)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::outcome_from_row).collect()
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_before(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let before_millis = before.timestamp_millis();

        let outcomes = sqlx::query("DELETE FROM probe_outcomes WHERE timestamp < ?")
            .bind(before_millis)
            .execute(&self.pool)
            .await?;

        let windows = sqlx::query("DELETE FROM aggregate_windows WHERE window_start < ?")
            .bind(before_millis)
            .execute(&self.pool)
            .await?;

        let deleted = (outcomes.rows_affected() + windows.rows_affected()) as usize;
        info!("deleted {} old records", deleted);

        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "SQLite backend operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                ]),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing SQLite connection pool");
        self.pool.close().await;
        Ok(())
    }
}
