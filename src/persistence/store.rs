//! SQLite-based run history store

use crate::core::state::RunStatus;
use crate::persistence::{PersistenceBackend, RunSummary};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// SQLite run store
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Create a new SQLite store
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(&format!("sqlite:{}", db_path))
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("cascade");
        std::fs::create_dir_all(&db_dir)?;

        let db_path = db_dir.join("runs.db");
        let db_path = db_path
            .to_str()
            .context("default database path is not valid UTF-8")?;
        Self::new(db_path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                pipeline_name TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                total_jobs INTEGER NOT NULL DEFAULT 0,
                succeeded_jobs INTEGER NOT NULL DEFAULT 0,
                failed_jobs INTEGER NOT NULL DEFAULT 0,
                skipped_jobs INTEGER NOT NULL DEFAULT 0,
                cancelled_jobs INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_runs_pipeline_name ON runs(pipeline_name);
            CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);
            CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn summary_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<RunSummary> {
        Ok(RunSummary {
            run_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            pipeline_name: row.get("pipeline_name"),
            status: RunStatus::parse(&row.get::<String, _>("status"))
                .unwrap_or(RunStatus::Pending),
            started_at: Self::from_naive(row.get("started_at")),
            finished_at: row
                .get::<Option<NaiveDateTime>, _>("finished_at")
                .map(Self::from_naive),
            total_jobs: row.get::<i64, _>("total_jobs") as usize,
            succeeded_jobs: row.get::<i64, _>("succeeded_jobs") as usize,
            failed_jobs: row.get::<i64, _>("failed_jobs") as usize,
            skipped_jobs: row.get::<i64, _>("skipped_jobs") as usize,
            cancelled_jobs: row.get::<i64, _>("cancelled_jobs") as usize,
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteRunStore {
    async fn save_run(&self, summary: &RunSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, pipeline_name, status, started_at, finished_at,
             total_jobs, succeeded_jobs, failed_jobs, skipped_jobs, cancelled_jobs)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(summary.run_id.to_string())
        .bind(&summary.pipeline_name)
        .bind(summary.status.as_str())
        .bind(Self::to_naive(summary.started_at))
        .bind(summary.finished_at.map(Self::to_naive))
        .bind(summary.total_jobs as i64)
        .bind(summary.succeeded_jobs as i64)
        .bind(summary.failed_jobs as i64)
        .bind(summary.skipped_jobs as i64)
        .bind(summary.cancelled_jobs as i64)
        .execute(&self.pool)
        .await
        .context("Failed to save run")?;

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let row = sqlx::query(
            r#"
            SELECT id, pipeline_name, status, started_at, finished_at,
                   total_jobs, succeeded_jobs, failed_jobs, skipped_jobs, cancelled_jobs
            FROM runs
            WHERE id = ?1
            "#,
        )
        .bind(run_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load run")?;

        match row {
            Some(row) => Ok(Some(Self::summary_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, pipeline_name, status, started_at, finished_at,
                   total_jobs, succeeded_jobs, failed_jobs, skipped_jobs, cancelled_jobs
            FROM runs
            WHERE pipeline_name = ?1
            ORDER BY started_at DESC
            "#,
        )
        .bind(pipeline_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        rows.iter().map(Self::summary_from_row).collect()
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT pipeline_name
            FROM runs
            ORDER BY pipeline_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pipelines")?;

        Ok(rows.iter().map(|row| row.get("pipeline_name")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_store_round_trip() {
        let store = SqliteRunStore::new(":memory:").await.unwrap();

        let summary = RunSummary {
            run_id: Uuid::new_v4(),
            pipeline_name: "release".to_string(),
            status: RunStatus::Failed,
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            total_jobs: 5,
            succeeded_jobs: 2,
            failed_jobs: 1,
            skipped_jobs: 2,
            cancelled_jobs: 0,
        };

        store.save_run(&summary).await.unwrap();

        let loaded = store.load_run(summary.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.pipeline_name, summary.pipeline_name);
        assert_eq!(loaded.status, summary.status);
        assert_eq!(loaded.failed_jobs, 1);
        assert_eq!(loaded.skipped_jobs, 2);

        assert_eq!(store.list_pipelines().await.unwrap(), vec!["release"]);
        assert_eq!(store.list_runs("release").await.unwrap().len(), 1);
    }
}
