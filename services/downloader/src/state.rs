//! Run history persistence using SQLite with sqlx.
//!
//! One row per scheduled run, so the status API can report what the last
//! runs fetched, skipped or failed across restarts.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        started_at TEXT NOT NULL,
        finished_at TEXT NOT NULL,
        cycle TEXT,
        artifact TEXT,
        status TEXT NOT NULL,
        fetched INTEGER DEFAULT 0,
        skipped INTEGER DEFAULT 0,
        failed INTEGER DEFAULT 0,
        bytes INTEGER DEFAULT 0,
        error_message TEXT
    )
"#;

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every offset fetched
    Completed,
    /// Artifact finalized with skipped or failed offsets
    Partial,
    /// No published cycle within the fallback bound
    NoCycle,
    /// Aborted by a probe, retention or filesystem error
    Failed,
}

impl RunStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::NoCycle => "no_cycle",
            Self::Failed => "failed",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "partial" => Self::Partial,
            "no_cycle" => Self::NoCycle,
            _ => Self::Failed,
        }
    }
}

/// One run as stored in the history.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cycle: Option<String>,
    pub artifact: Option<String>,
    pub status: RunStatus,
    pub fetched: u32,
    pub skipped: u32,
    pub failed: u32,
    pub bytes: u64,
    pub error_message: Option<String>,
}

/// Aggregate counts over all recorded runs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub total: u64,
    pub completed: u64,
    pub partial: u64,
    pub no_cycle: u64,
    pub failed: u64,
    pub total_bytes: u64,
}

type RunRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    i64,
    i64,
    i64,
    i64,
    Option<String>,
);

/// Manages run history persistence.
pub struct RunHistory {
    pool: SqlitePool,
}

impl RunHistory {
    /// Open or create the history database at the given path.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to open SQLite database")?;

        Self::init(&pool).await?;

        info!(path = %path.display(), "Opened run history database");

        Ok(Self { pool })
    }

    /// Open an in-memory database (for testing).
    pub async fn open_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::init(&pool).await?;

        Ok(Self { pool })
    }

    async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(SCHEMA).execute(pool).await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_started ON runs(started_at)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Append a finished run.
    pub async fn record(&self, run: &RunRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO runs (started_at, finished_at, cycle, artifact, status,
                              fetched, skipped, failed, bytes, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.started_at.to_rfc3339())
        .bind(run.finished_at.to_rfc3339())
        .bind(&run.cycle)
        .bind(&run.artifact)
        .bind(run.status.as_str())
        .bind(run.fetched as i64)
        .bind(run.skipped as i64)
        .bind(run.failed as i64)
        .bind(run.bytes as i64)
        .bind(&run.error_message)
        .execute(&self.pool)
        .await?;

        debug!(status = run.status.as_str(), cycle = ?run.cycle, "Recorded run");
        Ok(())
    }

    /// Most recent runs, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let rows: Vec<RunRow> = sqlx::query_as(
            r#"
            SELECT started_at, finished_at, cycle, artifact, status,
                   fetched, skipped, failed, bytes, error_message
            FROM runs
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }

    pub async fn last(&self) -> Result<Option<RunRecord>> {
        Ok(self.recent(1).await?.into_iter().next())
    }

    /// Get run statistics.
    pub async fn stats(&self) -> Result<RunStats> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*), COALESCE(SUM(bytes), 0) FROM runs GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = RunStats::default();
        for (status, count, bytes) in rows {
            let count = count as u64;
            stats.total += count;
            stats.total_bytes += bytes as u64;
            match RunStatus::from_str(&status) {
                RunStatus::Completed => stats.completed += count,
                RunStatus::Partial => stats.partial += count,
                RunStatus::NoCycle => stats.no_cycle += count,
                RunStatus::Failed => stats.failed += count,
            }
        }

        Ok(stats)
    }
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_record(row: RunRow) -> RunRecord {
    RunRecord {
        started_at: parse_time(&row.0),
        finished_at: parse_time(&row.1),
        cycle: row.2,
        artifact: row.3,
        status: RunStatus::from_str(&row.4),
        fetched: row.5 as u32,
        skipped: row.6 as u32,
        failed: row.7 as u32,
        bytes: row.8 as u64,
        error_message: row.9,
    }
}
