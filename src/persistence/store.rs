//! SQLite-based history store

use crate::core::{OverallStatus, StepCounts};
use crate::execution::SessionKind;
use crate::persistence::{HistoryStore, SessionSummary};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const COLUMNS: &str = "id, kind, project, environment, status, started_at, finished_at, dry_run, \
     pipelines, passed, failed, skipped, cancelled, report_path";

/// SQLite session history
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Open (or create) a store at the given path
    pub async fn new(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("Failed to open history database {}", db_path.display()))?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let db_path = Self::default_path();
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Self::new(&db_path).await
    }

    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dr-orchestrator")
            .join("history.db")
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                project TEXT NOT NULL,
                environment TEXT,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                dry_run INTEGER NOT NULL DEFAULT 0,
                pipelines INTEGER NOT NULL DEFAULT 0,
                passed INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                skipped INTEGER NOT NULL DEFAULT 0,
                cancelled INTEGER NOT NULL DEFAULT 0,
                report_path TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_project ON sessions(project);
            CREATE INDEX IF NOT EXISTS idx_started_at ON sessions(started_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize history schema")?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn summary_from_row(row: &SqliteRow) -> Result<SessionSummary> {
        Ok(SessionSummary {
            session_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            kind: parse_label::<SessionKind>(&row.get::<String, _>("kind"))?,
            project: row.get("project"),
            environment: row.get("environment"),
            status: parse_label::<OverallStatus>(&row.get::<String, _>("status"))?,
            started_at: Self::from_naive(row.get("started_at")),
            finished_at: Self::from_naive(row.get("finished_at")),
            dry_run: row.get("dry_run"),
            pipelines: row.get::<i64, _>("pipelines") as usize,
            counts: StepCounts {
                passed: row.get::<i64, _>("passed") as usize,
                failed: row.get::<i64, _>("failed") as usize,
                skipped: row.get::<i64, _>("skipped") as usize,
                cancelled: row.get::<i64, _>("cancelled") as usize,
            },
            report_path: row.get("report_path"),
        })
    }
}

/// Parse a stored serde label back into its enum
fn parse_label<T: DeserializeOwned>(label: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(label.to_string()))
        .with_context(|| format!("Unknown stored value '{}'", label))
}

fn label<T: serde::Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => anyhow::bail!("Expected a string label, got {}", other),
    }
}

#[async_trait::async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn save_session(&self, summary: &SessionSummary) -> Result<()> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO sessions ({}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            COLUMNS
        ))
        .bind(summary.session_id.to_string())
        .bind(label(&summary.kind)?)
        .bind(&summary.project)
        .bind(&summary.environment)
        .bind(label(&summary.status)?)
        .bind(Self::to_naive(summary.started_at))
        .bind(Self::to_naive(summary.finished_at))
        .bind(summary.dry_run)
        .bind(summary.pipelines as i64)
        .bind(summary.counts.passed as i64)
        .bind(summary.counts.failed as i64)
        .bind(summary.counts.skipped as i64)
        .bind(summary.counts.cancelled as i64)
        .bind(&summary.report_path)
        .execute(&self.pool)
        .await
        .context("Failed to save session")?;

        Ok(())
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Option<SessionSummary>> {
        let row = sqlx::query(&format!("SELECT {} FROM sessions WHERE id = ?1", COLUMNS))
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load session")?;

        row.as_ref().map(Self::summary_from_row).transpose()
    }

    async fn list_sessions(&self, project: &str, limit: usize) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM sessions WHERE project = ?1 ORDER BY started_at DESC LIMIT ?2",
            COLUMNS
        ))
        .bind(project)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list sessions")?;

        rows.iter().map(Self::summary_from_row).collect()
    }

    async fn list_projects(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT project FROM sessions ORDER BY project ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list projects")?;

        Ok(rows.iter().map(|row| row.get("project")).collect())
    }
}
