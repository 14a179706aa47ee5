//! Persistence layer for session history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteHistoryStore;

use crate::core::{OverallStatus, StepCounts};
use crate::execution::{SessionKind, SessionOutcome};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Summary of one orchestration session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Unique session ID
    pub session_id: Uuid,

    pub kind: SessionKind,

    pub project: String,

    pub environment: Option<String>,

    pub status: OverallStatus,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    pub dry_run: bool,

    /// Number of target pipelines, including the DR pipeline
    pub pipelines: usize,

    /// Step counts across all pipelines
    pub counts: StepCounts,

    /// JSON report written for this session
    pub report_path: Option<String>,
}

/// Trait for history backends
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// Save a session summary
    async fn save_session(&self, summary: &SessionSummary) -> Result<()>;

    /// Load a session by ID
    async fn load_session(&self, session_id: Uuid) -> Result<Option<SessionSummary>>;

    /// Most recent sessions for a project, newest first
    async fn list_sessions(&self, project: &str, limit: usize) -> Result<Vec<SessionSummary>>;

    /// All project names with recorded sessions
    async fn list_projects(&self) -> Result<Vec<String>>;
}

/// In-memory history (for testing or ephemeral use)
pub struct InMemoryHistory {
    sessions: tokio::sync::RwLock<Vec<SessionSummary>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self {
            sessions: tokio::sync::RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HistoryStore for InMemoryHistory {
    async fn save_session(&self, summary: &SessionSummary) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.retain(|s| s.session_id != summary.session_id);
        sessions.push(summary.clone());
        Ok(())
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Option<SessionSummary>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.iter().find(|s| s.session_id == session_id).cloned())
    }

    async fn list_sessions(&self, project: &str, limit: usize) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.read().await;
        let mut matching: Vec<SessionSummary> = sessions
            .iter()
            .filter(|s| s.project == project)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn list_projects(&self) -> Result<Vec<String>> {
        let sessions = self.sessions.read().await;
        let mut projects: Vec<String> = sessions.iter().map(|s| s.project.clone()).collect();
        projects.sort();
        projects.dedup();
        Ok(projects)
    }
}

/// Create a summary from a finished session
pub fn create_summary(outcome: &SessionOutcome, report_path: Option<&Path>) -> SessionSummary {
    SessionSummary {
        session_id: outcome.session_id,
        kind: outcome.kind,
        project: outcome.project.clone(),
        environment: outcome.environment.clone(),
        status: outcome.status,
        started_at: outcome.started_at,
        finished_at: outcome.finished_at,
        dry_run: outcome.dry_run,
        pipelines: outcome.pipelines.len(),
        counts: outcome.totals(),
        report_path: report_path.map(|p| p.display().to_string()),
    }
}
