//! Session reports
//!
//! [`SessionReport`] is the canonical, typed form of a finished session.
//! JSON is its serialization; HTML and CSV are rendered from that same
//! value and never carry anything the JSON does not.

pub mod render;
pub mod writer;

use crate::core::{
    state::duration_millis, FailurePolicy, OverallStatus, Pipeline, PipelineStatus, ReplicationConfig,
    StepCounts, StepResult, StepStatus,
};
use crate::cost::CostComparison;
use crate::execution::{RtoAssessment, SessionKind, SessionOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub use render::{render, ReportError, ReportFormat};
pub use writer::{report_stem, ReportWriter, WrittenReport};

/// Report layout version
pub const SCHEMA_VERSION: u32 = 1;

/// Lines of captured output kept per step
const OUTPUT_TAIL_LINES: usize = 40;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub schema_version: u32,
    pub session_id: Uuid,
    pub kind: SessionKind,
    pub project: String,
    pub environment: Option<String>,

    /// Session start
    pub timestamp: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// When this document was rendered; the only field that changes between renders
    pub generated_at: DateTime<Utc>,

    pub dry_run: bool,
    pub test_mode: bool,
    pub overall_status: OverallStatus,
    pub totals: Totals,
    pub pipelines: Vec<PipelineReport>,
    pub replication_config: Option<ReplicationConfig>,
    pub rto: Option<RtoAssessment>,
    pub cost_comparison: Option<CostComparison>,
    pub cancelled: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub pipelines: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,

    #[serde(rename = "duration_ms", with = "duration_millis")]
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub target_id: String,
    pub provider: Option<String>,
    pub status: PipelineStatus,
    pub degraded: bool,
    pub policy: FailurePolicy,
    pub dry_run: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(rename = "duration_ms", with = "duration_millis")]
    pub duration: Duration,

    pub counts: StepCounts,
    pub steps: Vec<StepReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub name: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,

    #[serde(rename = "duration_ms", with = "duration_millis")]
    pub duration: Duration,

    pub attempts: u32,
    pub command: Option<String>,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub dry_run_substituted: bool,
    pub message: Option<String>,

    /// Last lines of captured output, for diagnostics
    pub output_tail: String,
}

fn tail(output: &str, lines: usize) -> String {
    let all: Vec<&str> = output.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

impl From<&StepResult> for StepReport {
    fn from(result: &StepResult) -> Self {
        Self {
            name: result.step_name.clone(),
            status: result.status,
            started_at: result.started_at,
            duration: result.duration,
            attempts: result.attempts,
            command: result.command.clone(),
            exit_code: result.exit_code,
            timed_out: result.timed_out,
            dry_run_substituted: result.dry_run_substituted,
            message: result.message.clone(),
            output_tail: tail(&result.captured_output, OUTPUT_TAIL_LINES),
        }
    }
}

impl From<&Pipeline> for PipelineReport {
    fn from(pipeline: &Pipeline) -> Self {
        Self {
            target_id: pipeline.target_id.clone(),
            provider: pipeline.provider.clone(),
            status: pipeline.status(),
            degraded: pipeline.state.degraded,
            policy: pipeline.policy,
            dry_run: pipeline.dry_run,
            started_at: pipeline.state.started_at,
            completed_at: pipeline.state.completed_at,
            duration: pipeline.duration(),
            counts: pipeline.counts(),
            steps: pipeline.results().iter().map(StepReport::from).collect(),
        }
    }
}

impl SessionReport {
    /// Build the report for a finished session
    pub fn from_outcome(outcome: &SessionOutcome) -> Self {
        let counts = outcome.totals();
        Self {
            schema_version: SCHEMA_VERSION,
            session_id: outcome.session_id,
            kind: outcome.kind,
            project: outcome.project.clone(),
            environment: outcome.environment.clone(),
            timestamp: outcome.started_at,
            finished_at: outcome.finished_at,
            generated_at: Utc::now(),
            dry_run: outcome.dry_run,
            test_mode: outcome.test_mode,
            overall_status: outcome.status,
            totals: Totals {
                pipelines: outcome.pipelines.len(),
                passed: counts.passed,
                failed: counts.failed,
                skipped: counts.skipped,
                cancelled: counts.cancelled,
                duration: outcome.duration,
            },
            pipelines: outcome.pipelines.iter().map(PipelineReport::from).collect(),
            replication_config: outcome.replication.clone(),
            rto: outcome.rto.clone(),
            cost_comparison: outcome.cost.clone(),
            cancelled: outcome.cancelled.clone(),
            error: outcome.error.clone(),
        }
    }

    pub fn pipeline(&self, target_id: &str) -> Option<&PipelineReport> {
        self.pipelines.iter().find(|p| p.target_id == target_id)
    }
}
