//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Outcome of a single step execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
    /// The step was in flight when the session was cancelled
    Cancelled,
}

/// Record of one step execution; created once, never mutated afterwards
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_name: String,
    pub status: StepStatus,
    pub duration: Duration,
    pub captured_output: String,
    pub started_at: DateTime<Utc>,

    /// Command line actually run (None for skipped steps)
    pub command: Option<String>,

    pub exit_code: Option<i32>,
    pub timed_out: bool,

    /// Number of runner calls made
    pub attempts: u32,

    /// The read-only equivalent ran instead of the mutating command
    pub dry_run_substituted: bool,

    /// Failure or skip reason
    pub message: Option<String>,
}

impl StepResult {
    /// A step that never ran
    pub fn skipped(step_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Skipped,
            duration: Duration::ZERO,
            captured_output: String::new(),
            started_at: Utc::now(),
            command: None,
            exit_code: None,
            timed_out: false,
            attempts: 0,
            dry_run_substituted: false,
            message: Some(reason.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }

    /// Instant the step finished
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.started_at
            + chrono::Duration::from_std(self.duration).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

/// Per-status counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl StepCounts {
    pub fn from_results(results: &[StepResult]) -> Self {
        let mut counts = Self::default();
        for result in results {
            counts.add(result.status);
        }
        counts
    }

    pub fn add(&mut self, status: StepStatus) {
        match status {
            StepStatus::Passed => self.passed += 1,
            StepStatus::Failed => self.failed += 1,
            StepStatus::Skipped => self.skipped += 1,
            StepStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn merge(&mut self, other: &StepCounts) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.cancelled += other.cancelled;
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.cancelled
    }
}

/// Pipeline lifecycle: `pending → running → {completed, aborted, cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Pending,
    Running,
    /// Every step was attempted (may be degraded under continue-on-error)
    Completed,
    /// Fail-fast stop after a failed step
    Aborted,
    /// Stopped by session cancellation
    Cancelled,
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Completed | PipelineStatus::Aborted | PipelineStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid pipeline transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: PipelineStatus,
    pub to: PipelineStatus,
}

/// Pipeline execution state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub status: PipelineStatus,

    /// Completed with at least one failed step
    pub degraded: bool,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Wall-clock time between start and finish
    #[serde(with = "duration_millis")]
    pub duration: Duration,

    #[serde(skip)]
    started: Option<std::time::Instant>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            status: PipelineStatus::Pending,
            degraded: false,
            started_at: None,
            completed_at: None,
            duration: Duration::ZERO,
            started: None,
        }
    }

    /// `pending → running`; a pipeline never re-enters running
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        if self.status != PipelineStatus::Pending {
            return Err(InvalidTransition {
                from: self.status,
                to: PipelineStatus::Running,
            });
        }
        self.status = PipelineStatus::Running;
        self.started_at = Some(Utc::now());
        self.started = Some(std::time::Instant::now());
        Ok(())
    }

    pub fn complete(&mut self, degraded: bool) -> Result<(), InvalidTransition> {
        self.finish(PipelineStatus::Completed)?;
        self.degraded = degraded;
        Ok(())
    }

    pub fn abort(&mut self) -> Result<(), InvalidTransition> {
        self.finish(PipelineStatus::Aborted)
    }

    pub fn cancel(&mut self) -> Result<(), InvalidTransition> {
        self.finish(PipelineStatus::Cancelled)
    }

    fn finish(&mut self, to: PipelineStatus) -> Result<(), InvalidTransition> {
        if self.status != PipelineStatus::Running {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.completed_at = Some(Utc::now());
        self.duration = self.started.map(|s| s.elapsed()).unwrap_or_default();
        Ok(())
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate status of a whole session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    Partial,
    Failed,
}

impl OverallStatus {
    /// Process exit code for this status
    pub fn exit_code(&self) -> i32 {
        match self {
            OverallStatus::Success => 0,
            OverallStatus::Failed => 1,
            OverallStatus::Partial => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Success => "success",
            OverallStatus::Partial => "partial",
            OverallStatus::Failed => "failed",
        }
    }
}

/// Serialize a `Duration` as integer milliseconds
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
