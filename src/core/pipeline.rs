//! Pipeline domain model

use crate::core::{
    context::ExecutionContext,
    state::{InvalidTransition, PipelineState, PipelineStatus, StepCounts, StepResult, StepStatus},
    step::Step,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// What a pipeline does after a failed step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failure; remaining steps are recorded as skipped
    #[default]
    FailFast,
    /// Attempt every step; failures mark the pipeline degraded
    ContinueOnError,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::FailFast => "fail_fast",
            FailurePolicy::ContinueOnError => "continue_on_error",
        }
    }
}

/// Ordered steps scoped to one deployment target
///
/// A pipeline is built once, executed once, then read-only. Its result list
/// is append-only and can only grow through the executing crate.
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Deployment target this pipeline belongs to
    pub target_id: String,

    /// Cloud provider name (informational)
    pub provider: Option<String>,

    /// Steps in declaration order
    pub steps: Vec<Step>,

    pub policy: FailurePolicy,

    /// Substitute read-only equivalents for mutating steps
    pub dry_run: bool,

    /// Targets whose pipelines must complete before this one starts
    pub depends_on: Vec<String>,

    /// Explicit environment and variables for every subprocess
    pub context: ExecutionContext,

    /// Lifecycle state
    pub state: PipelineState,

    results: Vec<StepResult>,

    /// Values captured from machine-readable tool output
    outputs: BTreeMap<String, Value>,
}

impl Pipeline {
    pub fn new(target_id: impl Into<String>, steps: Vec<Step>) -> Self {
        let target_id = target_id.into();
        Self {
            context: ExecutionContext::new(target_id.clone()),
            target_id,
            provider: None,
            steps,
            policy: FailurePolicy::FailFast,
            dry_run: false,
            depends_on: Vec::new(),
            state: PipelineState::new(),
            results: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }

    pub fn depends_on(mut self, target: impl Into<String>) -> Self {
        self.depends_on.push(target.into());
        self
    }

    /// Recorded results, in step order
    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// Look up a result by step name
    pub fn result(&self, step_name: &str) -> Option<&StepResult> {
        self.results.iter().find(|r| r.step_name == step_name)
    }

    pub fn statuses(&self) -> Vec<StepStatus> {
        self.results.iter().map(|r| r.status).collect()
    }

    pub fn outputs(&self) -> &BTreeMap<String, Value> {
        &self.outputs
    }

    pub fn counts(&self) -> StepCounts {
        StepCounts::from_results(&self.results)
    }

    pub fn status(&self) -> PipelineStatus {
        self.state.status
    }

    pub fn duration(&self) -> Duration {
        self.state.duration
    }

    pub fn is_completed(&self) -> bool {
        self.state.status == PipelineStatus::Completed
    }

    pub fn has_failures(&self) -> bool {
        self.results
            .iter()
            .any(|r| matches!(r.status, StepStatus::Failed | StepStatus::Cancelled))
    }

    /// Append a result; a pipeline never records more results than it has steps
    pub(crate) fn record(&mut self, result: StepResult) {
        debug_assert!(self.results.len() < self.steps.len());
        if self.results.len() < self.steps.len() {
            self.results.push(result);
        }
    }

    pub(crate) fn merge_outputs(&mut self, outputs: BTreeMap<String, Value>) {
        self.outputs.extend(outputs);
    }

    /// Record every step not yet attempted as skipped
    pub(crate) fn skip_remaining(&mut self, reason: &str) {
        let start = self.results.len();
        let names: Vec<String> = self.steps[start..].iter().map(|s| s.name.clone()).collect();
        for name in names {
            self.results.push(StepResult::skipped(name, reason));
        }
    }

    pub(crate) fn start(&mut self) -> Result<(), InvalidTransition> {
        self.state.start()
    }

    /// Move to the terminal state matching the recorded results
    pub(crate) fn finish(&mut self, cancelled: bool) -> Result<(), InvalidTransition> {
        if cancelled {
            return self.state.cancel();
        }
        let any_failed = self.results.iter().any(StepResult::is_failed);
        match self.policy {
            FailurePolicy::FailFast if any_failed => self.state.abort(),
            _ => self.state.complete(any_failed),
        }
    }

    /// Record a pipeline that never runs because an upstream target did not complete
    pub(crate) fn mark_blocked(&mut self, reason: &str) -> Result<(), InvalidTransition> {
        self.state.start()?;
        self.skip_remaining(reason);
        self.state.abort()
    }

    /// Settle a pipeline whose execution task died: the next step fails, the rest are skipped
    pub(crate) fn mark_crashed(&mut self, message: &str) -> Result<(), InvalidTransition> {
        if self.state.status == PipelineStatus::Pending {
            self.state.start()?;
        }
        if let Some(step) = self.steps.get(self.results.len()) {
            let failed = StepResult {
                status: StepStatus::Failed,
                ..StepResult::skipped(step.name.clone(), message)
            };
            self.results.push(failed);
        }
        self.skip_remaining("pipeline execution crashed");
        self.state.abort()
    }
}
