//! Orchestration session - runs every target pipeline, then the DR test

use crate::{
    core::{
        config::{PipelineOptions, ProjectConfig},
        ExecutionContext, OverallStatus, Pipeline, PipelineStatus, ReplicationConfig, StepCounts,
        StepStatus, DR_TARGET_ID,
    },
    cost::{compare, CostComparison, CostModel, PricingTable},
    error::{OrchestratorError, Result},
    execution::{
        dr::{DrTestPlan, RtoAssessment},
        engine::{EventBus, PipelineRunner, SessionEvent},
        scheduler::{plan_stages, SchedulingStrategy},
    },
    runner::{CancellationToken, LogSink, NoopLogSink, ProcessRunner},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Builds the log sink for one pipeline, keyed by target id
pub type SinkFactory = Arc<dyn Fn(&str) -> Arc<dyn LogSink> + Send + Sync>;

/// What a session was started for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionKind {
    Deploy,
    DrTest,
    Destroy,
    CostCompare,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Deploy => "deploy",
            SessionKind::DrTest => "dr-test",
            SessionKind::Destroy => "destroy",
            SessionKind::CostCompare => "cost-compare",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall status from the final pipeline states
///
/// `success` needs every pipeline completed with no failed or cancelled
/// step; otherwise `partial` when at least one pipeline completed, else
/// `failed`. No pipelines at all is a success.
pub fn overall_status(pipelines: &[Pipeline]) -> OverallStatus {
    let clean = pipelines.iter().all(|p| {
        p.status() == PipelineStatus::Completed
            && !p
                .results()
                .iter()
                .any(|r| matches!(r.status, StepStatus::Failed | StepStatus::Cancelled))
    });
    if clean {
        OverallStatus::Success
    } else if pipelines.iter().any(Pipeline::is_completed) {
        OverallStatus::Partial
    } else {
        OverallStatus::Failed
    }
}

/// Compare two providers using the project's cost settings
pub fn cost_comparison_from_config(
    config: &ProjectConfig,
    provider_a: &str,
    provider_b: &str,
    hours: Option<f64>,
    pricing_override: Option<&Path>,
) -> Result<CostComparison> {
    let cost = config
        .cost
        .as_ref()
        .ok_or_else(|| OrchestratorError::config("no cost section in project configuration"))?;

    let pricing_path = match pricing_override {
        Some(path) => path.to_path_buf(),
        None => config.resolve_path(&cost.pricing),
    };
    let model = CostModel::new(PricingTable::from_file(&pricing_path)?);
    let hours = hours.unwrap_or(cost.duration_hours);

    let shape = |provider: &str| {
        cost.shapes.get(provider).ok_or_else(|| {
            OrchestratorError::config(format!("no resource shape for provider '{}'", provider))
        })
    };

    let a = model.estimate(provider_a, shape(provider_a)?, hours)?;
    let b = model.estimate(provider_b, shape(provider_b)?, hours)?;
    Ok(compare(&a, &b))
}

/// Collects pipelines and settings; building is the only fallible part of a session
pub struct SessionBuilder<R> {
    runner: Arc<R>,
    kind: SessionKind,
    project: String,
    environment: Option<String>,
    pipelines: Vec<Pipeline>,
    replication: Option<ReplicationConfig>,
    dr_plan: Option<DrTestPlan>,
    cost: Option<CostComparison>,
    strategy: SchedulingStrategy,
    reverse_stages: bool,
    max_duration: Option<Duration>,
    dry_run: bool,
    test_mode: bool,
    cancel: CancellationToken,
    events: EventBus,
    sinks: Option<SinkFactory>,
}

impl<R: ProcessRunner + 'static> SessionBuilder<R> {
    pub fn new(runner: Arc<R>, kind: SessionKind, project: impl Into<String>) -> Self {
        Self {
            runner,
            kind,
            project: project.into(),
            environment: None,
            pipelines: Vec::new(),
            replication: None,
            dr_plan: None,
            cost: None,
            strategy: SchedulingStrategy::default(),
            reverse_stages: false,
            max_duration: None,
            dry_run: false,
            test_mode: false,
            cancel: CancellationToken::new(),
            events: EventBus::new(),
            sinks: None,
        }
    }

    /// Session for a project file
    ///
    /// `destroy` builds teardown pipelines run in reverse dependency order,
    /// `dr-test` requires a `dr_test` section, and `cost-compare` has no
    /// pipelines at all. Configured cost comparisons are computed up front.
    pub fn from_config(
        config: &ProjectConfig,
        kind: SessionKind,
        options: &PipelineOptions,
        runner: Arc<R>,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut builder = Self::new(runner, kind, config.project_name(options))
            .strategy(SchedulingStrategy::from_config(
                config.session.strategy,
                config.session.max_parallel,
            ))
            .max_duration(Duration::from_secs(config.session.max_duration_secs))
            .dry_run(options.dry_run)
            .test_mode(options.test_mode);
        builder.environment = options.environment.clone();
        builder.replication = config.replication.clone();

        let mut options = options.clone();
        options.teardown = kind == SessionKind::Destroy;
        builder.reverse_stages = options.teardown;

        if kind != SessionKind::CostCompare {
            builder.pipelines = config.build_pipelines(&options, lookup)?;
        } else {
            // Still rejects an unknown environment
            config.resolve_variables(options.environment.as_deref())?;
        }

        if kind == SessionKind::DrTest {
            let dr = config
                .dr_test
                .as_ref()
                .ok_or_else(|| OrchestratorError::config("dr-test needs a dr_test section"))?;
            let replication = config
                .replication
                .as_ref()
                .ok_or_else(|| OrchestratorError::config("dr-test needs a replication section"))?;
            builder.dr_plan = Some(DrTestPlan::from_config(dr, replication)?);
        }

        if kind != SessionKind::CostCompare {
            if let Some(cost) = &config.cost {
                if let [a, b] = cost.compare.as_slice() {
                    builder.cost = Some(cost_comparison_from_config(config, a, b, None, None)?);
                }
            }
        }

        Ok(builder)
    }

    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn replication(mut self, replication: ReplicationConfig) -> Self {
        self.replication = Some(replication);
        self
    }

    pub fn dr_plan(mut self, plan: DrTestPlan) -> Self {
        self.replication = Some(plan.replication.clone());
        self.dr_plan = Some(plan);
        self
    }

    pub fn cost(mut self, comparison: CostComparison) -> Self {
        self.cost = Some(comparison);
        self
    }

    pub fn strategy(mut self, strategy: SchedulingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn reverse_stages(mut self, reverse: bool) -> Self {
        self.reverse_stages = reverse;
        self
    }

    /// Wall-clock ceiling; exceeding it cancels the session
    pub fn max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }

    /// Force dry-run on every pipeline
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    /// Use an externally owned cancellation token (Ctrl-C handler)
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn on_event<F>(self, handler: F) -> Self
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler);
        self
    }

    pub fn sink_factory(mut self, factory: SinkFactory) -> Self {
        self.sinks = Some(factory);
        self
    }

    /// Validate and produce a runnable session
    pub fn build(mut self) -> Result<OrchestrationSession<R>> {
        let present: Vec<String> = self.pipelines.iter().map(|p| p.target_id.clone()).collect();
        if self.reverse_stages {
            // Teardown sessions leave out targets without teardown steps
            for pipeline in &mut self.pipelines {
                pipeline.depends_on.retain(|dep| present.contains(dep));
            }
        }
        let targets: Vec<(String, Vec<String>)> = self
            .pipelines
            .iter()
            .map(|p| (p.target_id.clone(), p.depends_on.clone()))
            .collect();
        if targets.iter().any(|(id, _)| id == DR_TARGET_ID) {
            return Err(OrchestratorError::config(format!(
                "target id '{}' is reserved",
                DR_TARGET_ID
            )));
        }
        let stages = plan_stages(&targets, self.reverse_stages)?;

        // Pipelines that must complete first: dependencies, or dependents when reversed
        let upstream: HashMap<String, Vec<String>> = targets
            .iter()
            .map(|(id, deps)| {
                let before = if self.reverse_stages {
                    targets
                        .iter()
                        .filter(|(_, d)| d.contains(id))
                        .map(|(other, _)| other.clone())
                        .collect()
                } else {
                    deps.clone()
                };
                (id.clone(), before)
            })
            .collect();

        if let Some(plan) = &self.dr_plan {
            for id in [&plan.replication.primary, &plan.replication.secondary] {
                if !targets.iter().any(|(t, _)| t == id) {
                    return Err(OrchestratorError::config(format!(
                        "DR test references target '{}' which has no pipeline",
                        id
                    )));
                }
            }
        }

        if self.dry_run {
            for pipeline in &mut self.pipelines {
                pipeline.dry_run = true;
            }
        }

        Ok(OrchestrationSession {
            id: Uuid::new_v4(),
            kind: self.kind,
            project: self.project,
            environment: self.environment,
            pipelines: self.pipelines,
            stages,
            upstream,
            replication: self.replication,
            dr_plan: self.dr_plan,
            cost: self.cost,
            strategy: self.strategy,
            max_duration: self.max_duration,
            dry_run: self.dry_run,
            test_mode: self.test_mode,
            cancel: self.cancel,
            runner: PipelineRunner::new(self.runner, self.events.clone()),
            events: self.events,
            sinks: self.sinks,
        })
    }
}

/// A validated, runnable session owning all of its pipelines
pub struct OrchestrationSession<R> {
    id: Uuid,
    kind: SessionKind,
    project: String,
    environment: Option<String>,
    pipelines: Vec<Pipeline>,
    stages: Vec<Vec<String>>,
    upstream: HashMap<String, Vec<String>>,
    replication: Option<ReplicationConfig>,
    dr_plan: Option<DrTestPlan>,
    cost: Option<CostComparison>,
    strategy: SchedulingStrategy,
    max_duration: Option<Duration>,
    dry_run: bool,
    test_mode: bool,
    cancel: CancellationToken,
    runner: PipelineRunner<R>,
    events: EventBus,
    sinks: Option<SinkFactory>,
}

impl<R: ProcessRunner + 'static> OrchestrationSession<R> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Pipeline ids grouped into the stages they will run in
    pub fn stages(&self) -> &[Vec<String>] {
        &self.stages
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn sink_for(&self, target_id: &str) -> Arc<dyn LogSink> {
        match &self.sinks {
            Some(factory) => factory(target_id),
            None => Arc::new(NoopLogSink),
        }
    }

    /// Run every stage, then the DR test, and return the merged outcome
    pub async fn run(mut self) -> SessionOutcome {
        let started_at = Utc::now();
        let start = Instant::now();
        let order: Vec<String> = self.pipelines.iter().map(|p| p.target_id.clone()).collect();

        info!(
            "Starting {} session {} for project {} ({} pipelines, {} stages)",
            self.kind,
            self.id,
            self.project,
            self.pipelines.len(),
            self.stages.len()
        );
        self.events.emit(SessionEvent::SessionStarted {
            session_id: self.id,
            pipelines: self.pipelines.len(),
        });

        let ceiling = self.max_duration.map(|limit| {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        warn!("Session exceeded its {}s ceiling, cancelling", limit.as_secs());
                        cancel.cancel(format!("exceeded session ceiling of {}s", limit.as_secs()));
                    }
                    _ = cancel.cancelled() => {}
                }
            })
        });

        let mut pending: HashMap<String, Pipeline> = std::mem::take(&mut self.pipelines)
            .into_iter()
            .map(|p| (p.target_id.clone(), p))
            .collect();
        let mut done: HashMap<String, Pipeline> = HashMap::new();

        for (index, stage) in self.stages.clone().into_iter().enumerate() {
            info!("Stage {}: {}", index + 1, stage.join(", "));
            let mut runnable = Vec::new();
            for id in stage {
                let Some(mut pipeline) = pending.remove(&id) else {
                    continue;
                };

                let blocked = self
                    .upstream
                    .get(&id)
                    .and_then(|before| {
                        before
                            .iter()
                            .find(|dep| !done.get(dep.as_str()).is_some_and(Pipeline::is_completed))
                    })
                    .cloned();
                if let Some(dep) = blocked {
                    warn!("Skipping pipeline {}: upstream target '{}' did not complete", id, dep);
                    if let Err(e) = pipeline.mark_blocked(&format!("upstream target '{}' did not complete", dep)) {
                        error!("Pipeline {}: {}", id, e);
                    }
                    self.runner.emit_finished(&pipeline);
                    done.insert(id, pipeline);
                    continue;
                }

                for upstream in done.values() {
                    pipeline
                        .context
                        .publish_outputs(&upstream.target_id, upstream.outputs());
                }
                runnable.push(pipeline);
            }

            for pipeline in self.run_stage(runnable).await {
                done.insert(pipeline.target_id.clone(), pipeline);
            }
        }

        let mut pipelines: Vec<Pipeline> = order.iter().filter_map(|id| done.remove(id)).collect();

        let mut rto = None;
        if let Some(plan) = self.dr_plan.take() {
            let (pipeline, assessment) = self.run_dr(&plan, &pipelines).await;
            rto = Some(assessment);
            pipelines.push(pipeline);
        }

        if let Some(handle) = ceiling {
            handle.abort();
        }

        let status = overall_status(&pipelines);
        let cancelled = self.cancel.reason();
        let outcome = SessionOutcome {
            session_id: self.id,
            kind: self.kind,
            project: self.project,
            environment: self.environment,
            started_at,
            finished_at: Utc::now(),
            duration: start.elapsed(),
            dry_run: self.dry_run,
            test_mode: self.test_mode,
            pipelines,
            replication: self.replication,
            rto,
            cost: self.cost,
            cancelled,
            status,
            error: None,
        };

        if let Some(err) = outcome.cancellation() {
            warn!("{}", err);
        }
        info!(
            "Session {} finished: {} in {:?}",
            outcome.session_id,
            outcome.status.as_str(),
            outcome.duration
        );
        self.events.emit(SessionEvent::SessionFinished {
            session_id: outcome.session_id,
            status: outcome.status,
        });
        outcome
    }

    /// Run one stage; results return only once every pipeline of the stage is done
    async fn run_stage(&self, runnable: Vec<Pipeline>) -> Vec<Pipeline> {
        let mut finished = Vec::with_capacity(runnable.len());

        if self.strategy == SchedulingStrategy::Sequential || runnable.len() <= 1 {
            for mut pipeline in runnable {
                let sink = self.sink_for(&pipeline.target_id);
                self.runner.run(&mut pipeline, sink.as_ref(), &self.cancel).await;
                finished.push(pipeline);
            }
            return finished;
        }

        let permits = Arc::new(Semaphore::new(self.strategy.concurrency(runnable.len())));
        let mut handles = Vec::with_capacity(runnable.len());
        for mut pipeline in runnable {
            let fallback = pipeline.clone();
            let runner = self.runner.clone();
            let sink = self.sink_for(&pipeline.target_id);
            let cancel = self.cancel.clone();
            let permits = permits.clone();

            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                runner.run(&mut pipeline, sink.as_ref(), &cancel).await;
                pipeline
            });
            handles.push((fallback, handle));
        }

        for (mut fallback, handle) in handles {
            match handle.await {
                Ok(pipeline) => finished.push(pipeline),
                Err(e) => {
                    error!("Pipeline task for {} failed: {}", fallback.target_id, e);
                    if let Err(e) = fallback.mark_crashed(&format!("pipeline task failed: {}", e)) {
                        error!("Pipeline {}: {}", fallback.target_id, e);
                    }
                    self.runner.emit_finished(&fallback);
                    finished.push(fallback);
                }
            }
        }
        finished
    }

    async fn run_dr(&self, plan: &DrTestPlan, pipelines: &[Pipeline]) -> (Pipeline, RtoAssessment) {
        let find = |id: &str| pipelines.iter().find(|p| p.target_id == id);
        let primary = find(&plan.replication.primary);
        let secondary = find(&plan.replication.secondary);

        let mut context = ExecutionContext::new(DR_TARGET_ID);
        for source in [primary, secondary].into_iter().flatten() {
            for (k, v) in &source.context.env {
                context.set_env(k.clone(), v.clone());
            }
            for (k, v) in &source.context.secrets {
                context.set_secret(k.clone(), v.clone());
            }
            for (k, v) in &source.context.variables {
                if !matches!(k.as_str(), "target" | "region" | "provider") {
                    context.set_variable(k.clone(), v.clone());
                }
            }
        }
        for upstream in pipelines {
            context.publish_outputs(&upstream.target_id, upstream.outputs());
        }

        let mut pipeline = plan.pipeline(context, self.dry_run);
        let ready = primary.is_some_and(Pipeline::is_completed) && secondary.is_some_and(Pipeline::is_completed);

        if ready {
            let sink = self.sink_for(DR_TARGET_ID);
            self.runner.run(&mut pipeline, sink.as_ref(), &self.cancel).await;
        } else {
            warn!("Skipping DR test: primary or secondary target did not complete");
            if let Err(e) = pipeline.mark_blocked("primary or secondary target did not complete") {
                error!("Pipeline {}: {}", DR_TARGET_ID, e);
            }
            self.runner.emit_finished(&pipeline);
        }

        let assessment = plan.assess(&pipeline);
        info!(
            "RTO {:?}: measured {:?}s against objective {}s ({:?})",
            assessment.achievement, assessment.measured_seconds, assessment.objective_seconds, assessment.mode
        );
        (pipeline, assessment)
    }
}

/// Merged result of a finished session
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub kind: SessionKind,
    pub project: String,
    pub environment: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Wall-clock time around the whole run
    pub duration: Duration,

    pub dry_run: bool,
    pub test_mode: bool,

    /// Target pipelines in declaration order, then the DR pipeline
    pub pipelines: Vec<Pipeline>,

    pub replication: Option<ReplicationConfig>,
    pub rto: Option<RtoAssessment>,
    pub cost: Option<CostComparison>,

    /// Cancellation reason, if the session was cancelled
    pub cancelled: Option<String>,

    pub status: OverallStatus,

    /// Fatal error that stopped the session before execution
    pub error: Option<String>,
}

impl SessionOutcome {
    /// Outcome for a session that never started because of a fatal error
    pub fn failed_before_start(
        kind: SessionKind,
        project: impl Into<String>,
        environment: Option<String>,
        error: &OrchestratorError,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            kind,
            project: project.into(),
            environment,
            started_at: now,
            finished_at: now,
            duration: Duration::ZERO,
            dry_run: false,
            test_mode: false,
            pipelines: Vec::new(),
            replication: None,
            rto: None,
            cost: None,
            cancelled: None,
            status: OverallStatus::Failed,
            error: Some(error.to_string()),
        }
    }

    pub fn pipeline(&self, target_id: &str) -> Option<&Pipeline> {
        self.pipelines.iter().find(|p| p.target_id == target_id)
    }

    /// Step counts across all pipelines
    pub fn totals(&self) -> StepCounts {
        let mut totals = StepCounts::default();
        for pipeline in &self.pipelines {
            totals.merge(&pipeline.counts());
        }
        totals
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_some()
    }

    pub fn cancellation(&self) -> Option<OrchestratorError> {
        self.cancelled
            .as_ref()
            .map(|reason| OrchestratorError::SessionCancelled {
                reason: reason.clone(),
            })
    }
}
