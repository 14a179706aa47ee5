//! Pipeline runner - drives one target pipeline through its steps

use crate::{
    core::{FailurePolicy, OverallStatus, Pipeline, PipelineStatus, StepStatus},
    execution::executor::StepExecutor,
    runner::{CancellationToken, LogSink, ProcessRunner},
};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    SessionStarted {
        session_id: Uuid,
        pipelines: usize,
    },
    PipelineStarted {
        target_id: String,
        steps: usize,
    },
    StepStarted {
        target_id: String,
        step_name: String,
        attempt: u32,
    },
    StepRetrying {
        target_id: String,
        step_name: String,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },
    StepFinished {
        target_id: String,
        step_name: String,
        status: StepStatus,
        duration: Duration,
    },
    PipelineFinished {
        target_id: String,
        status: PipelineStatus,
        degraded: bool,
    },
    SessionFinished {
        session_id: Uuid,
        status: OverallStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Fan-out of session events to registered handlers
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event handler
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.push(Arc::new(handler));
        }
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: SessionEvent) {
        // Clone the list so a handler may subscribe without deadlocking
        let handlers: Vec<EventHandler> = match self.handlers.read() {
            Ok(handlers) => handlers.clone(),
            Err(_) => return,
        };
        for handler in handlers {
            handler(event.clone());
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.handlers.read().map(|h| h.len()).unwrap_or(0);
        f.debug_struct("EventBus").field("handlers", &count).finish()
    }
}

/// Runs the steps of a single pipeline in declaration order
pub struct PipelineRunner<R> {
    executor: StepExecutor<R>,
    events: EventBus,
}

impl<R> Clone for PipelineRunner<R> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            events: self.events.clone(),
        }
    }
}

impl<R: ProcessRunner> PipelineRunner<R> {
    pub fn new(runner: Arc<R>, events: EventBus) -> Self {
        Self {
            executor: StepExecutor::new(runner).with_events(events.clone()),
            events,
        }
    }

    /// Execute the pipeline to a terminal state
    ///
    /// Step failures are absorbed into results; the policy decides whether
    /// later steps still run. Cancellation records the in-flight step as
    /// cancelled and every later step as skipped.
    pub async fn run(&self, pipeline: &mut Pipeline, sink: &dyn LogSink, cancel: &CancellationToken) {
        if let Err(e) = pipeline.start() {
            error!("Pipeline {} cannot start: {}", pipeline.target_id, e);
            return;
        }

        info!(
            "Starting pipeline: {} ({} steps, {}{})",
            pipeline.target_id,
            pipeline.steps.len(),
            pipeline.policy.as_str(),
            if pipeline.dry_run { ", dry-run" } else { "" }
        );
        self.events.emit(SessionEvent::PipelineStarted {
            target_id: pipeline.target_id.clone(),
            steps: pipeline.steps.len(),
        });

        let mut cancelled = false;
        for index in 0..pipeline.steps.len() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let step = pipeline.steps[index].clone();
            let outcome = self
                .executor
                .execute(&step, &pipeline.context, pipeline.dry_run, sink, cancel)
                .await;
            let status = outcome.result.status;

            if !outcome.outputs.is_empty() {
                let target = pipeline.target_id.clone();
                pipeline.context.publish_outputs(&target, &outcome.outputs);
                pipeline.merge_outputs(outcome.outputs);
            }
            pipeline.record(outcome.result);

            match status {
                StepStatus::Cancelled => {
                    cancelled = true;
                    break;
                }
                StepStatus::Failed if pipeline.policy == FailurePolicy::FailFast => {
                    warn!(
                        "Step {}/{} failed, skipping remaining steps",
                        pipeline.target_id, step.name
                    );
                    pipeline.skip_remaining(&format!("previous step '{}' failed", step.name));
                    break;
                }
                _ => {}
            }
        }

        if cancelled {
            let reason = cancel.reason().unwrap_or_else(|| "cancelled".to_string());
            pipeline.skip_remaining(&format!("session cancelled: {}", reason));
        }

        if let Err(e) = pipeline.finish(cancelled) {
            error!("Pipeline {} cannot finish: {}", pipeline.target_id, e);
        }
        sink.flush();

        info!(
            "Pipeline finished: {} - {:?}{} ({} passed, {} failed, {} skipped)",
            pipeline.target_id,
            pipeline.status(),
            if pipeline.state.degraded { " (degraded)" } else { "" },
            pipeline.counts().passed,
            pipeline.counts().failed,
            pipeline.counts().skipped
        );
        self.emit_finished(pipeline);
    }

    /// Emit the finished event for a pipeline that was settled without running
    pub fn emit_finished(&self, pipeline: &Pipeline) {
        self.events.emit(SessionEvent::PipelineFinished {
            target_id: pipeline.target_id.clone(),
            status: pipeline.status(),
            degraded: pipeline.state.degraded,
        });
    }
}
