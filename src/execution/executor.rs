//! Step executor - runs individual steps through a process runner

use crate::{
    core::{CommandSelection, ExecutionContext, Step, StepResult, StepStatus},
    error::OrchestratorError,
    execution::engine::{EventBus, SessionEvent},
    runner::{CancellationToken, Invocation, LogSink, OutputStream, ProcessOutput, ProcessRunner},
};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of executing a step, plus any captured machine-readable outputs
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub result: StepResult,
    pub outputs: BTreeMap<String, Value>,
}

impl StepOutcome {
    fn without_outputs(result: StepResult) -> Self {
        Self {
            result,
            outputs: BTreeMap::new(),
        }
    }
}

/// Executes a single step
pub struct StepExecutor<R> {
    runner: Arc<R>,
    events: EventBus,
}

impl<R> Clone for StepExecutor<R> {
    fn clone(&self) -> Self {
        Self {
            runner: self.runner.clone(),
            events: self.events.clone(),
        }
    }
}

impl<R: ProcessRunner> StepExecutor<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self {
            runner,
            events: EventBus::default(),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Execute a step and return its result
    ///
    /// Never fails: spawn errors, non-zero exits and timeouts all become a
    /// `failed` result. Retries follow the step's retry policy; a cancelled
    /// attempt is never retried.
    pub async fn execute(
        &self,
        step: &Step,
        context: &ExecutionContext,
        dry_run: bool,
        sink: &dyn LogSink,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        let target = context.target.as_str();

        let (command, substituted) = match step.command_for(dry_run) {
            CommandSelection::Run {
                command,
                substituted,
            } => (command, substituted),
            CommandSelection::Skip { reason } => {
                info!("Skipping step {}/{}: {}", target, step.name, reason);
                return StepOutcome::without_outputs(StepResult::skipped(step.name.clone(), reason));
            }
        };

        let rendered = context.render_command(command);
        let mut invocation = Invocation::new(rendered.program, rendered.args, step.timeout)
            .with_label(step.name.clone());
        invocation.working_dir = step.working_dir.clone();
        invocation.env = context.env.clone();
        invocation.secrets = context.secrets.clone();

        let shown = invocation.redactor().apply(&invocation.display());
        if substituted {
            info!("Executing step {}/{} (dry-run): {}", target, step.name, shown);
        } else {
            info!("Executing step {}/{}: {}", target, step.name, shown);
        }

        let started_at = Utc::now();
        let start = Instant::now();
        let max_attempts = step.retry.max_attempts;
        let mut attempt = 0;
        let mut interrupted = false;

        let last = loop {
            attempt += 1;
            self.events.emit(SessionEvent::StepStarted {
                target_id: target.to_string(),
                step_name: step.name.clone(),
                attempt,
            });
            sink.on_line(&step.name, OutputStream::Stdout, &format!("$ {}", shown));

            let run = self.runner.run(&invocation, sink, cancel).await;
            let retryable = match &run {
                Ok(output) => !output.success() && !output.cancelled,
                Err(_) => true,
            };
            if retryable && cancel.is_cancelled() {
                interrupted = true;
                break run;
            }
            if !retryable || attempt >= max_attempts {
                break run;
            }

            let delay = step.retry.delay_after(attempt);
            let reason = match &run {
                Ok(output) => output.failure_reason(step.timeout).unwrap_or_default(),
                Err(e) => e.to_string(),
            };
            warn!(
                "Step {}/{} attempt {}/{} failed ({}), retrying in {:?}",
                target, step.name, attempt, max_attempts, reason, delay
            );
            self.events.emit(SessionEvent::StepRetrying {
                target_id: target.to_string(),
                step_name: step.name.clone(),
                attempt,
                max_attempts,
                delay,
            });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    interrupted = true;
                    break run;
                }
            }
        };
        let duration = start.elapsed();

        let mut result = StepResult {
            step_name: step.name.clone(),
            status: StepStatus::Failed,
            duration,
            captured_output: String::new(),
            started_at,
            command: Some(shown),
            exit_code: None,
            timed_out: false,
            attempts: attempt,
            dry_run_substituted: substituted,
            message: None,
        };

        let mut outputs = BTreeMap::new();
        match last {
            Ok(output) => {
                result.captured_output = output.combined();
                result.exit_code = output.exit_code;
                result.timed_out = output.timed_out;

                if output.success() {
                    result.status = StepStatus::Passed;
                    if step.capture_outputs {
                        outputs = Self::capture(&step.name, &output);
                    }
                } else if output.cancelled || interrupted {
                    result.status = StepStatus::Cancelled;
                    result.message = Some(cancel.reason().unwrap_or_else(|| "cancelled".to_string()));
                } else {
                    let reason = output.failure_reason(step.timeout).unwrap_or_default();
                    Self::report_failure(&step.name, &reason);
                    result.message = Some(reason);
                }
            }
            Err(e) => {
                let reason = e.to_string();
                Self::report_failure(&step.name, &reason);
                result.captured_output = reason.clone();
                result.status = if interrupted {
                    StepStatus::Cancelled
                } else {
                    StepStatus::Failed
                };
                result.message = Some(reason);
            }
        }

        debug!(
            "Step {}/{} finished: {:?} after {} attempt(s) in {:?}",
            target, step.name, result.status, result.attempts, result.duration
        );
        self.events.emit(SessionEvent::StepFinished {
            target_id: target.to_string(),
            step_name: step.name.clone(),
            status: result.status,
            duration: result.duration,
        });

        StepOutcome { result, outputs }
    }

    fn report_failure(step: &str, reason: &str) {
        let err = OrchestratorError::ToolInvocation {
            step: step.to_string(),
            message: reason.to_string(),
        };
        warn!("{}", err);
    }

    fn capture(step: &str, output: &ProcessOutput) -> BTreeMap<String, Value> {
        match parse_outputs(&output.stdout) {
            Some(outputs) => {
                debug!("Step {} captured {} output value(s)", step, outputs.len());
                outputs
            }
            None => {
                warn!("Step {} requested output capture but printed no JSON object", step);
                BTreeMap::new()
            }
        }
    }
}

/// Parse the first JSON object in a tool's stdout
///
/// Accepts both a flat object and the provisioner's
/// `{"name": {"value": v, ...}}` form, which is unwrapped to `{"name": v}`.
pub fn parse_outputs(stdout: &str) -> Option<BTreeMap<String, Value>> {
    for (idx, _) in stdout.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&stdout[idx..]).into_iter::<Value>();
        if let Some(Ok(Value::Object(map))) = stream.next() {
            let wrapped = !map.is_empty()
                && map
                    .values()
                    .all(|v| v.as_object().is_some_and(|o| o.contains_key("value")));

            let outputs = map
                .into_iter()
                .map(|(k, v)| {
                    let v = if wrapped {
                        v.get("value").cloned().unwrap_or(Value::Null)
                    } else {
                        v
                    };
                    (k, v)
                })
                .collect();
            return Some(outputs);
        }
    }
    None
}
