//! Test utility functions for dr-orchestrator
#![allow(dead_code)]

use async_trait::async_trait;
use dr_orchestrator::core::{Pipeline, PipelineOptions, PipelineStatus, ProjectConfig, StepStatus};
use dr_orchestrator::execution::{SessionBuilder, SessionKind, SessionOutcome};
use dr_orchestrator::runner::{
    CancellationToken, Invocation, LogSink, OutputStream, ProcessOutput, ProcessRunner, RunnerError,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Scripted outcome of one runner call
#[derive(Debug, Clone)]
pub struct Script {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub delay: Option<Duration>,
    pub spawn_error: bool,
}

impl Script {
    pub fn ok() -> Self {
        Self {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            delay: None,
            spawn_error: false,
        }
    }

    pub fn ok_with(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Self::ok()
        }
    }

    pub fn fail(exit_code: i32, stderr: &str) -> Self {
        Self {
            exit_code,
            stderr: stderr.to_string(),
            ..Self::ok()
        }
    }

    /// The binary cannot be spawned at all
    pub fn missing_binary() -> Self {
        Self {
            spawn_error: true,
            ..Self::ok()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// One call the runner received
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub label: String,
    pub command: String,
    pub env: BTreeMap<String, String>,
    pub secret_names: Vec<String>,
    pub at: Instant,
}

/// Mock runner that returns scripted outcomes per command
///
/// Rules match when their pattern is a substring of the rendered command
/// line; the first matching rule wins. A rule with several scripts returns
/// them in order and repeats the last one. Unmatched commands succeed.
pub struct ScriptedRunner {
    rules: Vec<(String, Vec<Script>)>,
    hits: Mutex<HashMap<usize, usize>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            hits: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on(self, pattern: &str, script: Script) -> Self {
        self.on_sequence(pattern, vec![script])
    }

    pub fn on_sequence(mut self, pattern: &str, scripts: Vec<Script>) -> Self {
        assert!(!scripts.is_empty(), "a rule needs at least one script");
        self.rules.push((pattern.to_string(), scripts));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Rendered command lines in call order
    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.command).collect()
    }

    /// Number of calls whose command line contains `pattern`
    pub fn count(&self, pattern: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(pattern)).count()
    }

    fn script_for(&self, command: &str) -> Script {
        let Some(index) = self.rules.iter().position(|(p, _)| command.contains(p.as_str())) else {
            return Script::ok();
        };
        let scripts = &self.rules[index].1;
        let mut hits = self.hits.lock().unwrap();
        let hit = hits.entry(index).or_insert(0);
        let script = scripts[(*hit).min(scripts.len() - 1)].clone();
        *hit += 1;
        script
    }
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        sink: &dyn LogSink,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput, RunnerError> {
        let command = invocation.display();
        self.calls.lock().unwrap().push(RecordedCall {
            label: invocation.label.clone(),
            command: command.clone(),
            env: invocation.env.clone(),
            secret_names: invocation.secrets.keys().cloned().collect(),
            at: Instant::now(),
        });

        let script = self.script_for(&command);
        if script.spawn_error {
            return Err(RunnerError::Spawn {
                program: invocation.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            });
        }

        let start = Instant::now();
        if let Some(delay) = script.delay {
            let limit = delay.min(invocation.timeout);
            tokio::select! {
                _ = tokio::time::sleep(limit) => {}
                _ = cancel.cancelled() => {
                    return Ok(ProcessOutput {
                        exit_code: None,
                        duration: start.elapsed(),
                        cancelled: true,
                        ..ProcessOutput::default()
                    });
                }
            }
            if delay > invocation.timeout {
                return Ok(ProcessOutput {
                    exit_code: None,
                    duration: start.elapsed(),
                    timed_out: true,
                    ..ProcessOutput::default()
                });
            }
        }

        let redactor = invocation.redactor();
        let stdout = redactor.apply(&script.stdout);
        let stderr = redactor.apply(&script.stderr);
        for line in stdout.lines() {
            sink.on_line(&invocation.label, OutputStream::Stdout, line);
        }
        for line in stderr.lines() {
            sink.on_line(&invocation.label, OutputStream::Stderr, line);
        }

        Ok(ProcessOutput {
            exit_code: Some(script.exit_code),
            stdout,
            stderr,
            duration: start.elapsed(),
            timed_out: false,
            cancelled: false,
        })
    }
}

/// Parse a project from YAML, panicking with the error on failure
pub fn project_from_yaml(yaml: &str) -> ProjectConfig {
    ProjectConfig::from_yaml(yaml).unwrap_or_else(|e| panic!("Failed to parse project YAML: {}", e))
}

/// Build and run a session from a project with a scripted runner
pub async fn run_project(
    config: &ProjectConfig,
    kind: SessionKind,
    options: PipelineOptions,
    runner: Arc<ScriptedRunner>,
) -> SessionOutcome {
    let env = |_: &str| -> Option<String> { None };
    SessionBuilder::from_config(config, kind, &options, runner, &env)
        .unwrap_or_else(|e| panic!("Failed to build session: {}", e))
        .build()
        .unwrap_or_else(|e| panic!("Invalid session: {}", e))
        .run()
        .await
}

pub fn pipeline<'a>(outcome: &'a SessionOutcome, target_id: &str) -> &'a Pipeline {
    outcome
        .pipeline(target_id)
        .unwrap_or_else(|| panic!("No pipeline for target '{}'", target_id))
}

/// Assert the step statuses of a pipeline, in order
pub fn assert_statuses(outcome: &SessionOutcome, target_id: &str, expected: &[StepStatus]) {
    let actual = pipeline(outcome, target_id).statuses();
    assert_eq!(
        actual, expected,
        "Pipeline '{}' statuses: {:?}, expected {:?}",
        target_id, actual, expected
    );
}

pub fn assert_pipeline_status(outcome: &SessionOutcome, target_id: &str, expected: PipelineStatus) {
    let actual = pipeline(outcome, target_id).status();
    assert_eq!(
        actual, expected,
        "Pipeline '{}' should be {:?}, but was {:?}",
        target_id, expected, actual
    );
}

/// Two-target project: `aws` then `oci`, independent of each other
pub const MULTICLOUD_YAML: &str = r#"
project: webapp
variables:
  app_port: "8080"
targets:
  - id: aws
    provider: aws
    region: us-east-1
    region_env: AWS_REGION
    steps:
      - { name: init, command: [tf, aws-init] }
      - { name: apply, command: [tf, aws-apply], mutating: true, dry_run_command: [tf, aws-plan] }
      - { name: configure, command: [playbook, aws-site, "--port={{ app_port }}"] }
  - id: oci
    provider: oci
    region: eu-frankfurt-1
    steps:
      - { name: init, command: [tf, oci-init] }
      - { name: apply, command: [tf, oci-apply], mutating: true, dry_run_command: [tf, oci-plan] }
      - { name: configure, command: [playbook, oci-site] }
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use dr_orchestrator::runner::NoopLogSink;

    fn invocation(program: &str, args: &[&str]) -> Invocation {
        Invocation::new(
            program,
            args.iter().map(|s| s.to_string()).collect(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_scripted_runner_sequence_repeats_last() {
        let runner = ScriptedRunner::new().on_sequence("probe", vec![Script::fail(1, "not yet"), Script::ok()]);
        let cancel = CancellationToken::new();

        let mut codes = Vec::new();
        for _ in 0..3 {
            let out = runner.run(&invocation("curl", &["probe"]), &NoopLogSink, &cancel).await.unwrap();
            codes.push(out.exit_code);
        }
        assert_eq!(codes, vec![Some(1), Some(0), Some(0)]);
        assert_eq!(runner.count("probe"), 3);
    }

    #[tokio::test]
    async fn test_scripted_runner_delay_honours_cancel() {
        let runner = ScriptedRunner::new().on("sleep", Script::ok().delayed(Duration::from_secs(30)));
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel("test");
        });

        let out = runner.run(&invocation("sleep", &["30"]), &NoopLogSink, &cancel).await.unwrap();
        assert!(out.cancelled);
        assert!(!out.success());
    }
}
