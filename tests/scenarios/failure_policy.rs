//! Test: failure policies, retries and step timeouts

use crate::helpers::*;
use dr_orchestrator::core::{OverallStatus, PipelineOptions, PipelineStatus, StepStatus};
use dr_orchestrator::execution::SessionKind;
use std::sync::Arc;
use std::time::Duration;

const CONTINUE_YAML: &str = r#"
project: webapp
targets:
  - id: aws
    policy: continue_on_error
    steps:
      - { name: lint, command: [tflint] }
      - { name: apply, command: [tf, apply] }
      - { name: smoke, command: [curl, -sf, "http://localhost"] }
"#;

#[tokio::test]
async fn test_continue_on_error_attempts_every_step() {
    let config = project_from_yaml(CONTINUE_YAML);
    let runner = Arc::new(ScriptedRunner::new().on("tflint", Script::fail(2, "3 issues found")));

    let outcome = run_project(&config, SessionKind::Deploy, PipelineOptions::default(), runner.clone()).await;

    let aws = pipeline(&outcome, "aws");
    assert_eq!(aws.results().len(), aws.steps.len());
    assert_statuses(&outcome, "aws", &[StepStatus::Failed, StepStatus::Passed, StepStatus::Passed]);
    assert_pipeline_status(&outcome, "aws", PipelineStatus::Completed);
    assert!(aws.state.degraded);
    assert_eq!(runner.calls().len(), 3);

    // A completed but degraded pipeline is not a clean success
    assert_eq!(outcome.status, OverallStatus::Partial);
}

#[tokio::test]
async fn test_fail_fast_records_skip_reason() {
    let config = project_from_yaml(MULTICLOUD_YAML);
    let runner = Arc::new(ScriptedRunner::new().on("aws-init", Script::fail(1, "")));

    let outcome = run_project(&config, SessionKind::Deploy, PipelineOptions::default(), runner).await;

    let aws = pipeline(&outcome, "aws");
    assert_eq!(aws.counts().skipped, 2);
    for skipped in &aws.results()[1..] {
        assert_eq!(skipped.message.as_deref(), Some("previous step 'init' failed"));
        assert_eq!(skipped.attempts, 0);
        assert!(skipped.command.is_none());
    }
}

#[tokio::test]
async fn test_retry_until_success() {
    let yaml = r#"
project: webapp
targets:
  - id: aws
    steps:
      - name: init
        command: [tf, init]
        retry: { max_attempts: 3, backoff_secs: 0 }
"#;
    let config = project_from_yaml(yaml);
    let runner = Arc::new(ScriptedRunner::new().on_sequence(
        "tf init",
        vec![Script::fail(1, "lock held"), Script::fail(1, "lock held"), Script::ok()],
    ));

    let outcome = run_project(&config, SessionKind::Deploy, PipelineOptions::default(), runner.clone()).await;

    let init = pipeline(&outcome, "aws").result("init").unwrap();
    assert_eq!(init.status, StepStatus::Passed);
    assert_eq!(init.attempts, 3);
    assert_eq!(runner.count("tf init"), 3);
    assert_eq!(outcome.status, OverallStatus::Success);
}

#[tokio::test]
async fn test_retries_exhausted() {
    let yaml = r#"
project: webapp
defaults:
  retry: { max_attempts: 2 }
targets:
  - id: aws
    steps:
      - { name: init, command: [tf, init] }
"#;
    let config = project_from_yaml(yaml);
    let runner = Arc::new(ScriptedRunner::new().on("tf init", Script::fail(3, "denied")));

    let outcome = run_project(&config, SessionKind::Deploy, PipelineOptions::default(), runner.clone()).await;

    let init = pipeline(&outcome, "aws").result("init").unwrap();
    assert_eq!(init.status, StepStatus::Failed);
    assert_eq!(init.attempts, 2);
    assert_eq!(init.exit_code, Some(3));
    assert_eq!(outcome.status, OverallStatus::Failed);
}

#[tokio::test]
async fn test_step_timeout_fails_step() {
    let yaml = r#"
project: webapp
targets:
  - id: aws
    steps:
      - { name: apply, command: [tf, apply], timeout_secs: 1 }
      - { name: configure, command: [playbook, site] }
"#;
    let config = project_from_yaml(yaml);
    let runner = Arc::new(ScriptedRunner::new().on("tf apply", Script::ok().delayed(Duration::from_secs(30))));

    let outcome = run_project(&config, SessionKind::Deploy, PipelineOptions::default(), runner).await;

    let apply = pipeline(&outcome, "aws").result("apply").unwrap();
    assert_eq!(apply.status, StepStatus::Failed);
    assert!(apply.timed_out);
    assert_eq!(apply.message.as_deref(), Some("timed out after 1s"));
    assert_statuses(&outcome, "aws", &[StepStatus::Failed, StepStatus::Skipped]);
    assert!(outcome.duration < Duration::from_secs(10));
}
