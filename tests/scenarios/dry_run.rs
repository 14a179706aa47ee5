//! Test: dry-run substitutes read-only commands for mutating ones

use crate::helpers::*;
use dr_orchestrator::core::{OverallStatus, PipelineOptions, StepStatus};
use dr_orchestrator::execution::SessionKind;
use std::sync::Arc;

fn dry_run() -> PipelineOptions {
    PipelineOptions {
        dry_run: true,
        ..PipelineOptions::default()
    }
}

#[tokio::test]
async fn test_mutating_commands_never_invoked() {
    let config = project_from_yaml(MULTICLOUD_YAML);
    let runner = Arc::new(ScriptedRunner::new());

    let outcome = run_project(&config, SessionKind::Deploy, dry_run(), runner.clone()).await;

    assert!(outcome.dry_run);
    assert_eq!(runner.count("-apply"), 0);
    assert_eq!(runner.count("aws-plan"), 1);
    assert_eq!(runner.count("oci-plan"), 1);

    let apply = pipeline(&outcome, "aws").result("apply").unwrap();
    assert_eq!(apply.status, StepStatus::Passed);
    assert!(apply.dry_run_substituted);
    assert_eq!(apply.command.as_deref(), Some("tf aws-plan"));

    // Non-mutating steps run as written
    let init = pipeline(&outcome, "aws").result("init").unwrap();
    assert!(!init.dry_run_substituted);
    assert_eq!(outcome.status, OverallStatus::Success);
}

#[tokio::test]
async fn test_mutating_step_without_read_only_form_is_skipped() {
    let yaml = r#"
project: webapp
targets:
  - id: aws
    steps:
      - { name: init, command: [tf, init] }
      - { name: rotate, command: [./rotate-keys.sh], mutating: true }
      - { name: verify, command: [./verify.sh] }
"#;
    let config = project_from_yaml(yaml);
    let runner = Arc::new(ScriptedRunner::new());

    let outcome = run_project(&config, SessionKind::Deploy, dry_run(), runner.clone()).await;

    assert_statuses(&outcome, "aws", &[StepStatus::Passed, StepStatus::Skipped, StepStatus::Passed]);
    assert_eq!(runner.count("rotate-keys"), 0);
    assert_eq!(outcome.status, OverallStatus::Success);
}

#[tokio::test]
async fn test_provisioner_apply_becomes_plan() {
    let yaml = r#"
project: webapp
targets:
  - id: aws
    steps:
      - { name: init, provisioner: init }
      - { name: apply, provisioner: apply }
"#;
    let config = project_from_yaml(yaml);
    let runner = Arc::new(ScriptedRunner::new());

    run_project(&config, SessionKind::Deploy, dry_run(), runner.clone()).await;

    assert_eq!(
        runner.commands(),
        vec![
            "terraform init -input=false".to_string(),
            "terraform plan -input=false".to_string()
        ]
    );
}

#[tokio::test]
async fn test_dry_run_is_repeatable() {
    let config = project_from_yaml(MULTICLOUD_YAML);

    let first_runner = Arc::new(ScriptedRunner::new());
    let first = run_project(&config, SessionKind::Deploy, dry_run(), first_runner.clone()).await;
    let second_runner = Arc::new(ScriptedRunner::new());
    let second = run_project(&config, SessionKind::Deploy, dry_run(), second_runner.clone()).await;

    for target in ["aws", "oci"] {
        assert_eq!(
            pipeline(&first, target).statuses(),
            pipeline(&second, target).statuses()
        );
    }
    let mut a = first_runner.commands();
    let mut b = second_runner.commands();
    a.sort();
    b.sort();
    assert_eq!(a, b);
}
