//! Test: multi-cloud deploys, stage ordering and output publishing

use crate::helpers::*;
use dr_orchestrator::core::{OverallStatus, PipelineOptions, PipelineStatus, StepStatus};
use dr_orchestrator::execution::{SchedulingStrategy, SessionBuilder, SessionKind};
use std::sync::Arc;
use std::time::Duration;

/// One cloud fails mid-pipeline while the other succeeds
#[tokio::test]
async fn test_partial_when_one_target_fails() {
    let config = project_from_yaml(MULTICLOUD_YAML);
    let runner = Arc::new(ScriptedRunner::new().on("oci-apply", Script::fail(1, "Error: quota exceeded")));

    let outcome = run_project(&config, SessionKind::Deploy, PipelineOptions::default(), runner.clone()).await;

    assert_statuses(&outcome, "aws", &[StepStatus::Passed, StepStatus::Passed, StepStatus::Passed]);
    assert_statuses(&outcome, "oci", &[StepStatus::Passed, StepStatus::Failed, StepStatus::Skipped]);
    assert_pipeline_status(&outcome, "aws", PipelineStatus::Completed);
    assert_pipeline_status(&outcome, "oci", PipelineStatus::Aborted);
    assert_eq!(outcome.status, OverallStatus::Partial);
    assert_eq!(outcome.status.exit_code(), 2);

    // The failed step carries the tool's diagnostics
    let apply = pipeline(&outcome, "oci").result("apply").unwrap();
    assert_eq!(apply.exit_code, Some(1));
    assert!(apply.captured_output.contains("quota exceeded"));
    assert_eq!(runner.count("oci-site"), 0);

    let totals = outcome.totals();
    assert_eq!((totals.passed, totals.failed, totals.skipped), (4, 1, 1));
}

#[tokio::test]
async fn test_all_targets_succeed() {
    let config = project_from_yaml(MULTICLOUD_YAML);
    let runner = Arc::new(ScriptedRunner::new());

    let outcome = run_project(&config, SessionKind::Deploy, PipelineOptions::default(), runner.clone()).await;

    assert_eq!(outcome.status, OverallStatus::Success);
    assert_eq!(runner.calls().len(), 6);
    assert!(runner.commands().contains(&"playbook aws-site --port=8080".to_string()));
    for p in &outcome.pipelines {
        assert!(outcome.duration >= p.duration());
    }
}

#[tokio::test]
async fn test_every_target_fails() {
    let config = project_from_yaml(MULTICLOUD_YAML);
    let runner = Arc::new(ScriptedRunner::new().on("-init", Script::fail(1, "backend unreachable")));

    let outcome = run_project(&config, SessionKind::Deploy, PipelineOptions::default(), runner).await;

    assert_eq!(outcome.status, OverallStatus::Failed);
    assert_eq!(outcome.status.exit_code(), 1);
}

#[tokio::test]
async fn test_region_and_credentials_reach_subprocess() {
    let yaml = r#"
project: webapp
targets:
  - id: aws
    region: us-east-1
    region_env: AWS_REGION
    credentials_env: [AWS_SECRET_ACCESS_KEY]
    test_env: { AWS_ENDPOINT_URL: "http://localhost:4566" }
    steps:
      - { name: whoami, command: [aws, sts, get-caller-identity] }
"#;
    let config = project_from_yaml(yaml);
    let runner = Arc::new(ScriptedRunner::new().on("sts", Script::ok_with("key=s3cr3t-value")));
    let lookup = |name: &str| -> Option<String> {
        (name == "AWS_SECRET_ACCESS_KEY").then(|| "s3cr3t-value".to_string())
    };
    let options = PipelineOptions {
        test_mode: true,
        ..PipelineOptions::default()
    };

    let outcome = SessionBuilder::from_config(
        &config,
        SessionKind::Deploy,
        &options,
        runner.clone(),
        &lookup,
    )
    .unwrap()
    .build()
    .unwrap()
    .run()
    .await;

    let call = &runner.calls()[0];
    assert_eq!(call.env.get("AWS_REGION").map(String::as_str), Some("us-east-1"));
    assert_eq!(
        call.env.get("AWS_ENDPOINT_URL").map(String::as_str),
        Some("http://localhost:4566")
    );
    assert_eq!(call.secret_names, vec!["AWS_SECRET_ACCESS_KEY"]);

    let output = &pipeline(&outcome, "aws").results()[0].captured_output;
    assert!(!output.contains("s3cr3t-value"));
    assert!(output.contains("****"));
}

#[tokio::test]
async fn test_region_read_from_environment() {
    let yaml = r#"
project: webapp
targets:
  - id: aws
    region_env: AWS_REGION
    steps:
      - { name: whoami, command: [aws, sts, get-caller-identity, "--region={{ region }}"] }
"#;
    let config = project_from_yaml(yaml);
    let runner = Arc::new(ScriptedRunner::new());
    let lookup = |name: &str| -> Option<String> { (name == "AWS_REGION").then(|| "eu-west-1".to_string()) };

    SessionBuilder::from_config(&config, SessionKind::Deploy, &PipelineOptions::default(), runner.clone(), &lookup)
        .unwrap()
        .build()
        .unwrap()
        .run()
        .await;

    let call = &runner.calls()[0];
    assert_eq!(call.env.get("AWS_REGION").map(String::as_str), Some("eu-west-1"));
    assert!(call.command.ends_with("--region=eu-west-1"));
}

/// Gap between the starts of the two `init` steps under a strategy
async fn init_start_gap(strategy: SchedulingStrategy) -> Duration {
    let config = project_from_yaml(MULTICLOUD_YAML);
    let delay = Duration::from_millis(300);
    let runner = Arc::new(
        ScriptedRunner::new()
            .on("aws-init", Script::ok().delayed(delay))
            .on("oci-init", Script::ok().delayed(delay)),
    );
    let env = |_: &str| -> Option<String> { None };

    let outcome = SessionBuilder::from_config(&config, SessionKind::Deploy, &PipelineOptions::default(), runner.clone(), &env)
        .unwrap()
        .strategy(strategy)
        .build()
        .unwrap()
        .run()
        .await;
    assert_eq!(outcome.status, OverallStatus::Success);

    let calls = runner.calls();
    let start = |pattern: &str| calls.iter().find(|c| c.command.contains(pattern)).unwrap().at;
    let (aws, oci) = (start("aws-init"), start("oci-init"));
    if aws <= oci {
        oci.duration_since(aws)
    } else {
        aws.duration_since(oci)
    }
}

#[tokio::test]
async fn test_parallel_targets_overlap() {
    let gap = init_start_gap(SchedulingStrategy::Parallel).await;
    assert!(gap < Duration::from_millis(150), "gap was {:?}", gap);
}

#[tokio::test]
async fn test_sequential_runs_one_target_at_a_time() {
    let gap = init_start_gap(SchedulingStrategy::Sequential).await;
    assert!(gap >= Duration::from_millis(300), "gap was {:?}", gap);
}

#[tokio::test]
async fn test_limited_parallel_caps_concurrency() {
    let gap = init_start_gap(SchedulingStrategy::LimitedParallel(1)).await;
    assert!(gap >= Duration::from_millis(300), "gap was {:?}", gap);

    let gap = init_start_gap(SchedulingStrategy::LimitedParallel(2)).await;
    assert!(gap < Duration::from_millis(150), "gap was {:?}", gap);
}

/// Outputs of an upstream target become variables of its dependents
#[tokio::test]
async fn test_outputs_published_to_dependent_stage() {
    let yaml = r#"
project: webapp
targets:
  - id: network
    steps:
      - name: outputs
        command: [tf, output, -json]
        capture_outputs: true
  - id: app
    depends_on: [network]
    steps:
      - { name: configure, command: [playbook, "--vpc={{ network.vpc_id }}"] }
"#;
    let config = project_from_yaml(yaml);
    let runner = Arc::new(
        ScriptedRunner::new().on("output -json", Script::ok_with(r#"{"vpc_id": {"value": "vpc-123", "sensitive": false}}"#)),
    );

    let outcome = run_project(&config, SessionKind::Deploy, PipelineOptions::default(), runner.clone()).await;

    assert_eq!(outcome.status, OverallStatus::Success);
    assert_eq!(
        runner.commands(),
        vec!["tf output -json".to_string(), "playbook --vpc=vpc-123".to_string()]
    );
}

/// A dependent target is recorded but never run when its upstream fails
#[tokio::test]
async fn test_dependent_blocked_by_failed_upstream() {
    let yaml = r#"
project: webapp
targets:
  - id: network
    steps:
      - { name: apply, command: [tf, net-apply] }
  - id: app
    depends_on: [network]
    steps:
      - { name: apply, command: [tf, app-apply] }
      - { name: configure, command: [playbook, app-site] }
"#;
    let config = project_from_yaml(yaml);
    let runner = Arc::new(ScriptedRunner::new().on("net-apply", Script::fail(1, "")));

    let outcome = run_project(&config, SessionKind::Deploy, PipelineOptions::default(), runner.clone()).await;

    assert_statuses(&outcome, "app", &[StepStatus::Skipped, StepStatus::Skipped]);
    assert_pipeline_status(&outcome, "app", PipelineStatus::Aborted);
    assert_eq!(runner.count("app-"), 0);
    let reason = pipeline(&outcome, "app").results()[0].message.clone().unwrap();
    assert!(reason.contains("network"));
    assert_eq!(outcome.status, OverallStatus::Failed);
}

/// Destroy runs teardown steps with dependents torn down first
#[tokio::test]
async fn test_destroy_reverses_dependency_order() {
    let yaml = r#"
project: webapp
targets:
  - id: network
    steps:
      - { name: apply, command: [tf, net-apply] }
    teardown:
      - { name: destroy, command: [tf, net-destroy] }
  - id: app
    depends_on: [network]
    steps:
      - { name: apply, command: [tf, app-apply] }
    teardown:
      - { name: destroy, command: [tf, app-destroy] }
"#;
    let config = project_from_yaml(yaml);
    let runner = Arc::new(ScriptedRunner::new());

    let outcome = run_project(&config, SessionKind::Destroy, PipelineOptions::default(), runner.clone()).await;

    assert_eq!(outcome.status, OverallStatus::Success);
    assert_eq!(
        runner.commands(),
        vec!["tf app-destroy".to_string(), "tf net-destroy".to_string()]
    );
}

#[tokio::test]
async fn test_missing_binary_is_failed_step() {
    let config = project_from_yaml(MULTICLOUD_YAML);
    let runner = Arc::new(ScriptedRunner::new().on("aws-init", Script::missing_binary()));

    let outcome = run_project(&config, SessionKind::Deploy, PipelineOptions::default(), runner).await;

    assert_statuses(&outcome, "aws", &[StepStatus::Failed, StepStatus::Skipped, StepStatus::Skipped]);
    let init = pipeline(&outcome, "aws").result("init").unwrap();
    assert!(init.message.as_deref().unwrap_or_default().contains("spawn"));
    assert_eq!(outcome.status, OverallStatus::Partial);
}
