//! Test: operator cancellation and the session ceiling

use crate::helpers::*;
use dr_orchestrator::core::{OverallStatus, PipelineOptions, PipelineStatus, StepStatus};
use dr_orchestrator::execution::{SessionBuilder, SessionKind};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_cancel_stops_in_flight_step() {
    let config = project_from_yaml(MULTICLOUD_YAML);
    let runner = Arc::new(ScriptedRunner::new().on("aws-apply", Script::ok().delayed(Duration::from_secs(30))));
    let env = |_: &str| -> Option<String> { None };

    let session = SessionBuilder::from_config(&config, SessionKind::Deploy, &PipelineOptions::default(), runner.clone(), &env)
        .unwrap()
        .build()
        .unwrap();
    let token = session.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel("interrupted by user");
    });

    let outcome = session.run().await;

    assert_statuses(&outcome, "aws", &[StepStatus::Passed, StepStatus::Cancelled, StepStatus::Skipped]);
    assert_pipeline_status(&outcome, "aws", PipelineStatus::Cancelled);
    assert_eq!(runner.count("aws-site"), 0);

    let skipped = pipeline(&outcome, "aws").result("configure").unwrap();
    assert_eq!(
        skipped.message.as_deref(),
        Some("session cancelled: interrupted by user")
    );

    // The other target was fast enough to finish before the interrupt
    assert_pipeline_status(&outcome, "oci", PipelineStatus::Completed);
    assert_eq!(outcome.cancelled.as_deref(), Some("interrupted by user"));
    assert!(outcome.is_cancelled());
    assert_eq!(outcome.status, OverallStatus::Partial);
    assert!(outcome.duration < Duration::from_secs(10));
}

#[tokio::test]
async fn test_cancel_before_run_skips_everything() {
    let config = project_from_yaml(MULTICLOUD_YAML);
    let runner = Arc::new(ScriptedRunner::new());
    let env = |_: &str| -> Option<String> { None };

    let session = SessionBuilder::from_config(&config, SessionKind::Deploy, &PipelineOptions::default(), runner.clone(), &env)
        .unwrap()
        .build()
        .unwrap();
    session.cancellation_token().cancel("maintenance window closed");

    let outcome = session.run().await;

    assert!(runner.calls().is_empty());
    for target in ["aws", "oci"] {
        assert_pipeline_status(&outcome, target, PipelineStatus::Cancelled);
        assert_eq!(pipeline(&outcome, target).counts().skipped, 3);
    }
    assert_eq!(outcome.status, OverallStatus::Failed);
}

#[tokio::test]
async fn test_session_ceiling_cancels_run() {
    let yaml = r#"
project: webapp
session:
  max_duration_secs: 1
targets:
  - id: aws
    steps:
      - { name: apply, command: [tf, apply] }
      - { name: configure, command: [playbook, site] }
"#;
    let config = project_from_yaml(yaml);
    let runner = Arc::new(ScriptedRunner::new().on("tf apply", Script::ok().delayed(Duration::from_secs(30))));

    let outcome = run_project(&config, SessionKind::Deploy, PipelineOptions::default(), runner).await;

    assert_statuses(&outcome, "aws", &[StepStatus::Cancelled, StepStatus::Skipped]);
    assert_eq!(
        outcome.cancelled.as_deref(),
        Some("exceeded session ceiling of 1s")
    );
    assert!(outcome.cancellation().unwrap().to_string().contains("ceiling"));
    assert_eq!(outcome.status, OverallStatus::Failed);
}
