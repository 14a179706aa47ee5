//! Test: DR-test sessions and RTO assessment

use crate::helpers::*;
use dr_orchestrator::core::{
    OverallStatus, PipelineOptions, PipelineStatus, ProjectConfig, RtoMode, StepStatus, DR_TARGET_ID,
};
use dr_orchestrator::execution::{RtoAchievement, SessionKind};
use std::sync::Arc;
use std::time::Duration;

fn dr_project(rto_minutes: u32, dr_section: &str) -> ProjectConfig {
    let yaml = format!(
        "{}replication: {{ method: async, rpo_minutes: 15, rto_minutes: {}, primary: aws, secondary: oci }}\n{}",
        MULTICLOUD_YAML, rto_minutes, dr_section
    );
    project_from_yaml(&yaml)
}

const SIMULATED: &str = r#"
dr_test:
  simulate_failure: [drctl, stop-primary]
  trigger_failover: [drctl, promote, "--to={{ replication.secondary }}"]
  verify_secondary: [drctl, verify]
  measure_rto: [drctl, probe]
  rto_mode: simulated
  simulated_rto_secs: 45
"#;

const MEASURED: &str = r#"
dr_test:
  configure_replication: [drctl, replicate, "--from={{ replication.primary }}"]
  simulate_failure: [drctl, stop-primary]
  trigger_failover: [drctl, promote]
  verify_secondary: [drctl, verify]
  measure_rto: [drctl, probe]
  measure_rto_retry: { max_attempts: 3, backoff_secs: 0 }
"#;

#[tokio::test]
async fn test_simulated_rto_against_objective_is_achieved() {
    let config = dr_project(60, SIMULATED);
    let runner = Arc::new(ScriptedRunner::new());

    let outcome = run_project(&config, SessionKind::DrTest, PipelineOptions::default(), runner.clone()).await;

    assert_statuses(
        &outcome,
        DR_TARGET_ID,
        &[StepStatus::Passed, StepStatus::Passed, StepStatus::Passed, StepStatus::Passed],
    );
    let rto = outcome.rto.as_ref().unwrap();
    assert_eq!(rto.mode, RtoMode::Simulated);
    assert_eq!(rto.objective_seconds, 3600);
    assert_eq!(rto.measured_seconds, Some(45.0));
    assert_eq!(rto.achievement, RtoAchievement::Achieved);
    assert_eq!(outcome.status, OverallStatus::Success);

    // DR phases run only after both target pipelines
    let calls = runner.calls();
    let last_target_call = calls.iter().filter(|c| c.command.starts_with("tf") || c.command.starts_with("playbook")).map(|c| c.at).max().unwrap();
    let first_dr_call = calls.iter().filter(|c| c.command.starts_with("drctl")).map(|c| c.at).min().unwrap();
    assert!(first_dr_call >= last_target_call);
    assert!(runner.commands().contains(&"drctl promote --to=oci".to_string()));
}

#[tokio::test]
async fn test_simulated_rto_over_objective_is_missed() {
    let config = dr_project(60, SIMULATED.replace("45", "4000").as_str());
    let runner = Arc::new(ScriptedRunner::new());

    let outcome = run_project(&config, SessionKind::DrTest, PipelineOptions::default(), runner).await;

    let rto = outcome.rto.as_ref().unwrap();
    assert_eq!(rto.measured_seconds, Some(4000.0));
    assert_eq!(rto.achievement, RtoAchievement::Missed);
}

#[tokio::test]
async fn test_measured_rto_times_failover() {
    let config = dr_project(60, MEASURED);
    let runner = Arc::new(
        ScriptedRunner::new()
            .on("promote", Script::ok().delayed(Duration::from_millis(120)))
            .on_sequence("probe", vec![Script::fail(7, "connection refused"), Script::ok()]),
    );

    let outcome = run_project(&config, SessionKind::DrTest, PipelineOptions::default(), runner.clone()).await;

    let dr = pipeline(&outcome, DR_TARGET_ID);
    assert_eq!(dr.steps.len(), 5);
    assert_eq!(dr.result("measure-rto").unwrap().attempts, 2);
    assert!(runner.commands().contains(&"drctl replicate --from=aws".to_string()));

    let rto = outcome.rto.as_ref().unwrap();
    assert_eq!(rto.mode, RtoMode::Measured);
    let measured = rto.measured_seconds.unwrap();
    assert!(measured >= 0.1, "measured {}s", measured);
    assert!(measured < 60.0);
    assert_eq!(rto.achievement, RtoAchievement::Achieved);
}

#[tokio::test]
async fn test_failed_primary_skips_dr_phases() {
    let config = dr_project(60, SIMULATED);
    let runner = Arc::new(ScriptedRunner::new().on("aws-apply", Script::fail(1, "Error: quota exceeded")));

    let outcome = run_project(&config, SessionKind::DrTest, PipelineOptions::default(), runner.clone()).await;

    assert_eq!(runner.count("drctl"), 0);
    let dr = pipeline(&outcome, DR_TARGET_ID);
    assert_eq!(dr.status(), PipelineStatus::Aborted);
    assert!(dr.results().iter().all(|r| r.status == StepStatus::Skipped));

    let rto = outcome.rto.as_ref().unwrap();
    assert_eq!(rto.measured_seconds, None);
    assert_eq!(rto.achievement, RtoAchievement::NotMeasured);
    assert_eq!(outcome.status, OverallStatus::Partial);
}

#[tokio::test]
async fn test_failed_failover_is_not_measured() {
    let config = dr_project(60, MEASURED);
    let runner = Arc::new(ScriptedRunner::new().on("promote", Script::fail(1, "secondary not ready")));

    let outcome = run_project(&config, SessionKind::DrTest, PipelineOptions::default(), runner).await;

    assert_statuses(
        &outcome,
        DR_TARGET_ID,
        &[
            StepStatus::Passed,
            StepStatus::Passed,
            StepStatus::Failed,
            StepStatus::Skipped,
            StepStatus::Skipped,
        ],
    );
    assert_eq!(outcome.rto.as_ref().unwrap().achievement, RtoAchievement::NotMeasured);
}

#[tokio::test]
async fn test_dry_run_dr_test_skips_disruptive_phases() {
    let config = dr_project(60, MEASURED);
    let runner = Arc::new(ScriptedRunner::new());
    let options = PipelineOptions {
        dry_run: true,
        ..PipelineOptions::default()
    };

    let outcome = run_project(&config, SessionKind::DrTest, options, runner.clone()).await;

    assert_statuses(
        &outcome,
        DR_TARGET_ID,
        &[
            StepStatus::Skipped,
            StepStatus::Skipped,
            StepStatus::Skipped,
            StepStatus::Passed,
            StepStatus::Passed,
        ],
    );
    assert_eq!(runner.count("stop-primary"), 0);
    assert_eq!(runner.count("promote"), 0);
    // Without a failure simulation there is nothing to time
    assert_eq!(outcome.rto.as_ref().unwrap().achievement, RtoAchievement::NotMeasured);
}

#[tokio::test]
async fn test_dr_test_requires_dr_section() {
    let config = project_from_yaml(MULTICLOUD_YAML);
    let env = |_: &str| -> Option<String> { None };
    let result = dr_orchestrator::execution::SessionBuilder::from_config(
        &config,
        SessionKind::DrTest,
        &PipelineOptions::default(),
        Arc::new(ScriptedRunner::new()),
        &env,
    );
    let err = result.err().expect("dr-test without dr_test section must fail");
    assert!(err.to_string().contains("dr_test"));
}
