//! Test: cost comparison between providers

use crate::helpers::*;
use dr_orchestrator::core::{OverallStatus, PipelineOptions, ProjectConfig};
use dr_orchestrator::execution::{cost_comparison_from_config, SessionKind};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const PRICING_YAML: &str = r#"
version: "2024-06"
currency: USD
providers:
  aws:
    compute: { m5.large: 0.0832 }
    storage_gb_month: 0.08
    egress_gb: 0.09
  oci:
    compute: { VM.Standard.A1.Flex: 0.0125 }
    storage_gb_month: 0.0255
    egress_gb: 0.0085
"#;

/// Project with a pricing file next to it, loaded the way the CLI loads it
fn cost_project(dir: &Path) -> ProjectConfig {
    std::fs::write(dir.join("pricing.yaml"), PRICING_YAML).unwrap();
    let yaml = format!(
        "{}{}",
        MULTICLOUD_YAML,
        r#"cost:
  pricing: pricing.yaml
  compare: [aws, oci]
  shapes:
    aws: { instance_class: m5.large, storage_gb: 100, egress_gb: 4.3 }
    oci: { instance_class: VM.Standard.A1.Flex, storage_gb: 20, egress_gb: 12 }
"#
    );
    let path = dir.join("orchestrator.yaml");
    std::fs::write(&path, yaml).unwrap();
    ProjectConfig::from_file(&path).unwrap()
}

#[test]
fn test_monthly_comparison() {
    let dir = TempDir::new().unwrap();
    let config = cost_project(dir.path());

    let comparison = cost_comparison_from_config(&config, "aws", "oci", None, None).unwrap();

    assert_eq!(comparison.estimate_a.monthly_total, 69.12);
    assert_eq!(comparison.estimate_b.monthly_total, 9.74);
    assert_eq!(comparison.absolute_diff, 59.38);
    assert!((comparison.percentage_diff - 85.9).abs() < 0.05);
    assert_eq!(comparison.cheaper.as_deref(), Some("oci"));
    assert_eq!(comparison.estimate_a.pricing_version, "2024-06");
    assert_eq!(comparison.estimate_a.currency, "USD");
}

#[test]
fn test_swapped_providers_negate_difference() {
    let dir = TempDir::new().unwrap();
    let config = cost_project(dir.path());

    let forward = cost_comparison_from_config(&config, "aws", "oci", None, None).unwrap();
    let reverse = cost_comparison_from_config(&config, "oci", "aws", None, None).unwrap();

    assert_eq!(reverse.absolute_diff, -forward.absolute_diff);
    assert_eq!(reverse.cheaper, forward.cheaper);
    assert!(reverse.percentage_diff < 0.0);
}

#[test]
fn test_duration_override_scales_compute() {
    let dir = TempDir::new().unwrap();
    let config = cost_project(dir.path());

    let day = cost_comparison_from_config(&config, "aws", "oci", Some(24.0), None).unwrap();

    assert_eq!(day.estimate_a.duration_hours, 24.0);
    assert_eq!(day.estimate_a.breakdown.compute, 2.0);
}

#[test]
fn test_unknown_provider_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    let config = cost_project(dir.path());

    let err = cost_comparison_from_config(&config, "aws", "gcp", None, None).unwrap_err();
    assert!(err.to_string().contains("gcp"));
}

#[tokio::test]
async fn test_cost_compare_session_runs_no_pipelines() {
    let dir = TempDir::new().unwrap();
    let config = cost_project(dir.path());
    let runner = Arc::new(ScriptedRunner::new());

    let outcome = run_project(&config, SessionKind::CostCompare, PipelineOptions::default(), runner.clone()).await;

    assert!(outcome.pipelines.is_empty());
    assert!(runner.calls().is_empty());
    assert_eq!(outcome.status, OverallStatus::Success);
}

#[tokio::test]
async fn test_deploy_report_embeds_configured_comparison() {
    let dir = TempDir::new().unwrap();
    let config = cost_project(dir.path());
    let runner = Arc::new(ScriptedRunner::new());

    let outcome = run_project(&config, SessionKind::Deploy, PipelineOptions::default(), runner).await;

    let cost = outcome.cost.as_ref().unwrap();
    assert_eq!(cost.provider_a, "aws");
    assert_eq!(cost.absolute_diff, 59.38);
}
