//! Test: reports built from real session outcomes

use crate::helpers::*;
use dr_orchestrator::core::{OverallStatus, PipelineOptions, StepStatus};
use dr_orchestrator::execution::SessionKind;
use dr_orchestrator::report::{render, ReportFormat, ReportWriter, SessionReport};
use std::sync::Arc;
use tempfile::TempDir;

async fn partial_report() -> SessionReport {
    let config = project_from_yaml(MULTICLOUD_YAML);
    let runner = Arc::new(ScriptedRunner::new().on("oci-apply", Script::fail(1, "Error: quota exceeded")));
    let outcome = run_project(&config, SessionKind::Deploy, PipelineOptions::default(), runner).await;
    SessionReport::from_outcome(&outcome)
}

#[tokio::test]
async fn test_report_reflects_outcome() {
    let report = partial_report().await;

    assert_eq!(report.project, "webapp");
    assert_eq!(report.overall_status, OverallStatus::Partial);
    assert_eq!(report.totals.pipelines, 2);
    assert_eq!(report.totals.passed, 4);
    assert_eq!(report.totals.failed, 1);
    assert_eq!(report.totals.skipped, 1);

    let oci = report.pipeline("oci").unwrap();
    assert_eq!(oci.steps.len(), 3);
    let apply = &oci.steps[1];
    assert_eq!(apply.status, StepStatus::Failed);
    assert_eq!(apply.exit_code, Some(1));
    assert!(apply.output_tail.contains("quota exceeded"));
    assert!(oci.steps[2].message.as_deref().unwrap().contains("apply"));
}

#[tokio::test]
async fn test_json_report_round_trips() {
    let report = partial_report().await;

    let json = render(&report, ReportFormat::Json).unwrap();
    let parsed: SessionReport = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.session_id, report.session_id);
    assert_eq!(parsed.overall_status, report.overall_status);
    assert_eq!(render(&parsed, ReportFormat::Json).unwrap(), json);
}

#[tokio::test]
async fn test_csv_has_one_row_per_step() {
    let report = partial_report().await;

    let csv = render(&report, ReportFormat::Csv).unwrap();
    let rows: Vec<&str> = csv.lines().skip(1).collect();
    assert_eq!(rows.len(), 6);
    assert!(rows.iter().any(|r| r.contains("oci") && r.contains("failed")));
}

#[tokio::test]
async fn test_writer_creates_every_format() {
    let report = partial_report().await;
    let dir = TempDir::new().unwrap();

    let written = ReportWriter::new(dir.path(), &[ReportFormat::Html, ReportFormat::Csv])
        .write(&report)
        .unwrap();

    assert_eq!(written.len(), 3);
    assert_eq!(written[0].format, ReportFormat::Json);
    for file in &written {
        assert!(file.path.exists(), "{} missing", file.path.display());
    }
    let html = std::fs::read_to_string(&written[1].path).unwrap();
    assert!(html.contains("webapp"));
}
