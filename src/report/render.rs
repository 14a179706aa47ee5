//! Report renderers
//!
//! Each format is a pure function of a [`SessionReport`].

use super::SessionReport;
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to render HTML report: {0}")]
    Template(#[from] tera::Error),

    #[error("failed to render CSV report: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to render CSV report: {0}")]
    Io(#[from] std::io::Error),

    #[error("report is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Html,
    Csv,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Html => "html",
            ReportFormat::Csv => "csv",
        }
    }
}

/// Render a report in the requested format
pub fn render(report: &SessionReport, format: ReportFormat) -> Result<String, ReportError> {
    match format {
        ReportFormat::Json => render_json(report),
        ReportFormat::Html => render_html(report),
        ReportFormat::Csv => render_csv(report),
    }
}

pub fn render_json(report: &SessionReport) -> Result<String, ReportError> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn render_html(report: &SessionReport) -> Result<String, ReportError> {
    let mut tera = Tera::default();
    // The .html suffix turns on autoescaping for everything interpolated
    tera.add_raw_template("session.html", HTML_TEMPLATE)?;

    let mut context = Context::new();
    context.insert("report", report);
    context.insert("title", &format!("{} {}", report.project, report.kind));

    Ok(tera.render("session.html", &context)?)
}

#[derive(Serialize)]
struct CsvRow<'a> {
    session_id: String,
    kind: &'a str,
    project: &'a str,
    target_id: &'a str,
    provider: Option<&'a str>,
    pipeline_status: String,
    step: &'a str,
    status: String,
    attempts: u32,
    duration_ms: u128,
    exit_code: Option<i32>,
    timed_out: bool,
    dry_run_substituted: bool,
    command: Option<&'a str>,
    message: Option<&'a str>,
}

/// One row per step, across every pipeline
pub fn render_csv(report: &SessionReport) -> Result<String, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let session_id = report.session_id.to_string();

    for pipeline in &report.pipelines {
        let pipeline_status = enum_label(&pipeline.status);
        for step in &pipeline.steps {
            writer.serialize(CsvRow {
                session_id: session_id.clone(),
                kind: report.kind.as_str(),
                project: &report.project,
                target_id: &pipeline.target_id,
                provider: pipeline.provider.as_deref(),
                pipeline_status: pipeline_status.clone(),
                step: &step.name,
                status: enum_label(&step.status),
                attempts: step.attempts,
                duration_ms: step.duration.as_millis(),
                exit_code: step.exit_code,
                timed_out: step.timed_out,
                dry_run_substituted: step.dry_run_substituted,
                command: step.command.as_deref(),
                message: step.message.as_deref(),
            })?;
        }
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// Serde name of a unit enum variant
fn enum_label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{ title }}</title>
<style>
body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif; margin: 2em; color: #222; }
table { border-collapse: collapse; margin-bottom: 1.5em; width: 100%; }
th, td { border: 1px solid #ccc; padding: 4px 8px; text-align: left; vertical-align: top; }
th { background: #f3f3f3; }
pre { margin: 0; white-space: pre-wrap; font-size: 0.85em; }
.passed, .success, .completed, .achieved { color: #1a7f37; }
.failed, .aborted, .missed { color: #cf222e; }
.partial, .skipped, .cancelled, .not_measured { color: #9a6700; }
</style>
</head>
<body>
<h1>{{ report.project }}: {{ report.kind }}</h1>
<table>
<tr><th>Session</th><td>{{ report.session_id }}</td></tr>
<tr><th>Environment</th><td>{% if report.environment %}{{ report.environment }}{% else %}-{% endif %}</td></tr>
<tr><th>Started</th><td>{{ report.timestamp }}</td></tr>
<tr><th>Finished</th><td>{{ report.finished_at }}</td></tr>
<tr><th>Duration</th><td>{{ report.totals.duration_ms }} ms</td></tr>
<tr><th>Status</th><td class="{{ report.overall_status }}">{{ report.overall_status }}</td></tr>
<tr><th>Dry run</th><td>{{ report.dry_run }}</td></tr>
<tr><th>Test mode</th><td>{{ report.test_mode }}</td></tr>
<tr><th>Steps</th><td>{{ report.totals.passed }} passed, {{ report.totals.failed }} failed, {{ report.totals.skipped }} skipped, {{ report.totals.cancelled }} cancelled</td></tr>
{% if report.cancelled %}<tr><th>Cancelled</th><td>{{ report.cancelled }}</td></tr>{% endif %}
{% if report.error %}<tr><th>Error</th><td class="failed">{{ report.error }}</td></tr>{% endif %}
</table>

{% for pipeline in report.pipelines %}
<h2>{{ pipeline.target_id }}{% if pipeline.provider %} ({{ pipeline.provider }}){% endif %}</h2>
<p class="{{ pipeline.status }}">{{ pipeline.status }}{% if pipeline.degraded %} (degraded){% endif %}, policy {{ pipeline.policy }}, {{ pipeline.duration_ms }} ms</p>
<table>
<tr><th>#</th><th>Step</th><th>Status</th><th>Attempts</th><th>Duration (ms)</th><th>Command</th><th>Message</th><th>Output</th></tr>
{% for step in pipeline.steps %}
<tr>
<td>{{ loop.index }}</td>
<td>{{ step.name }}{% if step.dry_run_substituted %} <em>(read-only)</em>{% endif %}</td>
<td class="{{ step.status }}">{{ step.status }}{% if step.timed_out %} (timeout){% endif %}</td>
<td>{{ step.attempts }}</td>
<td>{{ step.duration_ms }}</td>
<td>{% if step.command %}<code>{{ step.command }}</code>{% endif %}</td>
<td>{% if step.message %}{{ step.message }}{% endif %}</td>
<td><pre>{{ step.output_tail }}</pre></td>
</tr>
{% endfor %}
</table>
{% endfor %}

{% if report.replication_config %}
<h2>Replication</h2>
<table>
<tr><th>Method</th><td>{{ report.replication_config.method }}</td></tr>
<tr><th>Primary</th><td>{{ report.replication_config.primary }}</td></tr>
<tr><th>Secondary</th><td>{{ report.replication_config.secondary }}</td></tr>
<tr><th>RPO</th><td>{{ report.replication_config.rpo_minutes }} min</td></tr>
<tr><th>RTO</th><td>{{ report.replication_config.rto_minutes }} min</td></tr>
</table>
{% endif %}

{% if report.rto %}
<h2>Recovery time</h2>
<table>
<tr><th>Mode</th><td>{{ report.rto.mode }}</td></tr>
<tr><th>Objective</th><td>{{ report.rto.objective_seconds }} s</td></tr>
<tr><th>Measured</th><td>{% if report.rto.measured_seconds is number %}{{ report.rto.measured_seconds | round(precision=1) }} s{% else %}-{% endif %}</td></tr>
<tr><th>Result</th><td class="{{ report.rto.achievement }}">{{ report.rto.achievement }}</td></tr>
</table>
{% endif %}

{% if report.cost_comparison %}
{% set cost = report.cost_comparison %}
<h2>Cost comparison</h2>
<table>
<tr><th></th><th>{{ cost.provider_a }}</th><th>{{ cost.provider_b }}</th></tr>
<tr><th>Compute</th><td>{{ cost.estimate_a.breakdown.compute }}</td><td>{{ cost.estimate_b.breakdown.compute }}</td></tr>
<tr><th>Storage</th><td>{{ cost.estimate_a.breakdown.storage }}</td><td>{{ cost.estimate_b.breakdown.storage }}</td></tr>
<tr><th>Network</th><td>{{ cost.estimate_a.breakdown.network }}</td><td>{{ cost.estimate_b.breakdown.network }}</td></tr>
<tr><th>Free tier</th><td>-{{ cost.estimate_a.free_tier_deduction }}</td><td>-{{ cost.estimate_b.free_tier_deduction }}</td></tr>
<tr><th>Total ({{ cost.estimate_a.currency }})</th><td>{{ cost.estimate_a.monthly_total }}</td><td>{{ cost.estimate_b.monthly_total }}</td></tr>
</table>
<p>Difference: {{ cost.absolute_diff }} ({{ cost.percentage_diff }}%){% if cost.cheaper %}, {{ cost.cheaper }} is cheaper{% endif %}. Pricing version {{ cost.estimate_a.pricing_version }}, {{ cost.estimate_a.duration_hours }} hours.</p>
{% endif %}

<footer><small>Generated {{ report.generated_at }}</small></footer>
</body>
</html>
"#;
