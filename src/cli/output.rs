//! CLI output formatting

use crate::{
    core::{OverallStatus, PipelineStatus, StepStatus},
    cost::CostComparison,
    execution::{RtoAchievement, SessionEvent, SessionOutcome},
    persistence::SessionSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar that grows as pipelines start
pub fn create_progress_bar() -> ProgressBar {
    let progress = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Console progress driven by session events
///
/// With streamed tool output a bar would fight the log lines, so events
/// are printed as plain lines instead.
#[derive(Clone)]
pub struct SessionProgress {
    bar: Option<ProgressBar>,
}

impl SessionProgress {
    pub fn new(stream: bool) -> Self {
        Self {
            bar: if stream { None } else { Some(create_progress_bar()) },
        }
    }

    pub fn handle(&self, event: &SessionEvent) {
        let line = format_session_event(event);
        match &self.bar {
            Some(bar) => {
                match event {
                    SessionEvent::PipelineStarted { steps, .. } => bar.inc_length(*steps as u64),
                    SessionEvent::StepStarted {
                        target_id, step_name, ..
                    } => bar.set_message(format!("{}/{}", target_id, step_name)),
                    SessionEvent::StepFinished { .. } => bar.inc(1),
                    _ => {}
                }
                if let Some(line) = line {
                    bar.println(line);
                }
                if matches!(event, SessionEvent::SessionFinished { .. }) {
                    bar.finish_and_clear();
                }
            }
            None => {
                if let Some(line) = line {
                    println!("{}", line);
                }
            }
        }
    }
}

/// Format a step status for display
pub fn format_step_status(status: StepStatus) -> String {
    match status {
        StepStatus::Passed => style("PASSED").green().to_string(),
        StepStatus::Failed => style("FAILED").red().to_string(),
        StepStatus::Skipped => style("SKIPPED").dim().to_string(),
        StepStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format a pipeline status for display
pub fn format_pipeline_status(status: PipelineStatus, degraded: bool) -> String {
    match status {
        PipelineStatus::Pending => style("PENDING").dim().to_string(),
        PipelineStatus::Running => style("RUNNING").yellow().to_string(),
        PipelineStatus::Completed if degraded => style("COMPLETED (degraded)").yellow().to_string(),
        PipelineStatus::Completed => style("COMPLETED").green().to_string(),
        PipelineStatus::Aborted => style("ABORTED").red().to_string(),
        PipelineStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format the overall session status for display
pub fn format_overall_status(status: OverallStatus) -> String {
    match status {
        OverallStatus::Success => style("SUCCESS").green().bold().to_string(),
        OverallStatus::Partial => style("PARTIAL").yellow().bold().to_string(),
        OverallStatus::Failed => style("FAILED").red().bold().to_string(),
    }
}

/// Format a session event for display; step starts are shown on the bar only
pub fn format_session_event(event: &SessionEvent) -> Option<String> {
    let line = match event {
        SessionEvent::SessionStarted {
            session_id,
            pipelines,
        } => format!(
            "{} Session {} with {} pipeline(s)",
            ROCKET,
            style(&session_id.to_string()[..8]).dim(),
            style(pipelines).cyan()
        ),
        SessionEvent::PipelineStarted { target_id, steps } => format!(
            "{} {} ({} steps)",
            SPINNER,
            style(target_id).bold(),
            steps
        ),
        SessionEvent::StepStarted { .. } => return None,
        SessionEvent::StepRetrying {
            target_id,
            step_name,
            attempt,
            max_attempts,
            delay,
        } => format!(
            "{} {}/{} failed attempt {}/{}, retrying in {}",
            WARN,
            style(target_id).dim(),
            style(step_name).yellow(),
            attempt,
            max_attempts,
            format_duration(*delay)
        ),
        SessionEvent::StepFinished {
            target_id,
            step_name,
            status,
            duration,
        } => {
            let icon = match status {
                StepStatus::Passed => CHECK,
                StepStatus::Failed => CROSS,
                StepStatus::Skipped => INFO,
                StepStatus::Cancelled => WARN,
            };
            format!(
                "{} {}/{} {} {}",
                icon,
                style(target_id).dim(),
                style(step_name).cyan(),
                format_step_status(*status),
                style(format_duration(*duration)).dim()
            )
        }
        SessionEvent::PipelineFinished {
            target_id,
            status,
            degraded,
        } => format!(
            "{} {} {}",
            INFO,
            style(target_id).bold(),
            format_pipeline_status(*status, *degraded)
        ),
        SessionEvent::SessionFinished { status, .. } => {
            format!("{} Session {}", INFO, format_overall_status(*status))
        }
    };
    Some(line)
}

/// Horizontal rule spanning the terminal width
pub fn separator() -> String {
    let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80);
    "─".repeat(width.min(120))
}

/// Final console summary of a session
pub fn format_outcome(outcome: &SessionOutcome) -> String {
    let mut lines = vec![separator()];
    lines.push(format!(
        "{} {} {} ({})",
        style(&outcome.project).bold(),
        outcome.kind,
        format_overall_status(outcome.status),
        format_duration(outcome.duration)
    ));
    if outcome.dry_run {
        lines.push(format!("{} Dry run: mutating steps used read-only equivalents", INFO));
    }

    for pipeline in &outcome.pipelines {
        let counts = pipeline.counts();
        lines.push(format!(
            "  {:<16} {} {} passed, {} failed, {} skipped, {} cancelled",
            pipeline.target_id,
            format_pipeline_status(pipeline.status(), pipeline.state.degraded),
            style(counts.passed).green(),
            style(counts.failed).red(),
            style(counts.skipped).dim(),
            style(counts.cancelled).yellow()
        ));
    }

    if let Some(rto) = &outcome.rto {
        let measured = rto
            .measured_seconds
            .map(|s| format!("{:.1}s", s))
            .unwrap_or_else(|| "n/a".to_string());
        let verdict = match rto.achievement {
            RtoAchievement::Achieved => style("achieved").green().to_string(),
            RtoAchievement::Missed => style("missed").red().to_string(),
            RtoAchievement::NotMeasured => style("not measured").yellow().to_string(),
        };
        lines.push(format!(
            "  RTO: {} against {}s objective, {}",
            measured, rto.objective_seconds, verdict
        ));
    }

    if let Some(cost) = &outcome.cost {
        lines.push(format_cost_comparison(cost));
    }
    if let Some(reason) = &outcome.cancelled {
        lines.push(format!("{} Cancelled: {}", WARN, style(reason).yellow()));
    }
    if let Some(error) = &outcome.error {
        lines.push(format!("{} {}", CROSS, style(error).red()));
    }
    lines.join("\n")
}

/// Side-by-side monthly cost of two providers
pub fn format_cost_comparison(cost: &CostComparison) -> String {
    let a = &cost.estimate_a;
    let b = &cost.estimate_b;
    let mut lines = vec![format!(
        "  Cost ({}, {} hours, pricing {}):",
        a.currency, a.duration_hours, a.pricing_version
    )];
    lines.push(format!("    {:<10} {:>12} {:>12}", "", cost.provider_a, cost.provider_b));
    for (label, va, vb) in [
        ("compute", a.breakdown.compute, b.breakdown.compute),
        ("storage", a.breakdown.storage, b.breakdown.storage),
        ("network", a.breakdown.network, b.breakdown.network),
        ("total", a.monthly_total, b.monthly_total),
    ] {
        lines.push(format!("    {:<10} {:>12.2} {:>12.2}", label, va, vb));
    }
    let cheaper = cost
        .cheaper
        .as_deref()
        .map(|p| format!(", {} is cheaper", style(p).green()))
        .unwrap_or_default();
    lines.push(format!(
        "    difference {:.2} ({:.2}%){}",
        cost.absolute_diff, cost.percentage_diff, cheaper
    ));
    lines.join("\n")
}

/// Format a history entry for display
pub fn format_session_summary(summary: &SessionSummary) -> String {
    let status_icon = match summary.status {
        OverallStatus::Success => CHECK,
        OverallStatus::Failed => CROSS,
        OverallStatus::Partial => WARN,
    };

    format!(
        "{} {} - {} {} - {} - {} passed, {} failed, {} skipped - {}",
        status_icon,
        style(&summary.session_id.to_string()[..8]).dim(),
        style(&summary.project).bold(),
        summary.kind,
        format_overall_status(summary.status),
        summary.counts.passed,
        summary.counts.failed,
        summary.counts.skipped,
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    )
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 1 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
