//! CLI command definitions

use crate::core::config::{PipelineOptions, StrategyKind};
use crate::report::ReportFormat;
use clap::Args;
use std::path::PathBuf;

/// Flags shared by every session command
#[derive(Debug, Args, Clone, Default)]
pub struct SessionArgs {
    /// Override the project name used in reports and as {{ project }}
    #[arg(long)]
    pub project: Option<String>,

    /// Environment overlay from the project file
    #[arg(short, long)]
    pub environment: Option<String>,

    /// Run read-only equivalents instead of mutating steps
    #[arg(long)]
    pub dry_run: bool,

    /// Extra report formats (JSON is always written)
    #[arg(long, value_enum)]
    pub format: Vec<ReportFormatArg>,

    /// Add each target's test_env (emulated cloud backends)
    #[arg(long)]
    pub test_mode: bool,

    /// Scheduling strategy inside a dependency stage
    #[arg(long, value_enum)]
    pub strategy: Option<SchedulingStrategyArg>,

    /// Variable overrides (key=value)
    #[arg(long = "var", value_parser = parse_key_value)]
    pub variables: Vec<(String, String)>,

    /// Don't save the session to history
    #[arg(long)]
    pub no_history: bool,

    /// Directory for report files
    #[arg(long)]
    pub report_dir: Option<PathBuf>,
}

impl SessionArgs {
    pub fn options(&self) -> PipelineOptions {
        PipelineOptions {
            environment: self.environment.clone(),
            project: self.project.clone(),
            dry_run: self.dry_run,
            test_mode: self.test_mode,
            teardown: false,
        }
    }

    pub fn formats(&self) -> Vec<ReportFormat> {
        self.format.iter().copied().map(ReportFormat::from).collect()
    }
}

/// Compare the monthly cost of two providers
#[derive(Debug, Args, Clone)]
pub struct CostCompareCommand {
    #[command(flatten)]
    pub session: SessionArgs,

    /// First provider (defaults to cost.compare[0])
    #[arg(long)]
    pub provider_a: Option<String>,

    /// Second provider (defaults to cost.compare[1])
    #[arg(long)]
    pub provider_b: Option<String>,

    /// Hours to price (defaults to cost.duration_hours)
    #[arg(long)]
    pub hours: Option<f64>,

    /// Pricing table to use instead of cost.pricing
    #[arg(long)]
    pub pricing: Option<PathBuf>,
}

/// Validate a project configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show session history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Project name to filter by
    #[arg(short, long)]
    pub project: Option<String>,

    /// Number of recent sessions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific session ID
    #[arg(long)]
    pub session_id: Option<String>,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

impl From<SchedulingStrategyArg> for StrategyKind {
    fn from(arg: SchedulingStrategyArg) -> Self {
        match arg {
            SchedulingStrategyArg::Sequential => StrategyKind::Sequential,
            SchedulingStrategyArg::Parallel => StrategyKind::Parallel,
            SchedulingStrategyArg::ParallelLimited => StrategyKind::ParallelLimited,
        }
    }
}

/// Report format argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormatArg {
    Json,
    Html,
    Csv,
}

impl From<ReportFormatArg> for ReportFormat {
    fn from(arg: ReportFormatArg) -> Self {
        match arg {
            ReportFormatArg::Json => ReportFormat::Json,
            ReportFormatArg::Html => ReportFormat::Html,
            ReportFormatArg::Csv => ReportFormat::Csv,
        }
    }
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
