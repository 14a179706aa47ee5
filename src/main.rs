use anyhow::{Context, Result};
use dr_orchestrator::{
    cli::{
        commands::{CostCompareCommand, HistoryCommand, SessionArgs, ValidateCommand},
        output::*,
        sink_factory, Cli, Command,
    },
    core::{config::process_env, ProjectConfig},
    error::OrchestratorError,
    execution::{
        cost_comparison_from_config, plan_stages, SchedulingStrategy, SessionBuilder, SessionKind,
        SessionOutcome,
    },
    persistence::{create_summary, HistoryStore, SessionSummary},
    report::{ReportWriter, SessionReport},
    runner::TokioProcessRunner,
};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; stdout is reserved for console output and report fallback
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let code = match &cli.command {
        Command::Deploy(args) => run_session(&cli, SessionKind::Deploy, args, None).await?,
        Command::DrTest(args) => run_session(&cli, SessionKind::DrTest, args, None).await?,
        Command::Destroy(args) => run_session(&cli, SessionKind::Destroy, args, None).await?,
        Command::CostCompare(cmd) => {
            run_session(&cli, SessionKind::CostCompare, &cmd.session, Some(cmd)).await?
        }
        Command::Validate(cmd) => validate_project(&cli.config, cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    };

    std::process::exit(code);
}

/// Run one orchestration session and return the process exit code
async fn run_session(
    cli: &Cli,
    kind: SessionKind,
    args: &SessionArgs,
    cost_cmd: Option<&CostCompareCommand>,
) -> Result<i32> {
    let mut config = match ProjectConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            let err = OrchestratorError::from(e);
            let project = args.project.clone().unwrap_or_else(|| "unknown".to_string());
            let report_dir = args.report_dir.clone().unwrap_or_else(|| PathBuf::from("reports"));
            return fatal(kind, project, args, &report_dir, err);
        }
    };

    for (key, value) in &args.variables {
        debug!("Variable override: {} = {}", key, value);
        config.variables.insert(key.clone(), Value::String(value.clone()));
    }

    let options = args.options();
    let project = config.project_name(&options).to_string();
    let report_dir = args
        .report_dir
        .clone()
        .unwrap_or_else(|| config.resolve_path(&config.session.report_dir));

    println!(
        "{} Loaded project: {}",
        INFO,
        style(&project).bold()
    );

    let session = match build_session(cli, &config, kind, args, cost_cmd) {
        Ok(session) => session,
        Err(e) => return fatal(kind, project, args, &report_dir, e),
    };

    // Ctrl-C cancels the whole session; subprocesses are killed by the runner
    let token = session.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling session");
            token.cancel("interrupted by user");
        }
    });

    println!();
    let outcome = session.run().await;
    println!("{}", format_outcome(&outcome));

    finish(&outcome, args, &report_dir).await
}

fn build_session(
    cli: &Cli,
    config: &ProjectConfig,
    kind: SessionKind,
    args: &SessionArgs,
    cost_cmd: Option<&CostCompareCommand>,
) -> Result<dr_orchestrator::execution::OrchestrationSession<TokioProcessRunner>, OrchestratorError> {
    let runner = Arc::new(TokioProcessRunner::new());
    let mut builder = SessionBuilder::from_config(config, kind, &args.options(), runner, &process_env)?;

    if let Some(strategy) = args.strategy {
        builder = builder.strategy(SchedulingStrategy::from_config(
            strategy.into(),
            config.session.max_parallel,
        ));
    }

    if let Some(cmd) = cost_cmd {
        let configured = config.cost.as_ref().map(|c| c.compare.clone()).unwrap_or_default();
        let provider = |explicit: &Option<String>, index: usize, flag: &str| {
            explicit
                .clone()
                .or_else(|| configured.get(index).cloned())
                .ok_or_else(|| OrchestratorError::config(format!("{} is required", flag)))
        };
        let a = provider(&cmd.provider_a, 0, "--provider-a")?;
        let b = provider(&cmd.provider_b, 1, "--provider-b")?;
        let comparison =
            cost_comparison_from_config(config, &a, &b, cmd.hours, cmd.pricing.as_deref())?;
        builder = builder.cost(comparison);
    }

    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    let log_dir = config.resolve_path(&config.session.log_dir);
    let progress = SessionProgress::new(cli.stream);

    builder
        .sink_factory(sink_factory(log_dir, stamp, cli.stream))
        .on_event(move |event| progress.handle(&event))
        .build()
}

/// Report for a session that never started, then exit 1
fn fatal(
    kind: SessionKind,
    project: String,
    args: &SessionArgs,
    report_dir: &Path,
    err: OrchestratorError,
) -> Result<i32> {
    error!("{}", err);
    println!("{} {}", CROSS, style(&err).red());

    let outcome = SessionOutcome::failed_before_start(kind, project, args.environment.clone(), &err);
    let report = SessionReport::from_outcome(&outcome);
    if let Err(e) = ReportWriter::new(report_dir, &args.formats()).write(&report) {
        error!("{}", e);
    }
    Ok(1)
}

/// Write reports and history, then map the outcome to an exit code
async fn finish(outcome: &SessionOutcome, args: &SessionArgs, report_dir: &Path) -> Result<i32> {
    let report = SessionReport::from_outcome(outcome);
    let writer = ReportWriter::new(report_dir, &args.formats());

    let written = match writer.write(&report) {
        Ok(written) => written,
        Err(e) => {
            error!("{}", e);
            println!("{} {}", CROSS, style(&e).red());
            return Ok(1);
        }
    };
    for file in &written {
        println!("{} Report: {}", INFO, style(file.path.display()).dim());
    }

    if !args.no_history {
        let summary = create_summary(outcome, written.first().map(|w| w.path.as_path()));
        match open_history().await {
            Ok(store) => match store.save_session(&summary).await {
                Ok(()) => println!(
                    "{} Session saved to history (ID: {})",
                    INFO,
                    style(&summary.session_id.to_string()[..8]).dim()
                ),
                Err(e) => warn!("Failed to save session history: {:#}", e),
            },
            Err(e) => warn!("History unavailable: {:#}", e),
        }
    }

    Ok(outcome.status.exit_code())
}

#[cfg(feature = "sqlite")]
async fn open_history() -> Result<Arc<dyn HistoryStore>> {
    let store = dr_orchestrator::persistence::SqliteHistoryStore::with_default_path().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_history() -> Result<Arc<dyn HistoryStore>> {
    warn!("Built without the sqlite feature; history is not persisted");
    Ok(Arc::new(dr_orchestrator::persistence::InMemoryHistory::new()))
}

fn validate_project(path: &Path, cmd: &ValidateCommand) -> Result<i32> {
    println!("{} Validating {}...", INFO, path.display());

    let config = match ProjectConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            return Ok(1);
        }
    };

    println!("{} Project configuration is valid!", CHECK);
    println!("  Project: {}", style(&config.project).bold());
    println!("  Targets: {}", style(config.targets.len()).cyan());
    for target in &config.targets {
        println!(
            "    {} ({}) - {} steps, {} teardown{}",
            style(&target.id).bold(),
            target.provider.as_deref().unwrap_or("-"),
            target.steps.len(),
            target.teardown.len(),
            if target.depends_on.is_empty() {
                String::new()
            } else {
                format!(", after {}", target.depends_on.join(", "))
            }
        );
    }

    let graph: Vec<(String, Vec<String>)> = config
        .targets
        .iter()
        .map(|t| (t.id.clone(), t.depends_on.clone()))
        .collect();
    let stages = plan_stages(&graph, false)?;
    for (i, stage) in stages.iter().enumerate() {
        println!("  Stage {}: {}", i + 1, stage.join(", "));
    }

    if let Some(replication) = &config.replication {
        println!(
            "  Replication: {} -> {} (RPO {} min, RTO {} min)",
            replication.primary, replication.secondary, replication.rpo_minutes, replication.rto_minutes
        );
    }
    if config.dr_test.is_some() {
        println!("  DR test: {}", style("configured").green());
    }
    if let Some(cost) = &config.cost {
        println!("  Cost comparison: {}", cost.compare.join(" vs "));
    }

    if cmd.json {
        let json = serde_json::to_string_pretty(&config)?;
        println!("\n{}", json);
    }
    Ok(0)
}

async fn show_history(cmd: &HistoryCommand) -> Result<i32> {
    let store = open_history().await?;

    if let Some(id) = &cmd.session_id {
        let session_id = uuid::Uuid::parse_str(id).context("Invalid session ID format")?;
        match store.load_session(session_id).await? {
            Some(summary) => print_session_details(&summary, cmd.verbose, cmd.json)?,
            None => println!("{} Session not found", WARN),
        }
        return Ok(0);
    }

    let sessions = match &cmd.project {
        Some(project) => store.list_sessions(project, cmd.limit).await?,
        None => {
            let mut all = Vec::new();
            for project in store.list_projects().await? {
                all.extend(store.list_sessions(&project, cmd.limit).await?);
            }
            all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all.truncate(cmd.limit);
            all
        }
    };

    if cmd.json {
        let data = serde_json::json!({ "sessions": sessions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(0);
    }

    if sessions.is_empty() {
        println!("{} No sessions found", INFO);
        return Ok(0);
    }

    println!("{} Session history (showing latest {}):", INFO, cmd.limit);
    for summary in &sessions {
        println!("  {}", format_session_summary(summary));
    }
    Ok(0)
}

fn print_session_details(summary: &SessionSummary, verbose: bool, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("{} Session Details", INFO);
    println!("  ID: {}", style(summary.session_id).cyan());
    println!("  Project: {}", style(&summary.project).bold());
    println!("  Kind: {}", summary.kind);
    if let Some(env) = &summary.environment {
        println!("  Environment: {}", env);
    }
    println!("  Status: {}", format_overall_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    println!("  Finished: {}", style(summary.finished_at.to_rfc3339()).dim());
    if let Ok(duration) = summary.finished_at.signed_duration_since(summary.started_at).to_std() {
        println!("  Duration: {}", style(format_duration(duration)).dim());
    }
    println!(
        "  Steps: {} passed, {} failed, {} skipped, {} cancelled",
        summary.counts.passed, summary.counts.failed, summary.counts.skipped, summary.counts.cancelled
    );
    if let Some(path) = &summary.report_path {
        println!("  Report: {}", path);
    }

    if verbose {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }
    Ok(())
}
