//! Command-line interface

pub mod commands;
pub mod output;

use crate::execution::SinkFactory;
use crate::runner::{ConsoleLogSink, FileLogSink, LogSink, NoopLogSink, TeeLogSink};
use clap::{Parser, Subcommand};
use commands::{CostCompareCommand, HistoryCommand, SessionArgs, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Multi-cloud deployment and DR test orchestrator
#[derive(Debug, Parser, Clone)]
#[command(name = "orchestrator")]
#[command(version)]
#[command(about = "Deploys to several clouds, runs DR tests and compares cost", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the project configuration file
    #[arg(short, long, global = true, default_value = "orchestrator.yaml")]
    pub config: PathBuf,

    /// Stream tool output to the console
    #[arg(short, long, global = true)]
    pub stream: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Provision and configure every target
    Deploy(SessionArgs),

    /// Deploy, then run the disaster-recovery test
    DrTest(SessionArgs),

    /// Run teardown steps in reverse dependency order
    Destroy(SessionArgs),

    /// Compare the cost of two providers
    CostCompare(CostCompareCommand),

    /// Validate the project configuration
    Validate(ValidateCommand),

    /// Show session history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

/// One log file per pipeline under `<log_dir>/<stamp>/`, echoed to the console with `stream`
pub fn sink_factory(log_dir: PathBuf, stamp: String, stream: bool) -> SinkFactory {
    Arc::new(move |target: &str| -> Arc<dyn LogSink> {
        let path = log_dir.join(&stamp).join(format!("{}.log", target));
        let mut tee = TeeLogSink::new();
        match FileLogSink::create(&path) {
            Ok(file) => tee = tee.with(Arc::new(file)),
            Err(e) => warn!("Cannot open log file {}: {}", path.display(), e),
        }
        if stream {
            tee = tee.with(Arc::new(ConsoleLogSink::new(target)));
        }
        if tee.is_empty() {
            Arc::new(NoopLogSink)
        } else {
            Arc::new(tee)
        }
    })
}
