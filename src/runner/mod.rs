//! External tool invocation
//!
//! The provisioner and the configuration runner are driven as opaque
//! subprocesses. Everything the orchestrator knows about them comes through
//! [`ProcessRunner::run`]: exit code, captured stdout/stderr and duration.

pub mod cancel;
pub mod output;
pub mod redact;
pub mod sink;
pub mod subprocess;

use async_trait::async_trait;
use crate::core::context::Secret;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub use cancel::CancellationToken;
pub use output::{ProcessOutput, RunnerError};
pub use redact::Redactor;
pub use sink::{ConsoleLogSink, FileLogSink, LogSink, NoopLogSink, OutputStream, TeeLogSink};
pub use subprocess::TokioProcessRunner;

/// A fully rendered command ready to be spawned
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Label used to tag log lines (usually the step name)
    pub label: String,

    /// Executable name or path
    pub program: String,

    /// Arguments, already rendered
    pub args: Vec<String>,

    /// Working directory for the subprocess
    pub working_dir: Option<PathBuf>,

    /// Plain environment (region, emulator endpoints, ...)
    pub env: BTreeMap<String, String>,

    /// Credential environment; values are masked in every log line
    pub secrets: BTreeMap<String, Secret>,

    /// Hard limit after which the process group is killed
    pub timeout: Duration,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        let program = program.into();
        Self {
            label: program.clone(),
            program,
            args,
            working_dir: None,
            env: BTreeMap::new(),
            secrets: BTreeMap::new(),
            timeout,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Command line as shown in logs and reports
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    /// Redactor seeded with this invocation's credential values
    pub fn redactor(&self) -> Redactor {
        Redactor::new(self.secrets.values().map(|s| s.expose()))
    }
}

/// Trait for subprocess execution - allows mocking the external tools in tests
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run the command to completion, timeout or cancellation.
    ///
    /// A non-zero exit, a timeout and a cancellation are all `Ok`; they are
    /// described by the returned [`ProcessOutput`]. `Err` is reserved for the
    /// process not being runnable at all.
    async fn run(
        &self,
        invocation: &Invocation,
        sink: &dyn LogSink,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput, RunnerError>;
}
