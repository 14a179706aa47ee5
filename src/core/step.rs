//! Step domain model

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default per-step timeout when none is configured
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(900);

/// Program plus arguments, before placeholder rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from an argv list (`[program, arg, ...]`)
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Same command with extra trailing arguments
    pub fn with_args<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(extra.into_iter().map(Into::into));
        self
    }

    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Fixed,
    Exponential,
}

/// Uniform retry policy applied by the step executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (always >= 1)
    pub max_attempts: u32,

    /// Base delay between attempts
    pub backoff: Duration,

    pub strategy: BackoffStrategy,
}

impl RetryPolicy {
    /// Single attempt, no retry
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn new(max_attempts: u32, backoff: Duration, strategy: BackoffStrategy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            strategy,
        }
    }

    /// Delay to wait after the given (1-based) attempt failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.strategy {
            BackoffStrategy::Fixed => self.backoff,
            BackoffStrategy::Exponential => {
                let exponent = attempt.saturating_sub(1).min(16);
                self.backoff.saturating_mul(1u32 << exponent)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// A single unit of work in a pipeline. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Step {
    /// Step name, unique within its pipeline
    pub name: String,

    /// Command run in normal mode
    pub command: CommandSpec,

    /// Read-only equivalent used in dry-run mode for mutating steps
    pub read_only_command: Option<CommandSpec>,

    /// Whether the command changes real infrastructure
    pub is_mutating: bool,

    /// Per-attempt timeout
    pub timeout: Duration,

    pub retry: RetryPolicy,

    /// Parse a JSON output block from stdout and publish it to later steps
    pub capture_outputs: bool,

    /// Working directory override for this step
    pub working_dir: Option<PathBuf>,
}

/// What to do with a step given the pipeline mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSelection<'a> {
    /// Run this command; `substituted` is true when it is the read-only stand-in
    Run {
        command: &'a CommandSpec,
        substituted: bool,
    },
    /// Mutating step without a read-only equivalent in dry-run mode
    Skip { reason: String },
}

impl Step {
    /// A read-only step with default timeout and no retries
    pub fn new(name: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            name: name.into(),
            command,
            read_only_command: None,
            is_mutating: false,
            timeout: DEFAULT_STEP_TIMEOUT,
            retry: RetryPolicy::none(),
            capture_outputs: false,
            working_dir: None,
        }
    }

    /// Mark the step as mutating, with an optional read-only equivalent
    pub fn mutating(mut self, read_only: Option<CommandSpec>) -> Self {
        self.is_mutating = true;
        self.read_only_command = read_only;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn capturing_outputs(mut self) -> Self {
        self.capture_outputs = true;
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Pick the command to execute for the given mode
    pub fn command_for(&self, dry_run: bool) -> CommandSelection<'_> {
        if !dry_run || !self.is_mutating {
            return CommandSelection::Run {
                command: &self.command,
                substituted: false,
            };
        }

        match &self.read_only_command {
            Some(command) => CommandSelection::Run {
                command,
                substituted: true,
            },
            None => CommandSelection::Skip {
                reason: "no read-only equivalent in dry-run".to_string(),
            },
        }
    }
}
