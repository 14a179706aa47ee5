//! Process outcome types

use std::time::Duration;
use thiserror::Error;

/// Error types for process invocation
///
/// A process that ran and failed is not an error; see [`ProcessOutput`].
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of one subprocess run
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub exit_code: Option<i32>,

    /// Captured stdout (credentials masked)
    pub stdout: String,

    /// Captured stderr (credentials masked)
    pub stderr: String,

    /// Wall-clock duration of the run
    pub duration: Duration,

    /// The process was killed because it exceeded its timeout
    pub timed_out: bool,

    /// The process was killed because the session was cancelled
    pub cancelled: bool,
}

impl ProcessOutput {
    /// Exit code 0, not killed
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out && !self.cancelled
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }

    /// Short human readable reason for a failed run
    pub fn failure_reason(&self, timeout: Duration) -> Option<String> {
        if self.cancelled {
            Some("cancelled".to_string())
        } else if self.timed_out {
            Some(format!("timed out after {}s", timeout.as_secs()))
        } else {
            match self.exit_code {
                Some(0) => None,
                Some(code) => Some(format!("exited with code {}", code)),
                None => Some("terminated by signal".to_string()),
            }
        }
    }
}
