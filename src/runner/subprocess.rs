//! Subprocess runner on top of `tokio::process`

use crate::runner::{
    CancellationToken, Invocation, LogSink, OutputStream, ProcessOutput, ProcessRunner, Redactor,
    RunnerError,
};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Host variables a subprocess keeps after the environment is cleared
const PRESERVED_ENV: &[&str] = &["PATH", "HOME", "USER", "SHELL", "TMPDIR", "TERM", "LANG"];

/// How long to keep reading after exit while a grandchild still holds the pipes
const DRAIN_GRACE: Duration = Duration::from_millis(500);

enum Termination {
    Exited,
    TimedOut,
    Cancelled,
}

/// Runs invocations as real subprocesses
#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    preserved_env: Vec<String>,
}

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self {
            preserved_env: PRESERVED_ENV.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Keep an additional host variable in the subprocess environment
    pub fn preserve_env(mut self, name: impl Into<String>) -> Self {
        self.preserved_env.push(name.into());
        self
    }

    fn build_command(&self, invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);

        // Start from a clean environment; the context passes everything else explicitly
        cmd.env_clear();
        for var in &self.preserved_env {
            if let Ok(value) = std::env::var(var) {
                cmd.env(var, value);
            }
        }
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }
        for (key, secret) in &invocation.secrets {
            cmd.env(key, secret.expose());
        }

        if let Some(dir) = &invocation.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so a timeout takes the whole tool tree down
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }

    fn forward(
        redactor: &Redactor,
        sink: &dyn LogSink,
        label: &str,
        stream: OutputStream,
        line: &str,
        captured: &mut String,
    ) {
        let line = redactor.apply(line);
        sink.on_line(label, stream, &line);
        captured.push_str(&line);
        captured.push('\n');
    }

    /// SIGKILL the process group led by `pid`
    fn kill_group(pid: Option<u32>, program: &str) {
        #[cfg(unix)]
        if let Some(pid) = pid {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                debug!("killpg for '{}' (pid {}) failed: {}", program, pid, e);
            }
        }
        #[cfg(not(unix))]
        let _ = (pid, program);
    }

    async fn terminate(child: &mut Child, program: &str) {
        Self::kill_group(child.id(), program);

        if let Err(e) = child.start_kill() {
            debug!("kill for '{}' failed: {}", program, e);
        }
        if let Err(e) = child.wait().await {
            warn!("Failed to reap '{}' after kill: {}", program, e);
        }
    }
}

impl Default for TokioProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        sink: &dyn LogSink,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput, RunnerError> {
        debug!(
            "Spawning '{}' with {} args for {}",
            invocation.program,
            invocation.args.len(),
            invocation.label
        );

        let redactor = invocation.redactor();
        let started = Instant::now();

        let mut child = self
            .build_command(invocation)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;
        let pid = child.id();

        let io_error = |what: &str| RunnerError::Io {
            program: invocation.program.clone(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, format!("{} not captured", what)),
        };
        let mut stdout_lines = BufReader::new(child.stdout.take().ok_or_else(|| io_error("stdout"))?).lines();
        let mut stderr_lines = BufReader::new(child.stderr.take().ok_or_else(|| io_error("stderr"))?).lines();

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut exit_status: Option<std::process::ExitStatus> = None;

        let deadline = tokio::time::sleep(invocation.timeout);
        tokio::pin!(deadline);

        let termination = loop {
            if exit_status.is_some() && !stdout_open && !stderr_open {
                break Termination::Exited;
            }

            tokio::select! {
                line = stdout_lines.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => Self::forward(&redactor, sink, &invocation.label, OutputStream::Stdout, &line, &mut stdout),
                    Ok(None) => stdout_open = false,
                    Err(e) => {
                        warn!("Error reading stdout of '{}': {}", invocation.program, e);
                        stdout_open = false;
                    }
                },
                line = stderr_lines.next_line(), if stderr_open => match line {
                    Ok(Some(line)) => Self::forward(&redactor, sink, &invocation.label, OutputStream::Stderr, &line, &mut stderr),
                    Ok(None) => stderr_open = false,
                    Err(e) => {
                        warn!("Error reading stderr of '{}': {}", invocation.program, e);
                        stderr_open = false;
                    }
                },
                status = child.wait(), if exit_status.is_none() => match status {
                    Ok(status) => exit_status = Some(status),
                    Err(source) => {
                        return Err(RunnerError::Io {
                            program: invocation.program.clone(),
                            source,
                        });
                    }
                },
                _ = tokio::time::sleep(DRAIN_GRACE), if exit_status.is_some() => break Termination::Exited,
                _ = &mut deadline => break Termination::TimedOut,
                _ = cancel.cancelled() => break Termination::Cancelled,
            }
        };

        let mut output = ProcessOutput::default();
        match (termination, exit_status) {
            (_, Some(status)) => {
                output.exit_code = status.code();
                if stdout_open || stderr_open {
                    debug!("'{}' exited with its pipes still open, killing process group", invocation.label);
                    Self::kill_group(pid, &invocation.program);
                }
            }
            (Termination::Cancelled, None) => {
                debug!("Cancelling '{}'", invocation.label);
                Self::terminate(&mut child, &invocation.program).await;
                output.cancelled = true;
            }
            (_, None) => {
                warn!(
                    "'{}' exceeded its {}s timeout, killing process group",
                    invocation.label,
                    invocation.timeout.as_secs()
                );
                Self::terminate(&mut child, &invocation.program).await;
                output.timed_out = true;
            }
        }

        sink.flush();
        output.stdout = stdout;
        output.stderr = stderr;
        output.duration = started.elapsed();

        debug!(
            "'{}' finished in {:?} (exit {:?}, timed_out {}, cancelled {})",
            invocation.label, output.duration, output.exit_code, output.timed_out, output.cancelled
        );

        Ok(output)
    }
}
