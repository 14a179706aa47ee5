//! Log sinks for subprocess output
//!
//! Output lines are delivered to a [`LogSink`] as soon as the subprocess
//! writes them, so long-running `apply` or playbook runs show progress
//! while they are still going. Each pipeline owns its own sink; nothing
//! here is shared for writing across concurrently running pipelines.

use chrono::Utc;
use console::style;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

/// Receives subprocess output line by line
///
/// This trait is object-safe and is passed around as `&dyn LogSink`.
pub trait LogSink: Send + Sync {
    /// Called for every line, already stripped of its newline and masked
    fn on_line(&self, label: &str, stream: OutputStream, line: &str);

    /// Flush any buffered output
    fn flush(&self) {}
}

/// Sink that discards everything
#[derive(Debug, Clone, Default)]
pub struct NoopLogSink;

impl LogSink for NoopLogSink {
    fn on_line(&self, _label: &str, _stream: OutputStream, _line: &str) {}
}

/// Prints lines to the terminal, prefixed with target and step
#[derive(Debug, Clone)]
pub struct ConsoleLogSink {
    target: String,
}

impl ConsoleLogSink {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl LogSink for ConsoleLogSink {
    fn on_line(&self, label: &str, stream: OutputStream, line: &str) {
        let prefix = style(format!("[{}/{}]", self.target, label)).dim();
        match stream {
            OutputStream::Stdout => println!("{} {}", prefix, line),
            OutputStream::Stderr => println!("{} {}", prefix, style(line).yellow()),
        }
    }
}

/// Appends timestamped lines to a log file
#[derive(Debug)]
pub struct FileLogSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileLogSink {
    /// Open (or create) the log file, creating parent directories
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileLogSink {
    fn on_line(&self, label: &str, stream: OutputStream, line: &str) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(
                writer,
                "{} [{}] [{}] {}",
                Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                label,
                stream.as_str(),
                line
            );
            // Per-line flush keeps `tail -f` useful during long applies
            let _ = writer.flush();
        }
    }

    fn flush(&self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}

/// Fans every line out to several sinks
#[derive(Clone, Default)]
pub struct TeeLogSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl TeeLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl LogSink for TeeLogSink {
    fn on_line(&self, label: &str, stream: OutputStream, line: &str) {
        for sink in &self.sinks {
            sink.on_line(label, stream, line);
        }
    }

    fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}
