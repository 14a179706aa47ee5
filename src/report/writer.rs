//! Report files on disk

use super::{render, ReportFormat, SessionReport};
use crate::error::{OrchestratorError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A report file that was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenReport {
    pub format: ReportFormat,
    pub path: PathBuf,
}

/// File name stem shared by every format of one session
pub fn report_stem(report: &SessionReport) -> String {
    let id = report.session_id.simple().to_string();
    format!(
        "session-{}-{}",
        report.timestamp.format("%Y%m%dT%H%M%SZ"),
        &id[..8]
    )
}

/// Writes session reports into a directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
    formats: Vec<ReportFormat>,
}

impl ReportWriter {
    /// JSON is always written; other formats are added on request
    pub fn new(dir: impl Into<PathBuf>, formats: &[ReportFormat]) -> Self {
        let mut all = vec![ReportFormat::Json];
        for format in formats {
            if !all.contains(format) {
                all.push(*format);
            }
        }
        Self {
            dir: dir.into(),
            formats: all,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn formats(&self) -> &[ReportFormat] {
        &self.formats
    }

    /// Write every configured format
    ///
    /// The JSON document is written first. If it cannot be written it is
    /// printed to stdout so the results are not lost, and the error is
    /// returned. Failures of the other formats are logged and skipped.
    pub fn write(&self, report: &SessionReport) -> Result<Vec<WrittenReport>> {
        let stem = report_stem(report);
        let mut written = Vec::new();

        let json = render::render_json(report)?;
        let json_path = self.dir.join(format!("{}.json", stem));
        if let Err(err) = self.write_file(&json_path, &json) {
            println!("{}", json);
            return Err(err);
        }
        info!("Report written to {}", json_path.display());
        written.push(WrittenReport {
            format: ReportFormat::Json,
            path: json_path,
        });

        for format in self.formats.iter().filter(|f| **f != ReportFormat::Json) {
            let path = self.dir.join(format!("{}.{}", stem, format.extension()));
            let rendered = match render::render(report, *format) {
                Ok(rendered) => rendered,
                Err(e) => {
                    warn!("Skipping {} report: {}", format.extension(), e);
                    continue;
                }
            };
            match self.write_file(&path, &rendered) {
                Ok(()) => {
                    info!("Report written to {}", path.display());
                    written.push(WrittenReport {
                        format: *format,
                        path,
                    });
                }
                Err(e) => warn!("{}", e),
            }
        }

        Ok(written)
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .and_then(|_| fs::write(path, contents))
            .map_err(|source| OrchestratorError::ReportWrite {
                path: path.to_path_buf(),
                source,
            })
    }
}
