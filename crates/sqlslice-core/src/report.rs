//! `report.json` written by `sqlslice check`
//!
//! One entry per discovered file, in discovery order. The summary is kept in
//! step with the entries by [`Report::push`]; bump [`REPORT_FORMAT`] on any
//! change that would break an existing reader.

use crate::diagnostic::{Diagnostic, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Current `format` value of a report
pub const REPORT_FORMAT: u32 = 1;

/// What happened to one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    /// Rendered and aligned span by span
    Aligned,

    /// Rendered, but only a character-level mapping could be built
    Degraded,

    /// Could not be read or rendered; no mapping exists
    Failed,
}

/// Result of checking one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub path: String,
    pub outcome: FileOutcome,

    /// Number of mapping slices; zero for failed files
    pub slices: usize,

    /// Undefined names, sorted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub undefined: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl FileReport {
    /// A file that produced a mapping
    pub fn rendered(path: impl Into<String>, slices: usize, degraded: bool) -> Self {
        Self {
            path: path.into(),
            outcome: if degraded {
                FileOutcome::Degraded
            } else {
                FileOutcome::Aligned
            },
            slices,
            undefined: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// A file that never got as far as a mapping
    pub fn failed(path: impl Into<String>, diagnostic: Diagnostic) -> Self {
        Self {
            path: path.into(),
            outcome: FileOutcome::Failed,
            slices: 0,
            undefined: Vec::new(),
            diagnostics: vec![diagnostic],
        }
    }

    pub fn with_undefined(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.undefined = names.into_iter().collect();
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

/// Totals over every [`FileReport`]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub files: usize,
    pub aligned: usize,
    pub degraded: usize,
    pub failed: usize,

    /// Undefined names summed over files
    pub undefined: usize,

    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
}

impl ReportSummary {
    fn count(&mut self, file: &FileReport) {
        self.files += 1;
        match file.outcome {
            FileOutcome::Aligned => self.aligned += 1,
            FileOutcome::Degraded => self.degraded += 1,
            FileOutcome::Failed => self.failed += 1,
        }
        self.undefined += file.undefined.len();
        for diag in &file.diagnostics {
            match diag.severity {
                Severity::Error => self.errors += 1,
                Severity::Warn => self.warnings += 1,
                Severity::Info => self.info += 1,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub format: u32,
    pub generated_at: DateTime<Utc>,

    /// Name of the templater every file went through
    pub templater: String,

    pub summary: ReportSummary,
    pub files: Vec<FileReport>,
}

impl Report {
    pub fn new(templater: impl Into<String>) -> Self {
        Self {
            format: REPORT_FORMAT,
            generated_at: Utc::now(),
            templater: templater.into(),
            summary: ReportSummary::default(),
            files: Vec::new(),
        }
    }

    pub fn push(&mut self, file: FileReport) {
        self.summary.count(&file);
        self.files.push(file);
    }

    /// Whether any file failed or raised an error-level diagnostic
    pub fn has_errors(&self) -> bool {
        self.summary.failed > 0 || self.summary.errors > 0
    }

    /// Every diagnostic paired with the path of its file
    pub fn diagnostics(&self) -> impl Iterator<Item = (&str, &Diagnostic)> {
        self.files
            .iter()
            .flat_map(|file| file.diagnostics.iter().map(move |d| (file.path.as_str(), d)))
    }

    /// Write pretty-printed JSON to `path`
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer_pretty(&mut out, self)?;
        writeln!(out)?;
        out.flush()
    }
}
