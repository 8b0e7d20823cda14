//! Templating engine bindings for the alignment engine
//!
//! This crate handles:
//! - Rendering raw files through a templating engine (raw, Python format strings, Jinja,
//!   bind-parameter placeholders)
//! - Substituting undefined names with tracked sentinels so renders complete
//! - dbt builtins and render context for Jinja models
//! - Turning alignments into validated templated files and diagnostics

pub mod cache;
pub mod context;
pub mod functions;
pub mod jinja;
pub mod placeholder;
pub mod python;
pub mod raw;
pub mod undefined;
pub mod value;

pub use cache::EnvironmentCache;
pub use context::{TemplateContext, TemplateContextBuilder, TargetContext};
pub use jinja::JinjaTemplater;
pub use placeholder::{ParamStyle, PlaceholderTemplater};
pub use python::PythonTemplater;
pub use raw::RawTemplater;
pub use sqlslice_align::{RenderError, Sentinel, UndefinedSet, UndefinedTracker};
pub use undefined::JinjaSentinel;
pub use value::TemplateValue;

use regex::Regex;
use sqlslice_align::Alignment;
use sqlslice_core::{
    Config, Diagnostic, DiagnosticCode, Location, Severity, SeverityThreshold, TemplatedFile,
    TemplatedFileError, TemplaterKind,
};

/// A templating engine that turns raw file content into a templated file
pub trait Templater: Send + Sync {
    /// Short name used in logs and reports
    fn name(&self) -> &'static str;

    /// Render `raw` and align the output against it
    fn process(&self, raw: &str, path: Option<&str>) -> Result<ProcessResult, TemplaterError>;
}

/// Result of processing one file
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Raw text, rendered text and the mapping between them
    pub templated_file: TemplatedFile,

    /// Names the template referenced but the context did not define
    pub undefined: UndefinedSet,

    /// Warnings raised while processing
    pub diagnostics: Vec<Diagnostic>,

    /// Whether alignment fell back to character level
    pub degraded: bool,
}

impl ProcessResult {
    /// Validate an alignment and derive its diagnostics
    pub fn from_alignment(
        alignment: Alignment,
        path: Option<&str>,
        severity: &SeverityThreshold,
    ) -> Result<Self, TemplaterError> {
        let file = path.unwrap_or("<string>");
        let mut diagnostics: Vec<Diagnostic> = alignment
            .undefined
            .iter()
            .map(|name| {
                let code = DiagnosticCode::TemplateUndefinedVariable;
                Diagnostic::new(
                    code,
                    severity.get_severity(code, Severity::Warn),
                    format!("Undefined variable: {}", name),
                )
                .with_location(Location::with_line(file, first_mention(&alignment.source, name)))
            })
            .collect();

        if alignment.degraded {
            let code = DiagnosticCode::AlignmentDegraded;
            diagnostics.push(
                Diagnostic::new(
                    code,
                    severity.get_severity(code, Severity::Warn),
                    "Could not align rendered output with the template; positions are approximate",
                )
                .with_location(Location::new(file)),
            );
        }

        let templated_file = alignment.to_templated_file(path.map(str::to_string))?;

        Ok(Self {
            templated_file,
            undefined: alignment.undefined,
            diagnostics,
            degraded: alignment.degraded,
        })
    }
}

/// Errors from processing a file
#[derive(Debug, thiserror::Error)]
pub enum TemplaterError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Invalid mapping: {0}")]
    Mapping(#[from] TemplatedFileError),

    #[error("Invalid templater configuration: {0}")]
    Config(String),
}

impl TemplaterError {
    /// Convert to a diagnostic located in `file`
    pub fn to_diagnostic(&self, file: &str) -> Diagnostic {
        match self {
            Self::Render(err) => err.to_diagnostic(file),
            Self::Mapping(err) => Diagnostic::new(
                DiagnosticCode::AlignmentDegraded,
                Severity::Error,
                err.to_string(),
            )
            .with_location(Location::new(file)),
            Self::Config(message) => Diagnostic::new(
                DiagnosticCode::TemplaterConfigError,
                Severity::Error,
                message.clone(),
            )
            .with_location(Location::new(file)),
        }
    }
}

/// Build the templater selected by `config`
pub fn templater_from_config(config: &Config) -> Result<Box<dyn Templater>, TemplaterError> {
    let templater: Box<dyn Templater> = match config.templater {
        TemplaterKind::Raw => Box::new(RawTemplater::from_config(config)),
        TemplaterKind::Python => Box::new(PythonTemplater::from_config(config)),
        TemplaterKind::Jinja => Box::new(JinjaTemplater::from_config(config)),
        TemplaterKind::Placeholder => Box::new(PlaceholderTemplater::from_config(config)?),
    };
    Ok(templater)
}

/// Build the templater selected by `config`, sharing Jinja environments
/// through `cache` under the project root
pub fn templater_with_cache(
    config: &Config,
    cache: &EnvironmentCache,
) -> Result<Box<dyn Templater>, TemplaterError> {
    match config.templater {
        TemplaterKind::Jinja => {
            let jinja = JinjaTemplater::from_config(config)
                .with_cache(cache.clone(), config.project_root.display().to_string());
            Ok(Box::new(jinja))
        }
        _ => templater_from_config(config),
    }
}

/// 1-based line containing byte `offset` of `text`
pub(crate) fn line_of(text: &str, offset: usize) -> usize {
    text.as_bytes()[..offset.min(text.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

/// First line of `raw` mentioning `name` as a whole word, falling back to
/// its root and then line 1
fn first_mention(raw: &str, name: &str) -> usize {
    let root = name.split(['.', '(', '[']).next().unwrap_or(name);
    find_word(raw, name)
        .or_else(|| find_word(raw, root))
        .map_or(1, |offset| line_of(raw, offset))
}

fn find_word(raw: &str, word: &str) -> Option<usize> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    if word.is_empty() {
        return None;
    }

    let mut pattern = regex::escape(word);
    if word.starts_with(is_word) {
        pattern.insert_str(0, r"\b");
    }
    if word.ends_with(is_word) {
        pattern.push_str(r"\b");
    }
    Regex::new(&pattern).ok()?.find(raw).map(|m| m.start())
}
