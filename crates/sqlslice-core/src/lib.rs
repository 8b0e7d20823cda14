//! SQLSlice Core
//!
//! Stable domain types shared by the alignment engine, the templaters and the CLI.
//! Never rename diagnostic codes - they are part of the public API.

pub mod config;
pub mod diagnostic;
pub mod report;
pub mod slice;
pub mod templated_file;

pub use config::{Config, ConfigError, PlaceholderConfig, SeverityThreshold, TemplaterKind};
pub use diagnostic::{Diagnostic, DiagnosticCode, Location, Severity};
pub use report::{FileOutcome, FileReport, Report, ReportSummary, REPORT_FORMAT};
pub use slice::{MappingSlice, RawSpan, SliceKind, SpanKind};
pub use templated_file::{check_slices, TemplatedFile, TemplatedFileError};
