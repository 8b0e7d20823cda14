use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::{ColoredString, Colorize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walkdir::WalkDir;

use sqlslice_core::{Config, Diagnostic, FileReport, Report, Severity, SliceKind, TemplaterKind};
use sqlslice_templater::{
    templater_from_config, templater_with_cache, EnvironmentCache, RenderError, Templater,
};

/// SQLSlice - map rendered SQL back to its template
#[derive(Parser)]
#[command(name = "sqlslice")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: sqlslice.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Templater to use instead of the configured one (raw, python, jinja, placeholder)
    #[arg(short, long, global = true)]
    templater: Option<TemplaterKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the rendered SQL of a file
    Render {
        /// Template file
        file: PathBuf,
    },

    /// Show the mapping between a template and its rendered SQL
    Slices {
        /// Template file
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Render every file and report failures and undefined names
    Check {
        /// Files or directories (directories are searched for .sql files)
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,

        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(templater) = cli.templater {
        config.templater = templater;
    }
    tracing::debug!(
        templater = %config.templater,
        root = %config.project_root.display(),
        "loaded configuration"
    );

    match cli.command {
        Commands::Render { file } => render_command(&config, &file),
        Commands::Slices { file, format } => slices_command(&config, &file, format),
        Commands::Check { paths, output } => check_command(&config, &paths, &output, cli.verbose),
    }
}

/// Log to stderr; `RUST_LOG` wins over `--verbose`
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None if Path::new("sqlslice.toml").exists() => Config::from_file(Path::new("sqlslice.toml"))?,
        None => {
            tracing::debug!("no config file found, using defaults");
            Config::default()
        }
    };
    Ok(config)
}

fn read_template(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

/// Render command - print the rendered SQL
fn render_command(config: &Config, file: &Path) -> Result<()> {
    let raw = read_template(file)?;
    let name = file.display().to_string();

    let result = templater_from_config(config)?
        .process(&raw, Some(&name))
        .map_err(|e| anyhow::anyhow!("{}", format_diagnostic(&e.to_diagnostic(&name))))?;

    for diag in &result.diagnostics {
        eprintln!("{}", format_diagnostic(diag));
    }
    print!("{}", result.templated_file.rendered_str());
    Ok(())
}

/// Slices command - print the raw-to-rendered mapping
fn slices_command(config: &Config, file: &Path, format: OutputFormat) -> Result<()> {
    let raw = read_template(file)?;
    let name = file.display().to_string();

    let result = templater_from_config(config)?
        .process(&raw, Some(&name))
        .map_err(|e| anyhow::anyhow!("{}", format_diagnostic(&e.to_diagnostic(&name))))?;
    let templated = &result.templated_file;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "file": name,
                "degraded": result.degraded,
                "undefined": result.undefined.iter().collect::<Vec<_>>(),
                "raw_spans": templated.raw_spans(),
                "slices": templated.slices(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            for slice in templated.slices() {
                let source = &templated.source_str()[slice.source_range.clone()];
                let rendered = &templated.rendered_str()[slice.rendered_range.clone()];
                println!(
                    "{:<24} {:>14} -> {:<14} {:?} => {:?}",
                    colorize_kind(slice.kind),
                    format!("[{}:{}]", slice.source_range.start, slice.source_range.end),
                    format!("[{}:{}]", slice.rendered_range.start, slice.rendered_range.end),
                    source,
                    rendered
                );
            }
            if result.degraded {
                eprintln!("{}", "Alignment fell back to character level".yellow());
            }
            if !result.undefined.is_empty() {
                let names: Vec<&str> = result.undefined.iter().collect();
                eprintln!("{} {}", "Undefined:".yellow(), names.join(", "));
            }
        }
    }
    Ok(())
}

fn colorize_kind(kind: SliceKind) -> ColoredString {
    match kind {
        SliceKind::Literal => kind.as_str().green(),
        SliceKind::Templated => kind.as_str().cyan(),
        SliceKind::BlockStart | SliceKind::BlockMid | SliceKind::BlockEnd => kind.as_str().yellow(),
        SliceKind::Escaped => kind.as_str().magenta(),
        SliceKind::Comment => kind.as_str().dimmed(),
    }
}

/// Check command - render every file and write a report
fn check_command(config: &Config, paths: &[PathBuf], output: &Path, verbose: bool) -> Result<()> {
    let files = discover_files(config, paths);
    if verbose {
        eprintln!("{} {} files", "Checking".cyan(), files.len());
    }

    let report = check_files(config, &files)?;
    report
        .write_json(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    if verbose {
        eprintln!("{} {}", "Report saved to:".green(), output.display());
    }

    print_report_summary(&report);

    // Exit with error code if there are errors
    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

/// Expand directories into their non-excluded .sql files
fn discover_files(config: &Config, paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }

        for entry in WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() || entry.path().extension() != Some(OsStr::new("sql")) {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&config.project_root)
                .unwrap_or(entry.path());
            if config.is_excluded(&relative.display().to_string()) {
                tracing::debug!(path = %relative.display(), "skipping excluded file");
                continue;
            }
            files.push(entry.path().to_path_buf());
        }
    }

    files
}

/// Process every file into one report
fn check_files(config: &Config, files: &[PathBuf]) -> Result<Report> {
    let cache = EnvironmentCache::new();
    let templater: Box<dyn Templater> = templater_with_cache(config, &cache)?;
    let mut report = Report::new(templater.name());

    for file in files {
        report.push(check_file(templater.as_ref(), file));
    }

    Ok(report)
}

fn check_file(templater: &dyn Templater, file: &Path) -> FileReport {
    let name = file.display().to_string();

    let raw = match std::fs::read_to_string(file) {
        Ok(raw) => raw,
        Err(e) => return FileReport::failed(&name, RenderError::from(e).to_diagnostic(&name)),
    };

    match templater.process(&raw, Some(&name)) {
        Ok(result) => {
            let slices = result.templated_file.slices().len();
            tracing::debug!(file = %name, slices, degraded = result.degraded, "processed");
            FileReport::rendered(&name, slices, result.degraded)
                .with_undefined(result.undefined)
                .with_diagnostics(result.diagnostics)
        }
        Err(e) => FileReport::failed(&name, e.to_diagnostic(&name)),
    }
}

fn format_diagnostic(diag: &Diagnostic) -> String {
    let severity = match diag.severity {
        Severity::Error => "ERROR".red().bold(),
        Severity::Warn => "WARN".yellow().bold(),
        Severity::Info => "INFO".cyan(),
    };
    match &diag.location {
        Some(location) => format!("[{}] {}: {} ({})", severity, diag.code, diag.message, location),
        None => format!("[{}] {}: {}", severity, diag.code, diag.message),
    }
}

fn print_report_summary(report: &Report) {
    let summary = &report.summary;

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Template Check Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Templater: {}", report.templater);
    println!("Generated: {}", report.generated_at.to_rfc3339());
    println!();

    println!("{}", "Summary:".bold());
    println!("  Files:    {}", summary.files);
    println!("  Aligned:  {}", summary.aligned.to_string().green());
    if summary.degraded > 0 {
        println!("  Degraded: {}", summary.degraded.to_string().yellow());
    }
    if summary.failed > 0 {
        println!("  Failed:   {}", summary.failed.to_string().red().bold());
    }
    println!("  Undefined names: {}", summary.undefined);

    if summary.errors > 0 {
        println!("  Errors:   {}", summary.errors.to_string().red().bold());
    } else {
        println!("  Errors:   {}", summary.errors.to_string().green());
    }

    if summary.warnings > 0 {
        println!("  Warnings: {}", summary.warnings.to_string().yellow());
    } else {
        println!("  Warnings: {}", summary.warnings.to_string().green());
    }
    println!();

    let mut diagnostics = report.diagnostics().peekable();
    if diagnostics.peek().is_none() {
        println!("{}", "✓ No issues found!".green().bold());
    } else {
        println!("{}", "Diagnostics:".bold());
        for (_, diag) in diagnostics {
            println!("  {}", format_diagnostic(diag));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlslice_core::{DiagnosticCode, FileOutcome};
    use std::fs;

    fn project() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("models/staging")).unwrap();
        fs::write(
            dir.path().join("models/orders.sql"),
            "select * from {{ ref('stg_orders') }}\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("models/staging/stg_orders.sql"),
            "select {{ missing }} from raw.orders\n",
        )
        .unwrap();
        fs::write(dir.path().join("models/broken.sql"), "select {{ a\n").unwrap();
        fs::write(dir.path().join("models/notes.md"), "{{ not sql }}").unwrap();

        let mut config = Config::default();
        config.project_root = dir.path().to_path_buf();
        (dir, config)
    }

    #[test]
    fn discovers_sql_files_in_order() {
        let (dir, config) = project();
        let files = discover_files(&config, &[dir.path().join("models")]);

        let names: Vec<String> = files
            .iter()
            .map(|f| f.strip_prefix(dir.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["models/broken.sql", "models/orders.sql", "models/staging/stg_orders.sql"]
        );
    }

    #[test]
    fn excluded_files_are_skipped() {
        let (dir, mut config) = project();
        config.exclude = vec!["models/staging/*".to_string()];

        let files = discover_files(&config, &[dir.path().join("models")]);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| !f.ends_with("stg_orders.sql")));
    }

    #[test]
    fn check_reports_failures_and_undefined_names() {
        let (dir, config) = project();
        let files = discover_files(&config, &[dir.path().join("models")]);
        let report = check_files(&config, &files).unwrap();

        assert_eq!(report.templater, "jinja");
        assert_eq!(report.summary.files, 3);
        assert_eq!(report.summary.aligned, 2);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.undefined, 1);
        assert_eq!(report.summary.errors, 1);
        assert_eq!(report.summary.warnings, 1);
        assert!(report.has_errors());

        let outcomes: Vec<FileOutcome> = report.files.iter().map(|f| f.outcome).collect();
        assert_eq!(
            outcomes,
            vec![FileOutcome::Failed, FileOutcome::Aligned, FileOutcome::Aligned]
        );
        assert_eq!(report.files[2].undefined, vec!["missing".to_string()]);

        let codes: Vec<DiagnosticCode> = report.diagnostics().map(|(_, d)| d.code).collect();
        assert_eq!(
            codes,
            vec![DiagnosticCode::TemplateSyntaxError, DiagnosticCode::TemplateUndefinedVariable]
        );
    }

    #[test]
    fn missing_files_are_read_errors() {
        let (dir, config) = project();
        let report = check_files(&config, &[dir.path().join("models/nope.sql")]).unwrap();

        assert_eq!(report.summary.failed, 1);
        let diag = &report.files[0].diagnostics[0];
        assert_eq!(diag.code, DiagnosticCode::FileReadError);
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.location.as_ref().and_then(|l| l.line), None);
    }

    #[test]
    fn raw_templater_never_fails() {
        let (dir, mut config) = project();
        config.templater = TemplaterKind::Raw;
        let files = discover_files(&config, &[dir.path().join("models")]);
        let report = check_files(&config, &files).unwrap();

        assert_eq!(report.templater, "raw");
        assert_eq!(report.summary.aligned, 3);
        assert!(!report.has_errors());
        assert!(report.files.iter().all(|f| f.slices == 1));
    }

    #[test]
    fn placeholder_check_needs_a_style() {
        let (dir, mut config) = project();
        config.templater = TemplaterKind::Placeholder;
        let files = discover_files(&config, &[dir.path().join("models")]);

        let err = check_files(&config, &files).unwrap_err();
        assert!(err.to_string().contains("No param_regex nor param_style"));

        fs::write(dir.path().join("models/by_id.sql"), "select * from t where id = :id\n").unwrap();
        config.placeholder.param_style = Some("colon".to_string());
        let report = check_files(&config, &[dir.path().join("models/by_id.sql")]).unwrap();

        assert_eq!(report.templater, "placeholder");
        assert_eq!(report.summary.aligned, 1);
        assert_eq!(report.files[0].slices, 3);
    }

    #[test]
    fn cli_arguments_parse() {
        let cli = Cli::try_parse_from(["sqlslice", "--templater", "python", "slices", "q.sql", "--format", "json"])
            .unwrap();
        assert_eq!(cli.templater, Some(TemplaterKind::Python));
        match cli.command {
            Commands::Slices { file, format } => {
                assert_eq!(file, PathBuf::from("q.sql"));
                assert_eq!(format, OutputFormat::Json);
            }
            _ => panic!("expected slices command"),
        }
    }
}
