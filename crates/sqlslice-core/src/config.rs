//! Configuration schema (sqlslice.toml)

use crate::diagnostic::{DiagnosticCode, Severity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Which templating engine renders the raw files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplaterKind {
    /// No templating: the file renders to itself
    Raw,

    /// Python-style `{field}` format strings
    Python,

    /// Jinja templates
    #[default]
    Jinja,

    /// Bind parameters such as `:name`, `?` or `%(name)s`
    Placeholder,
}

impl TemplaterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Python => "python",
            Self::Jinja => "jinja",
            Self::Placeholder => "placeholder",
        }
    }
}

impl std::str::FromStr for TemplaterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" | "none" => Ok(Self::Raw),
            "python" => Ok(Self::Python),
            "jinja" => Ok(Self::Jinja),
            "placeholder" => Ok(Self::Placeholder),
            other => Err(ConfigError::ParseError(format!("unknown templater '{}'", other))),
        }
    }
}

impl std::fmt::Display for TemplaterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity threshold overrides for specific diagnostic codes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeverityThreshold {
    /// Map of diagnostic code to severity override
    pub overrides: HashMap<String, Severity>,
}

impl SeverityThreshold {
    /// Get severity for a diagnostic code, or default
    pub fn get_severity(&self, code: DiagnosticCode, default: Severity) -> Severity {
        self.overrides
            .get(code.as_str())
            .copied()
            .unwrap_or(default)
    }

    /// Set severity override for a code
    pub fn set_override(&mut self, code: DiagnosticCode, severity: Severity) {
        self.overrides.insert(code.as_str().to_string(), severity);
    }
}

/// `[placeholder]` table: how bind parameters are found and what replaces them
///
/// Exactly one of `param_style` and `param_regex` must be set. Every other key
/// is a sample value; positional parameters are keyed `1`, `2`, ...
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaceholderConfig {
    /// Name of a built-in style (`colon`, `question_mark`, `pyformat`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_style: Option<String>,

    /// Custom pattern; a `param_name` group names the parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_regex: Option<String>,

    #[serde(flatten)]
    pub values: BTreeMap<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Templating engine
    #[serde(default)]
    pub templater: TemplaterKind,

    /// Render missing names as deterministic stand-ins instead of recording them
    #[serde(default)]
    pub ignore_templating: bool,

    /// Register the dbt builtins (ref, source, var, config, is_incremental, this)
    #[serde(default = "default_true")]
    pub apply_dbt_builtins: bool,

    /// Keep the final newline of a template when rendering
    #[serde(default = "default_true")]
    pub keep_trailing_newline: bool,

    /// Values available to templates by name
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,

    /// dbt project variables, read through `var()`
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,

    /// Bind parameter settings for the placeholder templater
    #[serde(default)]
    pub placeholder: PlaceholderConfig,

    /// Files to skip when walking directories (glob patterns)
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Severity thresholds
    #[serde(default)]
    pub severity: SeverityThreshold,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: std::path::PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            templater: TemplaterKind::default(),
            ignore_templating: false,
            apply_dbt_builtins: true,
            keep_trailing_newline: true,
            context: BTreeMap::new(),
            vars: BTreeMap::new(),
            placeholder: PlaceholderConfig::default(),
            exclude: Vec::new(),
            severity: SeverityThreshold::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.project_root = std::env::current_dir().unwrap_or_default();
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Check if a path matches any exclude pattern
    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclude.iter().any(|pattern| glob_match(pattern, path))
    }
}

/// Simple glob matching (supports a single * wildcard)
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }

    if let Some(star_pos) = pattern.find('*') {
        let prefix = &pattern[..star_pos];
        let suffix = pattern[star_pos + 1..].trim_start_matches('*');

        text.len() >= prefix.len() + suffix.len()
            && text.starts_with(prefix)
            && text.ends_with(suffix)
    } else {
        pattern == text
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
