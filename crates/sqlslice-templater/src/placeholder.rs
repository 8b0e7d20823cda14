//! Bind-parameter templater
//!
//! Replaces driver placeholders (`:name`, `?`, `%(name)s`, `$1`, ...) with
//! sample values so a statement reads as plain SQL. Every parameter becomes
//! one templated slice and the text between parameters maps verbatim, so no
//! alignment search is needed.

use crate::{ProcessResult, Templater, TemplaterError};
use regex::{Captures, Regex};
use sqlslice_align::{Alignment, UndefinedSet};
use sqlslice_core::{Config, MappingSlice, RawSpan, SeverityThreshold, SliceKind, SpanKind};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Built-in parameter styles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// `WHERE bla = :name`
    Colon,
    /// `FROM table:name`, also matched right after a word
    ColonNospaces,
    /// `WHERE bla = :2`
    NumericColon,
    /// `WHERE bla = %(name)s`
    Pyformat,
    /// `WHERE bla = $name` or `${name}`
    Dollar,
    /// `USE ${flyway:database}.schema`
    FlywayVar,
    /// `WHERE bla = ?`
    QuestionMark,
    /// `WHERE bla = $3` or `${3}`
    NumericDollar,
    /// `WHERE bla = %s`
    Percent,
    /// `WHERE bla = &name`, `&{name}` or `MARK_&{ENV}`
    Ampersand,
}

impl ParamStyle {
    pub const ALL: [ParamStyle; 10] = [
        Self::Colon,
        Self::ColonNospaces,
        Self::NumericColon,
        Self::Pyformat,
        Self::Dollar,
        Self::FlywayVar,
        Self::QuestionMark,
        Self::NumericDollar,
        Self::Percent,
        Self::Ampersand,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Colon => "colon",
            Self::ColonNospaces => "colon_nospaces",
            Self::NumericColon => "numeric_colon",
            Self::Pyformat => "pyformat",
            Self::Dollar => "dollar",
            Self::FlywayVar => "flyway_var",
            Self::QuestionMark => "question_mark",
            Self::NumericDollar => "numeric_dollar",
            Self::Percent => "percent",
            Self::Ampersand => "ampersand",
        }
    }

    fn pattern(&self) -> &'static str {
        match self {
            Self::Colon | Self::ColonNospaces => r":(?P<param_name>\w+)",
            Self::NumericColon => r":(?P<param_name>\d+)",
            Self::Pyformat => r"%\((?P<param_name>\w+)\)s",
            Self::Dollar => r"\$\{?(?P<param_name>\w+)\}?",
            Self::FlywayVar => r"\$\{(?P<param_name>\w+[:\w]+)\}",
            Self::QuestionMark => r"\?",
            Self::NumericDollar => r"\$\{?(?P<param_name>\d+)\}?",
            Self::Percent => "%s",
            Self::Ampersand => r"&\{?(?P<param_name>\w+)\}?",
        }
    }

    fn regex(&self) -> &'static Regex {
        &STYLE_REGEXES[*self as usize]
    }

    /// Whether a match directly after `c` is ignored
    fn rejects_before(&self, c: char) -> bool {
        match self {
            Self::ColonNospaces => c == ':',
            Self::FlywayVar => false,
            Self::Ampersand => c == '&',
            _ => c == ':' || c == '\\' || is_word(c),
        }
    }

    /// Whether a match directly before `c` is ignored
    fn rejects_after(&self, c: char) -> bool {
        *self == Self::Colon && c == ':'
    }
}

impl std::str::FromStr for ParamStyle {
    type Err = TemplaterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|style| style.as_str() == s)
            .ok_or_else(|| {
                TemplaterError::Config(format!(
                    "Unknown param_style '{}' for templater 'placeholder'",
                    s
                ))
            })
    }
}

impl std::fmt::Display for ParamStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static STYLE_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ParamStyle::ALL
        .iter()
        .map(|style| Regex::new(style.pattern()).expect("valid regex"))
        .collect()
});

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[derive(Debug, Clone)]
enum Pattern {
    Style(ParamStyle),
    Custom(Regex),
}

impl Pattern {
    fn regex(&self) -> &Regex {
        match self {
            Self::Style(style) => style.regex(),
            Self::Custom(regex) => regex,
        }
    }

    /// Non-overlapping parameter matches, leftmost first
    fn captures<'t>(&self, raw: &'t str) -> Vec<Captures<'t>> {
        let regex = self.regex();
        let mut found = Vec::new();
        let mut at = 0;

        while let Some(caps) = regex.captures_at(raw, at) {
            let Some(whole) = caps.get(0) else { break };
            let accepted = !whole.is_empty()
                && match self {
                    Self::Style(style) => {
                        let before = raw[..whole.start()].chars().next_back();
                        let after = raw[whole.end()..].chars().next();
                        !before.is_some_and(|c| style.rejects_before(c))
                            && !after.is_some_and(|c| style.rejects_after(c))
                    }
                    Self::Custom(_) => true,
                };

            if accepted {
                at = whole.end();
                found.push(caps);
            } else {
                // retry one character further on
                match raw[whole.start()..].chars().next() {
                    Some(c) => at = whole.start() + c.len_utf8(),
                    None => break,
                }
            }
        }

        found
    }
}

/// Templater for SQL written against a driver's bind-parameter syntax
#[derive(Debug, Clone)]
pub struct PlaceholderTemplater {
    pattern: Pattern,
    values: BTreeMap<String, serde_json::Value>,
    severity: SeverityThreshold,
}

impl PlaceholderTemplater {
    /// Templater for one of the built-in styles
    pub fn new(style: ParamStyle) -> Self {
        Self {
            pattern: Pattern::Style(style),
            values: BTreeMap::new(),
            severity: SeverityThreshold::default(),
        }
    }

    /// Templater for a custom pattern. A `param_name` group names each
    /// parameter; without one, parameters are numbered from 1.
    pub fn with_regex(pattern: &str) -> Result<Self, TemplaterError> {
        let regex = Regex::new(pattern)
            .map_err(|e| TemplaterError::Config(format!("Invalid regex for param_regex: {}", e)))?;
        Ok(Self {
            pattern: Pattern::Custom(regex),
            values: BTreeMap::new(),
            severity: SeverityThreshold::default(),
        })
    }

    /// Build from the `[placeholder]` table of `config`
    pub fn from_config(config: &Config) -> Result<Self, TemplaterError> {
        let settings = &config.placeholder;
        let templater = match (&settings.param_regex, &settings.param_style) {
            (Some(_), Some(_)) => {
                return Err(TemplaterError::Config(
                    "Both param_regex and param_style were provided to the placeholder templater"
                        .to_string(),
                ))
            }
            (None, None) => {
                return Err(TemplaterError::Config(
                    "No param_regex nor param_style was provided to the placeholder templater"
                        .to_string(),
                ))
            }
            (Some(pattern), None) => Self::with_regex(pattern)?,
            (None, Some(style)) => Self::new(style.parse()?),
        };

        Ok(templater
            .with_values(settings.values.clone())
            .with_severity(config.severity.clone()))
    }

    /// Sample values by parameter name
    pub fn with_values(mut self, values: BTreeMap<String, serde_json::Value>) -> Self {
        self.values = values;
        self
    }

    pub fn with_severity(mut self, severity: SeverityThreshold) -> Self {
        self.severity = severity;
        self
    }

    /// Text substituted for the parameter `name`; the name itself when no
    /// sample value is configured
    fn replacement(&self, name: &str) -> Result<String, TemplaterError> {
        match self.values.get(name) {
            None => Ok(name.to_string()),
            Some(serde_json::Value::String(text)) => Ok(text.clone()),
            Some(serde_json::Value::Number(number)) => Ok(number.to_string()),
            Some(serde_json::Value::Bool(flag)) => Ok(flag.to_string()),
            Some(_) => Err(TemplaterError::Config(format!(
                "Invalid value for parameter replacement: {}",
                name
            ))),
        }
    }

    /// Substitute every parameter, returning the alignment between the two texts
    pub fn substitute(&self, raw: &str) -> Result<Alignment, TemplaterError> {
        let mut rendered = String::with_capacity(raw.len());
        let mut raw_spans = Vec::new();
        let mut slices = Vec::new();
        let mut last = 0;
        let mut position = 0;

        let literal = |range: std::ops::Range<usize>,
                           rendered: &mut String,
                           raw_spans: &mut Vec<RawSpan>,
                           slices: &mut Vec<MappingSlice>| {
            if range.is_empty() {
                return;
            }
            let start = rendered.len();
            rendered.push_str(&raw[range.clone()]);
            raw_spans.push(RawSpan::new(&raw[range.clone()], SpanKind::Literal, range.start));
            slices.push(MappingSlice::new(SliceKind::Literal, range, start..rendered.len()));
        };

        for caps in self.pattern.captures(raw) {
            let Some(whole) = caps.get(0) else { continue };
            let name = match caps.name("param_name") {
                Some(name) => name.as_str().to_string(),
                None => {
                    position += 1;
                    position.to_string()
                }
            };

            literal(last..whole.start(), &mut rendered, &mut raw_spans, &mut slices);

            let start = rendered.len();
            rendered.push_str(&self.replacement(&name)?);
            raw_spans.push(RawSpan::new(whole.as_str(), SpanKind::TemplatedExpr, whole.start()));
            slices.push(MappingSlice::new(
                SliceKind::Templated,
                whole.range(),
                start..rendered.len(),
            ));
            last = whole.end();
        }
        literal(last..raw.len(), &mut rendered, &mut raw_spans, &mut slices);

        let parameters = raw_spans.iter().filter(|s| s.kind == SpanKind::TemplatedExpr).count();
        tracing::debug!(parameters, "substituted placeholders");

        Ok(Alignment {
            source: raw.to_string(),
            rendered,
            raw_spans,
            slices,
            undefined: UndefinedSet::new(),
            degraded: false,
        })
    }
}

impl Templater for PlaceholderTemplater {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn process(&self, raw: &str, path: Option<&str>) -> Result<ProcessResult, TemplaterError> {
        let alignment = self.substitute(raw)?;
        ProcessResult::from_alignment(alignment, path, &self.severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn render(style: ParamStyle, raw: &str, values: &[(&str, serde_json::Value)]) -> String {
        let values = values
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        PlaceholderTemplater::new(style)
            .with_values(values)
            .process(raw, None)
            .unwrap()
            .templated_file
            .rendered_str()
            .to_string()
    }

    fn configured(toml: &str) -> Result<PlaceholderTemplater, TemplaterError> {
        PlaceholderTemplater::from_config(&Config::from_toml(toml).unwrap())
    }

    #[test]
    fn text_without_parameters_is_untouched() {
        let raw = "SELECT * FROM {{blah}} WHERE %(gnepr)s OR e~':'";
        assert_eq!(render(ParamStyle::Colon, raw, &[]), raw);
    }

    #[test]
    fn colon_parameters() {
        let raw = "WHERE userid = :user_id AND date > :start_date";
        let out = render(
            ParamStyle::Colon,
            raw,
            &[("user_id", json!(42)), ("start_date", json!("'2020-01-01'"))],
        );
        assert_eq!(out, "WHERE userid = 42 AND date > '2020-01-01'");

        // names without a value render as themselves
        assert_eq!(render(ParamStyle::Colon, "IN :city_ids", &[]), "IN city_ids");
    }

    #[test]
    fn colon_skips_casts_and_words() {
        let raw = "SELECT joined::date, a:b, :x FROM t";
        assert_eq!(render(ParamStyle::Colon, raw, &[("x", json!(1))]), "SELECT joined::date, a:b, 1 FROM t");
    }

    #[test]
    fn colon_nospaces_follows_words() {
        let raw = "SELECT joined::date\nFROM users_date:table_suffix";
        let out = render(ParamStyle::ColonNospaces, raw, &[("table_suffix", json!(42))]);
        assert_eq!(out, "SELECT joined::date\nFROM users_date42");
    }

    #[test]
    fn positional_parameters_count_from_one() {
        let raw = "WHERE (city_id) IN ?\nAND date > ?";
        let out = render(
            ParamStyle::QuestionMark,
            raw,
            &[("1", json!("(1, 2, 3, 45)")), ("2", json!("'2020-10-01'"))],
        );
        assert_eq!(out, "WHERE (city_id) IN (1, 2, 3, 45)\nAND date > '2020-10-01'");

        assert_eq!(render(ParamStyle::Percent, "a = %s AND b = %s", &[]), "a = 1 AND b = 2");
    }

    #[test]
    fn named_styles() {
        assert_eq!(render(ParamStyle::NumericColon, "IN :1 AND :45", &[("45", json!("'x'"))]), "IN 1 AND 'x'");
        assert_eq!(
            render(
                ParamStyle::Pyformat,
                "flag = %(someflag)s LIMIT %(limit)s",
                &[("someflag", json!(false)), ("limit", json!(15))]
            ),
            "flag = false LIMIT 15"
        );
        assert_eq!(
            render(ParamStyle::Dollar, "IN $city_id OR d = ${date}", &[("date", json!("'d'"))]),
            "IN city_id OR d = 'd'"
        );
        assert_eq!(render(ParamStyle::NumericDollar, "IN $12 AND ${90}", &[]), "IN 12 AND 90");
    }

    #[test]
    fn ampersand_ignores_doubled_marks() {
        let raw = "USE DATABASE &{env}_MARKETING;\nUSE SCHEMA &&EMEA;\nWHERE id = &user_id";
        let out = render(ParamStyle::Ampersand, raw, &[("env", json!("PRD")), ("user_id", json!(42))]);
        assert_eq!(out, "USE DATABASE PRD_MARKETING;\nUSE SCHEMA &&EMEA;\nWHERE id = 42");
    }

    #[test]
    fn flyway_variables() {
        let raw = "SELECT metadata$filename, $1 FROM @stg_data_export_${env_name};";
        assert_eq!(
            render(ParamStyle::FlywayVar, raw, &[("env_name", json!("staging"))]),
            "SELECT metadata$filename, $1 FROM @stg_data_export_staging;"
        );
        assert_eq!(
            render(ParamStyle::FlywayVar, "USE ${flyway:database}.s;", &[]),
            "USE flyway:database.s;"
        );
    }

    #[test]
    fn slices_alternate_literal_and_templated() {
        let result = PlaceholderTemplater::new(ParamStyle::Colon)
            .with_values([("id".to_string(), json!(42))].into())
            .process("a = :id\n", Some("q.sql"))
            .unwrap();

        assert_eq!(
            result.templated_file.slices(),
            &[
                MappingSlice::new(SliceKind::Literal, 0..4, 0..4),
                MappingSlice::new(SliceKind::Templated, 4..7, 4..6),
                MappingSlice::new(SliceKind::Literal, 7..8, 6..7),
            ]
        );
        let kinds: Vec<SpanKind> = result.templated_file.raw_spans().iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SpanKind::Literal, SpanKind::TemplatedExpr, SpanKind::Literal]);
        assert!(!result.degraded);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn parameter_at_both_ends() {
        let result = PlaceholderTemplater::new(ParamStyle::QuestionMark)
            .process("?,?", None)
            .unwrap();
        assert_eq!(result.templated_file.rendered_str(), "1,2");
        assert_eq!(result.templated_file.slices().len(), 3);
    }

    #[test]
    fn custom_regex_from_config() {
        let templater = configured(
            r#"
templater = "placeholder"

[placeholder]
param_regex = '__(?P<param_name>[\w_]+)__'
my_name = "john"
"#,
        )
        .unwrap();
        let result = templater.process("SELECT bla FROM blob WHERE id = __my_name__", None).unwrap();
        assert_eq!(result.templated_file.rendered_str(), "SELECT bla FROM blob WHERE id = john");

        // no named group: numbered
        let templater = PlaceholderTemplater::with_regex("@@").unwrap();
        assert_eq!(templater.substitute("a @@ b @@").unwrap().rendered, "a 1 b 2");
    }

    #[test]
    fn style_and_regex_are_exclusive() {
        let both = configured("[placeholder]\nparam_regex = '__(?P<param_name>\\w+)__'\nparam_style = \"colon\"\n");
        assert!(both.unwrap_err().to_string().contains("Both param_regex and param_style"));

        let neither = configured("templater = \"placeholder\"\n");
        assert!(neither.unwrap_err().to_string().contains("No param_regex nor param_style"));
    }

    #[test]
    fn unknown_style_is_a_config_error() {
        let err = configured("[placeholder]\nparam_style = \"unknown\"\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid templater configuration: Unknown param_style 'unknown' for templater 'placeholder'"
        );
        assert_eq!(
            err.to_diagnostic("q.sql").code,
            sqlslice_core::DiagnosticCode::TemplaterConfigError
        );

        assert!(PlaceholderTemplater::with_regex("(").is_err());
    }

    #[test]
    fn structured_values_are_rejected() {
        let err = PlaceholderTemplater::new(ParamStyle::Colon)
            .with_values([("ids".to_string(), json!([1, 2]))].into())
            .process("IN :ids", None)
            .unwrap_err();
        assert!(err.to_string().contains("Invalid value for parameter replacement: ids"));
    }

    #[test]
    fn styles_parse_by_name() {
        for style in ParamStyle::ALL {
            assert_eq!(style.as_str().parse::<ParamStyle>().unwrap(), style);
        }
    }
}
