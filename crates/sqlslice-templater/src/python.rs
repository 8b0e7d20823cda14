//! Python format-string templater
//!
//! Renders `{field[!conversion][:spec]}` replacement fields from the context.
//! Field names follow `name(.attr|[key])*`. Missing names render through a
//! [`Sentinel`](sqlslice_align::Sentinel) instead of failing.

use crate::value::TemplateValue;
use crate::{line_of, ProcessResult, Templater, TemplaterError};
use regex::Regex;
use sqlslice_align::{lex, slice_file, RenderError, Sentinel, Syntax, UndefinedSet, UndefinedTracker};
use sqlslice_core::{Config, SeverityThreshold, SpanKind};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static FORMAT_SPEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?P<fill>.)?(?P<align>[<>^=]))?(?P<sign>[+\- ])?(?P<zero>0)?(?P<width>\d+)?(?P<grouping>[,_])?(?:\.(?P<precision>\d+))?(?P<kind>[bcdeEfFosxX%])?$",
    )
    .expect("valid regex")
});

/// Templater for Python `str.format` style templates
#[derive(Debug, Clone, Default)]
pub struct PythonTemplater {
    context: BTreeMap<String, serde_json::Value>,
    ignore_templating: bool,
    severity: SeverityThreshold,
}

impl PythonTemplater {
    pub fn new(context: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            context: config.context.clone(),
            ignore_templating: config.ignore_templating,
            severity: config.severity.clone(),
        }
    }

    /// Render missing names as stand-ins instead of recording them
    pub fn ignore_templating(mut self, ignore: bool) -> Self {
        self.ignore_templating = ignore;
        self
    }

    /// Render `raw`, recording missing names into `undefined`
    pub fn render(&self, raw: &str, undefined: &mut UndefinedSet) -> Result<String, RenderError> {
        let tracker = UndefinedTracker::new();
        let mut out = String::with_capacity(raw.len());

        for span in lex(raw, Syntax::PythonFormat) {
            match span.kind {
                SpanKind::TemplatedExpr => {
                    let field = &span.text[1..span.len() - 1];
                    let text = self
                        .render_field(field, &tracker)
                        .map_err(|message| RenderError::Render {
                            message,
                            line: Some(line_of(raw, span.source_offset)),
                        })?;
                    out.push_str(&text);
                }
                SpanKind::Escaped => out.push_str(&span.text[..1]),
                _ => {
                    if let Some(at) = span.text.find(['{', '}']) {
                        let brace = &span.text[at..at + 1];
                        return Err(RenderError::Syntax {
                            message: format!("Single '{}' encountered in format string", brace),
                            line: Some(line_of(raw, span.source_offset + at)),
                        });
                    }
                    out.push_str(&span.text);
                }
            }
        }

        tracker.drain_into(undefined);
        Ok(out)
    }

    fn render_field(&self, field: &str, tracker: &UndefinedTracker) -> Result<String, String> {
        let parsed = parse_field(field)?;

        let mut value = self.lookup(parsed.root, tracker);
        let mut path = parsed.root.to_string();
        for accessor in parsed.accessors {
            value = match accessor {
                Accessor::Attr(attr) => {
                    path = format!("{}.{}", path, attr);
                    value.get_attribute(attr)
                }
                Accessor::Item(key) => {
                    path = format!("{}[{}]", path, key);
                    value.get_item(key)
                }
            }
            .ok_or_else(|| format!("'{}' is not defined", path))?;
        }

        let value = match parsed.conversion {
            None | Some('s') => value,
            Some('r') | Some('a') => TemplateValue::Value(serde_json::Value::String(value.to_repr())),
            Some(other) => return Err(format!("Unknown conversion specifier {}", other)),
        };

        let spec = self.expand_nested(parsed.spec, tracker)?;
        apply_spec(&value, &spec)
    }

    fn lookup(&self, name: &str, tracker: &UndefinedTracker) -> TemplateValue {
        match self.context.get(name) {
            Some(value) => TemplateValue::Value(value.clone()),
            None if self.ignore_templating => TemplateValue::Sentinel(Sentinel::stand_in(name)),
            None => TemplateValue::Sentinel(tracker.sentinel(name)),
        }
    }

    /// Substitute `{name}` fields nested inside a format spec
    fn expand_nested(&self, spec: &str, tracker: &UndefinedTracker) -> Result<String, String> {
        let mut out = String::with_capacity(spec.len());
        let mut rest = spec;
        while let Some(open) = rest.find('{') {
            let close = rest[open..]
                .find('}')
                .map(|rel| open + rel)
                .ok_or_else(|| format!("Unmatched '{{' in format spec '{}'", spec))?;
            out.push_str(&rest[..open]);
            out.push_str(&self.render_field(&rest[open + 1..close], tracker)?);
            rest = &rest[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl Templater for PythonTemplater {
    fn name(&self) -> &'static str {
        "python"
    }

    fn process(&self, raw: &str, path: Option<&str>) -> Result<ProcessResult, TemplaterError> {
        let alignment = slice_file(raw, Syntax::PythonFormat, |raw, undefined| {
            self.render(raw, undefined)
        })?;
        ProcessResult::from_alignment(alignment, path, &self.severity)
    }
}

#[derive(Debug, PartialEq)]
enum Accessor<'a> {
    Attr(&'a str),
    Item(&'a str),
}

#[derive(Debug, PartialEq)]
struct Field<'a> {
    root: &'a str,
    accessors: Vec<Accessor<'a>>,
    conversion: Option<char>,
    spec: &'a str,
}

fn parse_field(field: &str) -> Result<Field<'_>, String> {
    let bytes = field.as_bytes();
    let mut i = 0;
    while i < bytes.len() && !matches!(bytes[i], b'.' | b'[' | b'!' | b':') {
        i += 1;
    }
    let root = &field[..i];

    let mut accessors = Vec::new();
    while i < bytes.len() {
        match bytes[i] {
            b'.' => {
                let start = i + 1;
                i = start;
                while i < bytes.len() && !matches!(bytes[i], b'.' | b'[' | b'!' | b':') {
                    i += 1;
                }
                if i == start {
                    return Err(format!("Empty attribute in format string '{}'", field));
                }
                accessors.push(Accessor::Attr(&field[start..i]));
            }
            b'[' => {
                let start = i + 1;
                let close = field[start..]
                    .find(']')
                    .map(|rel| start + rel)
                    .ok_or_else(|| format!("Missing ']' in format string '{}'", field))?;
                accessors.push(Accessor::Item(&field[start..close]));
                i = close + 1;
            }
            _ => break,
        }
    }

    let mut conversion = None;
    if bytes.get(i) == Some(&b'!') {
        conversion = field[i + 1..].chars().next();
        i += 1 + conversion.map_or(0, char::len_utf8);
    }

    let spec = match bytes.get(i) {
        Some(b':') => &field[i + 1..],
        None => "",
        Some(_) => return Err(format!("Expected ':' after conversion specifier in '{}'", field)),
    };

    Ok(Field {
        root,
        accessors,
        conversion,
        spec,
    })
}

/// Format `value` according to a Python format spec
fn apply_spec(value: &TemplateValue, spec: &str) -> Result<String, String> {
    if spec.is_empty() {
        return Ok(value.to_text());
    }
    let caps = FORMAT_SPEC
        .captures(spec)
        .ok_or_else(|| format!("Invalid format specifier '{}'", spec))?;

    let kind = caps.name("kind").and_then(|m| m.as_str().chars().next());
    let precision: Option<usize> = caps.name("precision").and_then(|m| m.as_str().parse().ok());
    let width: usize = caps
        .name("width")
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    let grouping = caps.name("grouping").map(|m| m.as_str());
    let zero = caps.name("zero").is_some();

    let numeric = value.is_number();
    let body = match (kind, value) {
        (_, TemplateValue::Sentinel(sentinel)) => sentinel.to_text(),
        (None | Some('s'), _) => {
            let text = value.to_text();
            match precision {
                Some(p) if !numeric => text.chars().take(p).collect(),
                _ => text,
            }
        }
        (Some(kind), _) => format_number(value, kind, precision, grouping)?,
    };

    let (sign, digits) = match body.strip_prefix('-') {
        Some(rest) if numeric => ("-", rest.to_string()),
        _ => {
            let sign = match caps.name("sign").map(|m| m.as_str()) {
                Some("+") if numeric => "+",
                Some(" ") if numeric => " ",
                _ => "",
            };
            (sign, body)
        }
    };

    let fill = caps
        .name("fill")
        .and_then(|m| m.as_str().chars().next())
        .unwrap_or(if zero { '0' } else { ' ' });
    let align = caps
        .name("align")
        .map(|m| m.as_str())
        .unwrap_or(if zero { "=" } else if numeric { ">" } else { "<" });

    Ok(pad(sign, &digits, fill, align, width))
}

fn format_number(
    value: &TemplateValue,
    kind: char,
    precision: Option<usize>,
    grouping: Option<&str>,
) -> Result<String, String> {
    let unknown = || {
        format!(
            "Unknown format code '{}' for value '{}'",
            kind,
            value.to_text()
        )
    };

    let text = match kind {
        'f' | 'F' => {
            let x = value.as_f64().ok_or_else(unknown)?;
            group(&format!("{:.*}", precision.unwrap_or(6), x), grouping)
        }
        '%' => {
            let x = value.as_f64().ok_or_else(unknown)?;
            format!("{}%", group(&format!("{:.*}", precision.unwrap_or(6), x * 100.0), grouping))
        }
        'e' | 'E' => {
            let x = value.as_f64().ok_or_else(unknown)?;
            let text = python_exponent(&format!("{:.*e}", precision.unwrap_or(6), x));
            if kind == 'E' {
                text.to_uppercase()
            } else {
                text
            }
        }
        'd' => group(&value.as_i64().ok_or_else(unknown)?.to_string(), grouping),
        'x' => format!("{:x}", value.as_i64().ok_or_else(unknown)?),
        'X' => format!("{:X}", value.as_i64().ok_or_else(unknown)?),
        'o' => format!("{:o}", value.as_i64().ok_or_else(unknown)?),
        'b' => format!("{:b}", value.as_i64().ok_or_else(unknown)?),
        'c' => value
            .as_i64()
            .and_then(|code| u32::try_from(code).ok())
            .and_then(char::from_u32)
            .map(String::from)
            .ok_or_else(unknown)?,
        _ => return Err(unknown()),
    };
    Ok(text)
}

/// `1.5e2` -> `1.5e+02`
fn python_exponent(text: &str) -> String {
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => text.to_string(),
    }
}

/// Insert a thousands separator into the integer part
fn group(number: &str, separator: Option<&str>) -> String {
    let Some(separator) = separator else {
        return number.to_string();
    };
    let (sign, unsigned) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let (int, frac) = match unsigned.find('.') {
        Some(dot) => unsigned.split_at(dot),
        None => (unsigned, ""),
    };

    let mut grouped = String::with_capacity(int.len() + int.len() / 3);
    for (idx, ch) in int.chars().enumerate() {
        if idx > 0 && (int.len() - idx) % 3 == 0 {
            grouped.push_str(separator);
        }
        grouped.push(ch);
    }
    format!("{}{}{}", sign, grouped, frac)
}

fn pad(sign: &str, body: &str, fill: char, align: &str, width: usize) -> String {
    let len = sign.chars().count() + body.chars().count();
    let missing = width.saturating_sub(len);
    let filler = |n: usize| fill.to_string().repeat(n);

    match align {
        "<" => format!("{}{}{}", sign, body, filler(missing)),
        "^" => {
            let left = missing / 2;
            format!("{}{}{}{}", filler(left), sign, body, filler(missing - left))
        }
        "=" => format!("{}{}{}", sign, filler(missing), body),
        _ => format!("{}{}{}", filler(missing), sign, body),
    }
}
