//! Raw lexer
//!
//! Splits raw template text into typed [`RawSpan`]s. The scan is purely
//! lexical: every byte lands in exactly one span, plain literal is the
//! default, and an unterminated delimiter leaves the rest of the text literal.

use regex::Regex;
use sqlslice_core::{RawSpan, SpanKind};
use std::ops::Range;
use std::sync::LazyLock;

/// Delimiter syntax of the raw template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Syntax {
    /// No delimiters: the whole text is one literal
    Plain,

    /// Python `str.format` fields: `{name}`, escaped `{{` and `}}`
    PythonFormat,

    /// Jinja: `{{ expr }}`, `{% tag %}`, `{# comment #}`
    #[default]
    Jinja,
}

static TAG_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{%[-+]?\s*([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"));

static END_RAW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{%[-+]?\s*endraw\s*[-+]?%\}").expect("valid regex"));

/// Lex `raw` into spans whose concatenation is exactly `raw`
pub fn lex(raw: &str, syntax: Syntax) -> Vec<RawSpan> {
    match syntax {
        Syntax::Plain => {
            let mut sink = SpanSink::new(raw);
            sink.push(0..raw.len(), SpanKind::Literal);
            sink.finish()
        }
        Syntax::PythonFormat => lex_python_format(raw),
        Syntax::Jinja => lex_jinja(raw),
    }
}

struct SpanSink<'a> {
    raw: &'a str,
    spans: Vec<RawSpan>,
}

impl<'a> SpanSink<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            raw,
            spans: Vec::new(),
        }
    }

    fn push(&mut self, range: Range<usize>, kind: SpanKind) {
        if range.is_empty() {
            return;
        }
        self.spans
            .push(RawSpan::new(&self.raw[range.clone()], kind, range.start));
    }

    fn finish(self) -> Vec<RawSpan> {
        self.spans
    }
}

fn lex_python_format(raw: &str) -> Vec<RawSpan> {
    let bytes = raw.as_bytes();
    let mut sink = SpanSink::new(raw);
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => {
                sink.push(literal_start..i, SpanKind::Literal);
                sink.push(i..i + 2, SpanKind::Escaped);
                i += 2;
                literal_start = i;
            }
            b'{' => {
                let Some(end) = matching_brace(bytes, i) else {
                    break;
                };
                sink.push(literal_start..i, SpanKind::Literal);
                sink.push(i..end, SpanKind::TemplatedExpr);
                i = end;
                literal_start = i;
            }
            _ => i += 1,
        }
    }

    sink.push(literal_start..raw.len(), SpanKind::Literal);
    sink.finish()
}

/// End (exclusive) of the replacement field opened at `open`; format specs may nest one level
fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, &b) in bytes[open..].iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Expression,
    Statement,
    Comment,
}

impl Tag {
    fn at(bytes: &[u8], open: usize) -> Option<Self> {
        match bytes.get(open + 1)? {
            b'{' => Some(Self::Expression),
            b'%' => Some(Self::Statement),
            b'#' => Some(Self::Comment),
            _ => None,
        }
    }

    fn close(&self) -> [u8; 2] {
        match self {
            Self::Expression => *b"}}",
            Self::Statement => *b"%}",
            Self::Comment => *b"#}",
        }
    }
}

/// Scanner state for the Jinja syntax
struct JinjaLexer<'a> {
    raw: &'a str,
    sink: SpanSink<'a>,
    literal_start: usize,
}

impl<'a> JinjaLexer<'a> {
    /// Emit the pending literal and the tag at `open..close`, moving
    /// whitespace removed by `-` markers into the tag span
    fn emit_tag(&mut self, open: usize, close: usize, kind: SpanKind) -> usize {
        let bytes = self.raw.as_bytes();

        let mut tag_start = open;
        if bytes.get(open + 2) == Some(&b'-') {
            let pending = &self.raw[self.literal_start..open];
            tag_start = self.literal_start + pending.trim_end().len();
        }

        let mut tag_end = close;
        if close >= open + 5 && bytes[close - 3] == b'-' {
            let following = &self.raw[close..];
            tag_end = close + (following.len() - following.trim_start().len());
        }

        self.sink.push(self.literal_start..tag_start, SpanKind::Literal);
        self.sink.push(tag_start..tag_end, kind);
        self.literal_start = tag_end;
        tag_end
    }

    fn run(mut self) -> Vec<RawSpan> {
        let raw = self.raw;
        let bytes = raw.as_bytes();
        let mut pos = 0;

        while let Some(rel) = raw[pos..].find('{') {
            let open = pos + rel;
            let Some(tag) = Tag::at(bytes, open) else {
                pos = open + 1;
                continue;
            };
            let Some(close) = find_tag_end(bytes, open, tag) else {
                break;
            };

            let kind = match tag {
                Tag::Expression => SpanKind::TemplatedExpr,
                Tag::Comment => SpanKind::Comment,
                Tag::Statement => classify_statement(&raw[open..close]),
            };
            pos = self.emit_tag(open, close, kind);

            if tag == Tag::Statement && tag_keyword(&raw[open..close]) == Some("raw") {
                let Some(end_raw) = END_RAW.find(&raw[pos..]) else {
                    break;
                };
                pos = self.emit_tag(pos + end_raw.start(), pos + end_raw.end(), SpanKind::BlockEnd);
            }
        }

        let rest = self.literal_start..raw.len();
        self.sink.push(rest, SpanKind::Literal);
        self.sink.finish()
    }
}

fn lex_jinja(raw: &str) -> Vec<RawSpan> {
    JinjaLexer {
        raw,
        sink: SpanSink::new(raw),
        literal_start: 0,
    }
    .run()
}

/// End (exclusive) of the tag opened at `open`, skipping quoted strings
fn find_tag_end(bytes: &[u8], open: usize, tag: Tag) -> Option<usize> {
    let close = tag.close();
    let mut quote: Option<u8> = None;
    let mut i = open + 2;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => {
                i += 2;
                continue;
            }
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if tag != Tag::Comment && (b == b'\'' || b == b'"') => quote = Some(b),
            None if b == close[0] && bytes.get(i + 1) == Some(&close[1]) => return Some(i + 2),
            None => {}
        }
        i += 1;
    }

    None
}

fn tag_keyword(tag: &str) -> Option<&str> {
    TAG_KEYWORD
        .captures(tag)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn classify_statement(tag: &str) -> SpanKind {
    match tag_keyword(tag) {
        Some(keyword) if keyword.starts_with("end") => SpanKind::BlockEnd,
        Some("else" | "elif") => SpanKind::BlockMid,
        Some("include" | "import" | "from" | "extends" | "do") => SpanKind::TemplatedExpr,
        // `{% set x = ... %}` assigns inline; only `{% set x %}` opens a block
        Some("set") if tag.contains('=') => SpanKind::TemplatedExpr,
        _ => SpanKind::BlockStart,
    }
}
