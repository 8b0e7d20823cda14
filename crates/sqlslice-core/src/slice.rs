//! Raw spans and mapping slices
//!
//! A [`RawSpan`] is one lexical piece of the un-rendered template. A
//! [`MappingSlice`] ties a range of the raw text to the range of rendered
//! text it produced. All offsets are byte offsets.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Lexical class of a raw span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// Text copied verbatim to the output
    Literal,

    /// An expression whose value is substituted into the output
    TemplatedExpr,

    /// Opens a control-flow block (`for`, `if`, `macro`, ...)
    BlockStart,

    /// Continues a block (`else`, `elif`)
    BlockMid,

    /// Closes a control-flow block
    BlockEnd,

    /// An escaped delimiter such as `{{` in a format string
    Escaped,

    /// A template comment
    Comment,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Literal => "literal",
            Self::TemplatedExpr => "templated_expr",
            Self::BlockStart => "block_start",
            Self::BlockMid => "block_mid",
            Self::BlockEnd => "block_end",
            Self::Escaped => "escaped",
            Self::Comment => "comment",
        }
    }

    /// Block directives of any position
    pub fn is_block(&self) -> bool {
        matches!(self, Self::BlockStart | Self::BlockMid | Self::BlockEnd)
    }

    /// Spans that never contribute text to the output themselves
    pub fn is_source_only(&self) -> bool {
        self.is_block() || matches!(self, Self::Comment)
    }
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of a mapping slice: the span kinds plus the `Templated` catch-all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceKind {
    Literal,
    Templated,
    BlockStart,
    BlockMid,
    BlockEnd,
    Escaped,
    Comment,
}

impl SliceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Literal => "literal",
            Self::Templated => "templated",
            Self::BlockStart => "block_start",
            Self::BlockMid => "block_mid",
            Self::BlockEnd => "block_end",
            Self::Escaped => "escaped",
            Self::Comment => "comment",
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Self::BlockStart | Self::BlockMid | Self::BlockEnd)
    }

    pub fn is_source_only(&self) -> bool {
        self.is_block() || matches!(self, Self::Comment)
    }
}

impl From<SpanKind> for SliceKind {
    fn from(kind: SpanKind) -> Self {
        match kind {
            SpanKind::Literal => Self::Literal,
            SpanKind::TemplatedExpr => Self::Templated,
            SpanKind::BlockStart => Self::BlockStart,
            SpanKind::BlockMid => Self::BlockMid,
            SpanKind::BlockEnd => Self::BlockEnd,
            SpanKind::Escaped => Self::Escaped,
            SpanKind::Comment => Self::Comment,
        }
    }
}

impl std::fmt::Display for SliceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A lexical piece of the raw template text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSpan {
    /// The exact raw text of the span
    pub text: String,

    /// Lexical class
    pub kind: SpanKind,

    /// Byte offset of the span in the raw text
    pub source_offset: usize,
}

impl RawSpan {
    pub fn new(text: impl Into<String>, kind: SpanKind, source_offset: usize) -> Self {
        Self {
            text: text.into(),
            kind,
            source_offset,
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Offset one past the last byte of the span
    pub fn end(&self) -> usize {
        self.source_offset + self.text.len()
    }

    pub fn source_range(&self) -> Range<usize> {
        self.source_offset..self.end()
    }
}

/// One entry of the raw-to-rendered position mapping
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingSlice {
    pub kind: SliceKind,

    /// Range over the raw text
    pub source_range: Range<usize>,

    /// Range over the rendered text
    pub rendered_range: Range<usize>,
}

impl MappingSlice {
    pub fn new(kind: SliceKind, source_range: Range<usize>, rendered_range: Range<usize>) -> Self {
        Self {
            kind,
            source_range,
            rendered_range,
        }
    }

    pub fn source_len(&self) -> usize {
        self.source_range.end.saturating_sub(self.source_range.start)
    }

    pub fn rendered_len(&self) -> usize {
        self.rendered_range.end.saturating_sub(self.rendered_range.start)
    }
}

impl std::fmt::Display for MappingSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} source[{}:{}] -> rendered[{}:{}]",
            self.kind,
            self.source_range.start,
            self.source_range.end,
            self.rendered_range.start,
            self.rendered_range.end
        )
    }
}
