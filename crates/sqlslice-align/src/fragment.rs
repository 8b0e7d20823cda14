//! Intermediate fragments and the boundary trimmer

use sqlslice_core::{MappingSlice, RawSpan, SpanKind};
use std::ops::Range;

/// How much is known about a fragment's correspondence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A literal anchored by a unique match on both sides
    Invariant,

    /// Several spans whose split of the rendered range is still unknown
    Compound,

    /// A single span between anchors; its whole rendered range is its own
    Simple,
}

impl Resolution {
    /// Resolution of a run of `len` unanchored spans
    pub fn for_run(len: usize) -> Self {
        if len == 1 {
            Self::Simple
        } else {
            Self::Compound
        }
    }
}

/// A run of raw spans and the rendered range they produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntermediateFragment {
    pub resolution: Resolution,
    pub source_range: Range<usize>,
    pub rendered_range: Range<usize>,
    pub spans: Vec<RawSpan>,
}

/// Output of [`IntermediateFragment::trim_ends`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trimmed {
    pub head: Vec<MappingSlice>,
    pub middle: IntermediateFragment,
    pub tail: Vec<MappingSlice>,
}

/// Whether any of `spans` can put text in the output
pub fn renders(spans: &[RawSpan]) -> bool {
    spans.iter().any(|span| !span.kind.is_source_only())
}

/// For each index, whether some later span can put text in the output
pub fn renders_after(spans: &[RawSpan]) -> Vec<bool> {
    let mut flags = vec![false; spans.len()];
    let mut seen = false;
    for (idx, span) in spans.iter().enumerate().rev() {
        flags[idx] = seen;
        seen |= !span.kind.is_source_only();
    }
    flags
}

/// Rendered width of a span when it is known without rendering
fn known_width(span: &RawSpan) -> Option<usize> {
    match span.kind {
        SpanKind::Literal => Some(span.len()),
        kind if kind.is_source_only() => Some(0),
        _ => None,
    }
}

impl IntermediateFragment {
    pub fn new(
        resolution: Resolution,
        source_range: Range<usize>,
        rendered_range: Range<usize>,
        spans: Vec<RawSpan>,
    ) -> Self {
        Self {
            resolution,
            source_range,
            rendered_range,
            spans,
        }
    }

    /// Strip the spans at either end whose rendered text is certain: literals
    /// matching the rendered text verbatim, and blocks or comments, which
    /// render nothing. Head trimming stops after a block opener and tail
    /// trimming after a block closer, so content inside a block stays in the
    /// middle. A span is only consumed if the spans left behind can still
    /// account for the rest of the rendered range.
    pub fn trim_ends(mut self, rendered: &str) -> Trimmed {
        let head = self.trim_head(rendered);
        let tail = self.trim_tail(rendered);
        Trimmed {
            head,
            middle: self,
            tail,
        }
    }

    fn trim_head(&mut self, rendered: &str) -> Vec<MappingSlice> {
        let mut slices = Vec::new();
        let mut consumed = 0;

        for (idx, span) in self.spans.iter().enumerate() {
            let Some(width) = known_width(span) else {
                break;
            };
            let start = self.rendered_range.start;
            let end = start + width;
            if end > self.rendered_range.end {
                break;
            }
            if span.kind == SpanKind::Literal && rendered.get(start..end) != Some(span.text.as_str()) {
                break;
            }
            if !renders(&self.spans[idx + 1..]) && end != self.rendered_range.end {
                break;
            }

            slices.push(MappingSlice::new(span.kind.into(), span.source_range(), start..end));
            self.source_range.start = span.end();
            self.rendered_range.start = end;
            consumed += 1;

            if matches!(span.kind, SpanKind::BlockStart | SpanKind::BlockMid) {
                break;
            }
        }

        self.spans.drain(..consumed);
        slices
    }

    fn trim_tail(&mut self, rendered: &str) -> Vec<MappingSlice> {
        let mut slices = Vec::new();
        let mut consumed = 0;

        for (idx, span) in self.spans.iter().enumerate().rev() {
            let Some(width) = known_width(span) else {
                break;
            };
            let end = self.rendered_range.end;
            let Some(start) = end.checked_sub(width) else {
                break;
            };
            if start < self.rendered_range.start {
                break;
            }
            if span.kind == SpanKind::Literal && rendered.get(start..end) != Some(span.text.as_str()) {
                break;
            }
            if !renders(&self.spans[..idx]) && start != self.rendered_range.start {
                break;
            }

            slices.push(MappingSlice::new(span.kind.into(), span.source_range(), start..end));
            self.source_range.end = span.source_offset;
            self.rendered_range.end = start;
            consumed += 1;

            if matches!(span.kind, SpanKind::BlockEnd | SpanKind::BlockMid) {
                break;
            }
        }

        let keep = self.spans.len() - consumed;
        self.spans.truncate(keep);
        slices.reverse();
        slices
    }
}
