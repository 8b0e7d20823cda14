//! Templated file with position translation
//!
//! A [`TemplatedFile`] bundles the raw text, the rendered text, the raw spans
//! and the mapping between them. Construction validates the mapping, so every
//! translation method can rely on the slices being total and contiguous.

use crate::slice::{MappingSlice, RawSpan, SliceKind, SpanKind};
use std::ops::Range;

/// Errors raised when a mapping is inconsistent or a query is out of range
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplatedFileError {
    #[error("Slice {index} is not contiguous with the previous slice: expected source {expected_source} and rendered {expected_rendered}, found {found:?}")]
    NotContiguous {
        index: usize,
        expected_source: usize,
        expected_rendered: usize,
        found: MappingSlice,
    },

    #[error("Slices do not cover the input: source ends at {source_end} of {source_len}, rendered ends at {rendered_end} of {rendered_len}")]
    IncompleteCoverage {
        source_end: usize,
        source_len: usize,
        rendered_end: usize,
        rendered_len: usize,
    },

    #[error("Block slice {index} renders {len} bytes, expected none")]
    BlockNotZeroWidth { index: usize, len: usize },

    #[error("Slice {index} has a reversed range: {slice:?}")]
    ReversedRange { index: usize, slice: MappingSlice },

    #[error("Range {start}..{end} is outside the rendered text of length {len}")]
    OutOfRange { start: usize, end: usize, len: usize },

    #[error("Position {pos} falls inside a templated section and has no single source position")]
    InsideTemplated { pos: usize },
}

/// Check that `slices` form a total, contiguous mapping of a raw text of
/// `source_len` bytes onto a rendered text of `rendered_len` bytes.
pub fn check_slices(
    source_len: usize,
    rendered_len: usize,
    slices: &[MappingSlice],
) -> Result<(), TemplatedFileError> {
    let mut source_end = 0;
    let mut rendered_end = 0;

    for (index, slice) in slices.iter().enumerate() {
        if slice.source_range.start > slice.source_range.end
            || slice.rendered_range.start > slice.rendered_range.end
        {
            return Err(TemplatedFileError::ReversedRange {
                index,
                slice: slice.clone(),
            });
        }

        if slice.source_range.start != source_end || slice.rendered_range.start != rendered_end {
            return Err(TemplatedFileError::NotContiguous {
                index,
                expected_source: source_end,
                expected_rendered: rendered_end,
                found: slice.clone(),
            });
        }

        if slice.kind.is_block() && slice.rendered_len() > 0 {
            return Err(TemplatedFileError::BlockNotZeroWidth {
                index,
                len: slice.rendered_len(),
            });
        }

        source_end = slice.source_range.end;
        rendered_end = slice.rendered_range.end;
    }

    if source_end != source_len || rendered_end != rendered_len {
        return Err(TemplatedFileError::IncompleteCoverage {
            source_end,
            source_len,
            rendered_end,
            rendered_len,
        });
    }

    Ok(())
}

/// Raw text, rendered text and the validated mapping between them
#[derive(Debug, Clone, PartialEq)]
pub struct TemplatedFile {
    source: String,
    rendered: String,
    path: Option<String>,
    slices: Vec<MappingSlice>,
    raw_spans: Vec<RawSpan>,
    source_newlines: Vec<usize>,
    rendered_newlines: Vec<usize>,
}

impl TemplatedFile {
    /// Build a templated file, validating the mapping
    pub fn new(
        source: impl Into<String>,
        rendered: impl Into<String>,
        path: Option<String>,
        slices: Vec<MappingSlice>,
        raw_spans: Vec<RawSpan>,
    ) -> Result<Self, TemplatedFileError> {
        let source = source.into();
        let rendered = rendered.into();

        check_slices(source.len(), rendered.len(), &slices)?;

        Ok(Self {
            source_newlines: newline_offsets(&source),
            rendered_newlines: newline_offsets(&rendered),
            source,
            rendered,
            path,
            slices,
            raw_spans,
        })
    }

    /// A file that was never templated: one literal span mapped onto itself
    pub fn from_untemplated(source: impl Into<String>, path: Option<String>) -> Self {
        let source = source.into();
        let len = source.len();
        let (slices, raw_spans) = if source.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            (
                vec![MappingSlice::new(SliceKind::Literal, 0..len, 0..len)],
                vec![RawSpan::new(source.clone(), SpanKind::Literal, 0)],
            )
        };
        let newlines = newline_offsets(&source);

        Self {
            rendered: source.clone(),
            source,
            path,
            slices,
            raw_spans,
            source_newlines: newlines.clone(),
            rendered_newlines: newlines,
        }
    }

    pub fn source_str(&self) -> &str {
        &self.source
    }

    pub fn rendered_str(&self) -> &str {
        &self.rendered
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn slices(&self) -> &[MappingSlice] {
        &self.slices
    }

    pub fn raw_spans(&self) -> &[RawSpan] {
        &self.raw_spans
    }

    /// Whether anything other than literal text maps onto the output
    pub fn is_templated(&self) -> bool {
        self.slices.iter().any(|s| s.kind != SliceKind::Literal)
    }

    /// 1-indexed (line, column) of a byte offset in the raw or rendered text
    pub fn line_pos_of_char_pos(&self, char_pos: usize, source: bool) -> (usize, usize) {
        let newlines = if source {
            &self.source_newlines
        } else {
            &self.rendered_newlines
        };

        let nl_idx = newlines.partition_point(|&nl| nl < char_pos);
        if nl_idx == 0 {
            (1, char_pos + 1)
        } else {
            (nl_idx + 1, char_pos - newlines[nl_idx - 1])
        }
    }

    /// Translate a range of the rendered text into a range of the raw text.
    ///
    /// Literal slices translate offset-exactly; any other slice widens to its
    /// whole source range. A zero-length range on a slice join maps to the
    /// earliest source position at that join, so an insertion lands before
    /// any block tags that render nothing there.
    pub fn templated_range_to_source_range(
        &self,
        range: Range<usize>,
    ) -> Result<Range<usize>, TemplatedFileError> {
        if range.start > range.end || range.end > self.rendered.len() {
            return Err(TemplatedFileError::OutOfRange {
                start: range.start,
                end: range.end,
                len: self.rendered.len(),
            });
        }

        if self.slices.is_empty() {
            return Ok(range);
        }

        let insertion_point = self
            .slices
            .iter()
            .find(|s| s.rendered_range.start == range.start)
            .map(|s| s.source_range.start)
            .or_else(|| {
                self.slices
                    .iter()
                    .rev()
                    .find(|s| s.rendered_range.end == range.start)
                    .map(|s| s.source_range.end)
            });

        if range.is_empty() {
            if let Some(point) = insertion_point {
                return Ok(point..point);
            }
            let containing = self
                .slices
                .iter()
                .find(|s| s.rendered_range.start < range.start && range.start < s.rendered_range.end);
            return match containing {
                Some(slice) if slice.kind == SliceKind::Literal => {
                    let point = slice.source_range.start + (range.start - slice.rendered_range.start);
                    Ok(point..point)
                }
                _ => Err(TemplatedFileError::InsideTemplated { pos: range.start }),
            };
        }

        let start_slice = self
            .slices
            .iter()
            .find(|s| s.rendered_range.start <= range.start && range.start < s.rendered_range.end);
        let stop_slice = self
            .slices
            .iter()
            .rev()
            .find(|s| s.rendered_range.start < range.end && range.end <= s.rendered_range.end);

        let (Some(start_slice), Some(stop_slice)) = (start_slice, stop_slice) else {
            return Err(TemplatedFileError::OutOfRange {
                start: range.start,
                end: range.end,
                len: self.rendered.len(),
            });
        };

        let source_start = match insertion_point {
            Some(point) => point,
            None if start_slice.kind == SliceKind::Literal => {
                start_slice.source_range.start + (range.start - start_slice.rendered_range.start)
            }
            None => start_slice.source_range.start,
        };

        let source_stop = if stop_slice.kind == SliceKind::Literal {
            stop_slice.source_range.end - (stop_slice.rendered_range.end - range.end)
        } else {
            stop_slice.source_range.end
        };

        Ok(source_start.min(source_stop)..source_stop.max(source_start))
    }

    /// Whether a raw range consists only of literal text
    pub fn is_source_range_literal(&self, range: Range<usize>) -> bool {
        if self.raw_spans.is_empty() || range.is_empty() {
            return true;
        }

        let mut is_literal = true;
        for span in &self.raw_spans {
            if span.source_offset <= range.start {
                is_literal = span.kind == SpanKind::Literal;
            } else if span.source_offset >= range.end {
                break;
            } else if span.kind != SpanKind::Literal {
                is_literal = false;
            }
        }
        is_literal
    }

    /// Raw spans that exist only in the source: blocks and comments
    pub fn source_only_spans(&self) -> Vec<&RawSpan> {
        self.raw_spans
            .iter()
            .filter(|span| span.kind.is_source_only())
            .collect()
    }

    /// The run of raw spans touching a raw range
    pub fn raw_spans_spanning_source_range(&self, range: Range<usize>) -> &[RawSpan] {
        let Some(last) = self.raw_spans.last() else {
            return &[];
        };
        if range.start >= last.end() {
            return &[];
        }

        let mut first = 0;
        while first + 1 < self.raw_spans.len() && self.raw_spans[first + 1].source_offset <= range.start {
            first += 1;
        }

        let mut span = 1;
        while first + span < self.raw_spans.len() && self.raw_spans[first + span].source_offset < range.end {
            span += 1;
        }

        &self.raw_spans[first..first + span]
    }
}

fn newline_offsets(text: &str) -> Vec<usize> {
    text.match_indices('\n').map(|(idx, _)| idx).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// "foo{{i}}bar" rendered to "foo1bar"
    fn simple_file() -> TemplatedFile {
        TemplatedFile::new(
            "foo{{i}}bar",
            "foo1bar",
            None,
            vec![
                MappingSlice::new(SliceKind::Literal, 0..3, 0..3),
                MappingSlice::new(SliceKind::Templated, 3..8, 3..4),
                MappingSlice::new(SliceKind::Literal, 8..11, 4..7),
            ],
            vec![
                RawSpan::new("foo", SpanKind::Literal, 0),
                RawSpan::new("{{i}}", SpanKind::TemplatedExpr, 3),
                RawSpan::new("bar", SpanKind::Literal, 8),
            ],
        )
        .unwrap()
    }

    /// "x{% if a %}y{% endif %}" rendered to "xy"
    fn block_file() -> TemplatedFile {
        TemplatedFile::new(
            "x{% if a %}y{% endif %}",
            "xy",
            None,
            vec![
                MappingSlice::new(SliceKind::Literal, 0..1, 0..1),
                MappingSlice::new(SliceKind::BlockStart, 1..11, 1..1),
                MappingSlice::new(SliceKind::Literal, 11..12, 1..2),
                MappingSlice::new(SliceKind::BlockEnd, 12..23, 2..2),
            ],
            vec![
                RawSpan::new("x", SpanKind::Literal, 0),
                RawSpan::new("{% if a %}", SpanKind::BlockStart, 1),
                RawSpan::new("y", SpanKind::Literal, 11),
                RawSpan::new("{% endif %}", SpanKind::BlockEnd, 12),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_gaps() {
        let result = TemplatedFile::new(
            "foobar",
            "foobar",
            None,
            vec![
                MappingSlice::new(SliceKind::Literal, 0..3, 0..3),
                MappingSlice::new(SliceKind::Literal, 4..6, 3..6),
            ],
            Vec::new(),
        );
        assert!(matches!(result, Err(TemplatedFileError::NotContiguous { index: 1, .. })));
    }

    #[test]
    fn rejects_partial_coverage() {
        let result = check_slices(6, 6, &[MappingSlice::new(SliceKind::Literal, 0..3, 0..3)]);
        assert!(matches!(result, Err(TemplatedFileError::IncompleteCoverage { .. })));
    }

    #[test]
    fn rejects_rendering_blocks() {
        let result = check_slices(5, 1, &[MappingSlice::new(SliceKind::BlockStart, 0..5, 0..1)]);
        assert_eq!(result, Err(TemplatedFileError::BlockNotZeroWidth { index: 0, len: 1 }));
    }

    #[test]
    fn empty_file_is_valid() {
        assert!(check_slices(0, 0, &[]).is_ok());
        let file = TemplatedFile::from_untemplated("", None);
        assert!(file.slices().is_empty());
        assert!(!file.is_templated());
    }

    #[test]
    fn line_positions() {
        let file = TemplatedFile::from_untemplated("ab\ncd\n\nef", Some("a.sql".to_string()));
        assert_eq!(file.line_pos_of_char_pos(0, true), (1, 1));
        assert_eq!(file.line_pos_of_char_pos(2, true), (1, 3));
        assert_eq!(file.line_pos_of_char_pos(3, true), (2, 1));
        assert_eq!(file.line_pos_of_char_pos(7, true), (4, 1));
        assert_eq!(file.path(), Some("a.sql"));
    }

    #[test]
    fn literal_ranges_translate_exactly() {
        let file = simple_file();
        assert_eq!(file.templated_range_to_source_range(1..2).unwrap(), 1..2);
        assert_eq!(file.templated_range_to_source_range(5..7).unwrap(), 9..11);
    }

    #[test]
    fn templated_ranges_widen() {
        let file = simple_file();
        assert_eq!(file.templated_range_to_source_range(3..4).unwrap(), 3..8);
        assert_eq!(file.templated_range_to_source_range(2..5).unwrap(), 2..9);
    }

    #[test]
    fn zero_length_ranges() {
        let file = simple_file();
        assert_eq!(file.templated_range_to_source_range(1..1).unwrap(), 1..1);
        assert_eq!(file.templated_range_to_source_range(4..4).unwrap(), 8..8);
        assert_eq!(file.templated_range_to_source_range(7..7).unwrap(), 11..11);
    }

    #[test]
    fn insertion_lands_before_blocks() {
        let file = block_file();
        assert_eq!(file.templated_range_to_source_range(1..1).unwrap(), 1..1);
        assert_eq!(file.templated_range_to_source_range(1..2).unwrap(), 1..12);
        assert_eq!(file.templated_range_to_source_range(2..2).unwrap(), 12..12);
    }

    #[test]
    fn out_of_range_is_an_error() {
        let file = simple_file();
        assert!(matches!(
            file.templated_range_to_source_range(5..9),
            Err(TemplatedFileError::OutOfRange { .. })
        ));
    }

    #[test]
    fn literal_source_ranges() {
        let file = simple_file();
        assert!(file.is_source_range_literal(0..3));
        assert!(file.is_source_range_literal(8..10));
        assert!(!file.is_source_range_literal(2..4));
        assert!(!file.is_source_range_literal(4..5));
        assert!(file.is_source_range_literal(4..4));
    }

    #[test]
    fn source_only_spans_are_blocks_and_comments() {
        let file = block_file();
        let kinds: Vec<SpanKind> = file.source_only_spans().iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SpanKind::BlockStart, SpanKind::BlockEnd]);
    }

    #[test]
    fn spans_covering_a_source_range() {
        let file = simple_file();
        let texts: Vec<&str> = file
            .raw_spans_spanning_source_range(2..4)
            .iter()
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(texts, vec!["foo", "{{i}}"]);
        assert!(file.raw_spans_spanning_source_range(11..11).is_empty());
    }
}
