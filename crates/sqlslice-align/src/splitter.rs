//! Invariant splitting
//!
//! Finds the literal spans whose correspondence is certain and cuts the span
//! sequence at them, leaving everything in between as compound fragments for
//! the resolver.

use crate::fragment::{renders, renders_after, IntermediateFragment, Resolution};
use crate::occurrences::OccurrenceTable;
use sqlslice_core::{RawSpan, SpanKind};
use std::ops::Range;

/// Split `spans` at literals that occur exactly once in the raw text and
/// exactly once in the rendered text after the previous anchor. An anchor
/// must leave no rendered text to spans that cannot produce any.
///
/// Fragments come back in source order and tile both the raw text and
/// `0..rendered_len`.
pub fn split_invariants(
    spans: &[RawSpan],
    raw_occurrences: &OccurrenceTable,
    rendered_occurrences: &OccurrenceTable,
    rendered_len: usize,
) -> Vec<IntermediateFragment> {
    let mut fragments = Vec::new();
    let mut buffer: Vec<RawSpan> = Vec::new();
    let mut source_cursor = 0;
    let mut rendered_cursor = 0;
    let later = renders_after(spans);

    for (span, &later_renders) in spans.iter().zip(&later) {
        let at = invariant_position(span, raw_occurrences, rendered_occurrences, rendered_cursor)
            .filter(|&at| renders(&buffer) || at == rendered_cursor)
            .filter(|&at| later_renders || at + span.len() == rendered_len);
        if let Some(at) = at {
            flush(
                &mut fragments,
                &mut buffer,
                source_cursor..span.source_offset,
                rendered_cursor..at,
            );
            let end = at + span.len();
            fragments.push(IntermediateFragment::new(
                Resolution::Invariant,
                span.source_range(),
                at..end,
                vec![span.clone()],
            ));
            source_cursor = span.end();
            rendered_cursor = end;
        } else {
            buffer.push(span.clone());
        }
    }

    let source_end = spans.last().map_or(source_cursor, RawSpan::end);
    flush(
        &mut fragments,
        &mut buffer,
        source_cursor..source_end,
        rendered_cursor..rendered_len.max(rendered_cursor),
    );

    tracing::debug!(
        fragments = fragments.len(),
        invariants = fragments
            .iter()
            .filter(|f| f.resolution == Resolution::Invariant)
            .count(),
        "split raw spans at invariants"
    );

    fragments
}

fn invariant_position(
    span: &RawSpan,
    raw_occurrences: &OccurrenceTable,
    rendered_occurrences: &OccurrenceTable,
    rendered_cursor: usize,
) -> Option<usize> {
    if span.kind != SpanKind::Literal || span.is_empty() {
        return None;
    }
    if raw_occurrences.count(&span.text) != 1
        || rendered_occurrences.count_from(&span.text, rendered_cursor) != 1
    {
        return None;
    }
    rendered_occurrences.first_from(&span.text, rendered_cursor)
}

fn flush(
    fragments: &mut Vec<IntermediateFragment>,
    buffer: &mut Vec<RawSpan>,
    source_range: Range<usize>,
    rendered_range: Range<usize>,
) {
    if buffer.is_empty() && rendered_range.is_empty() {
        return;
    }
    let spans = std::mem::take(buffer);
    fragments.push(IntermediateFragment::new(
        Resolution::for_run(spans.len()),
        source_range,
        rendered_range,
        spans,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{lex, Syntax};
    use pretty_assertions::assert_eq;

    fn split(raw: &str, syntax: Syntax, rendered: &str) -> Vec<IntermediateFragment> {
        let spans = lex(raw, syntax);
        let literals: Vec<&str> = spans
            .iter()
            .filter(|s| s.kind == SpanKind::Literal)
            .map(|s| s.text.as_str())
            .collect();
        let raw_occurrences = OccurrenceTable::build(raw, literals.iter().copied());
        let rendered_occurrences = OccurrenceTable::build(rendered, literals.iter().copied());
        split_invariants(&spans, &raw_occurrences, &rendered_occurrences, rendered.len())
    }

    fn summary(fragments: &[IntermediateFragment]) -> Vec<(Resolution, Range<usize>, Range<usize>)> {
        fragments
            .iter()
            .map(|f| (f.resolution, f.source_range.clone(), f.rendered_range.clone()))
            .collect()
    }

    #[test]
    fn format_string_invariants() {
        let fragments = split(
            "SELECT {blah}, {foo:.2f} as foo, {bar}, '{{}}' as convertible from something",
            Syntax::PythonFormat,
            "SELECT nothing, 435.24 as foo, spam, '{}' as convertible from something",
        );

        assert_eq!(
            summary(&fragments),
            vec![
                (Resolution::Invariant, 0..7, 0..7),
                (Resolution::Compound, 7..24, 7..22),
                (Resolution::Invariant, 24..33, 22..31),
                (Resolution::Simple, 33..38, 31..35),
                (Resolution::Invariant, 38..41, 35..38),
                (Resolution::Compound, 41..45, 38..40),
                (Resolution::Invariant, 45..76, 40..71),
            ]
        );
    }

    #[test]
    fn repeated_literals_stay_compound() {
        let fragments = split(
            "foo{% for i in x %}foo{{i}}bar{% endfor %}bar",
            Syntax::Jinja,
            "foofoo1barfoo2barbar",
        );
        assert_eq!(summary(&fragments), vec![(Resolution::Compound, 0..45, 0..20)]);
    }

    #[test]
    fn anchors_are_monotonic() {
        // "b" occurs twice in the rendered text but only once after "a-"
        let fragments = split("{{x}}a-{{y}}b", Syntax::Jinja, "ba-b");
        assert_eq!(
            summary(&fragments),
            vec![
                (Resolution::Simple, 0..5, 0..1),
                (Resolution::Invariant, 5..7, 1..3),
                (Resolution::Simple, 7..12, 3..3),
                (Resolution::Invariant, 12..13, 3..4),
            ]
        );
    }

    #[test]
    fn markers_alone_never_span_a_gap() {
        // the rendered "a" comes from the expression; anchoring the literal "a"
        // to it would leave the rendered "b" to the `{% if %}` marker
        let fragments = split(
            "x = 1{% if c %}a{% endif %}b{{ v }}",
            Syntax::Jinja,
            "x = 1ba",
        );
        assert_eq!(
            summary(&fragments),
            vec![
                (Resolution::Invariant, 0..5, 0..5),
                (Resolution::Compound, 5..27, 5..5),
                (Resolution::Invariant, 27..28, 5..6),
                (Resolution::Simple, 28..35, 6..7),
            ]
        );
    }

    #[test]
    fn rendered_text_without_spans_gets_a_fragment() {
        let fragments = split("", Syntax::Jinja, "abc");
        assert_eq!(summary(&fragments), vec![(Resolution::Compound, 0..0, 0..3)]);
        assert!(fragments[0].spans.is_empty());
    }
}
