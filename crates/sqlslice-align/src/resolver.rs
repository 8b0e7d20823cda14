//! Compound resolution
//!
//! Turns the fragments produced by the splitter into mapping slices. A
//! compound fragment is trimmed at both ends, then split at literals that are
//! unique within it on both axes, recursing on the pieces. When no such
//! anchor exists the fragment is aligned pairwise: each literal is matched at
//! its earliest consistent rendered position and the spans between anchors
//! are coalesced into one slice.

use crate::fragment::{renders, renders_after, IntermediateFragment, Resolution, Trimmed};
use crate::occurrences::OccurrenceTable;
use sqlslice_core::{MappingSlice, RawSpan, SliceKind, SpanKind};
use std::ops::Range;

/// Resolves fragments against one rendered text and its occurrence tables
pub struct Resolver<'a> {
    rendered: &'a str,
    raw_occurrences: &'a OccurrenceTable,
    rendered_occurrences: &'a OccurrenceTable,
}

impl<'a> Resolver<'a> {
    pub fn new(
        rendered: &'a str,
        raw_occurrences: &'a OccurrenceTable,
        rendered_occurrences: &'a OccurrenceTable,
    ) -> Self {
        Self {
            rendered,
            raw_occurrences,
            rendered_occurrences,
        }
    }

    /// Resolve fragments in order into one slice list
    pub fn resolve(&self, fragments: Vec<IntermediateFragment>) -> Vec<MappingSlice> {
        let mut out = Vec::new();
        for fragment in fragments {
            match fragment.resolution {
                Resolution::Invariant => out.push(MappingSlice::new(
                    SliceKind::Literal,
                    fragment.source_range,
                    fragment.rendered_range,
                )),
                Resolution::Simple | Resolution::Compound => self.resolve_compound(fragment, &mut out),
            }
        }
        out
    }

    /// Resolve one fragment, appending its slices to `out`
    pub fn resolve_compound(&self, fragment: IntermediateFragment, out: &mut Vec<MappingSlice>) {
        if fragment.spans.len() <= 1 || fragment.rendered_range.is_empty() {
            emit_group(&fragment.spans, fragment.source_range, fragment.rendered_range, self.rendered, out);
            return;
        }

        let Trimmed { head, middle, tail } = fragment.trim_ends(self.rendered);
        out.extend(head);

        if middle.spans.len() <= 1 || middle.rendered_range.is_empty() {
            emit_group(&middle.spans, middle.source_range, middle.rendered_range, self.rendered, out);
        } else {
            self.split_on_uniques(middle, out);
        }

        out.extend(tail);
    }

    /// Split at literals occurring exactly once in the fragment's raw range
    /// and exactly once in its rendered range, recursing on the gaps.
    fn split_on_uniques(&self, fragment: IntermediateFragment, out: &mut Vec<MappingSlice>) {
        let anchors = self.find_anchors(&fragment);
        if anchors.is_empty() {
            self.coalesce_pairwise(fragment, out);
            return;
        }

        tracing::trace!(
            anchors = anchors.len(),
            source = ?fragment.source_range,
            "splitting compound fragment at unique literals"
        );

        let spans = &fragment.spans;
        let mut source_cursor = fragment.source_range.start;
        let mut rendered_cursor = fragment.rendered_range.start;
        let mut bookmark = 0;

        for (idx, rendered_start) in anchors {
            let span = &spans[idx];
            if idx > bookmark {
                let sub = IntermediateFragment::new(
                    Resolution::for_run(idx - bookmark),
                    source_cursor..span.source_offset,
                    rendered_cursor..rendered_start,
                    spans[bookmark..idx].to_vec(),
                );
                self.resolve_compound(sub, out);
            }

            let rendered_end = rendered_start + span.len();
            out.push(MappingSlice::new(
                SliceKind::Literal,
                span.source_range(),
                rendered_start..rendered_end,
            ));
            source_cursor = span.end();
            rendered_cursor = rendered_end;
            bookmark = idx + 1;
        }

        if bookmark < spans.len() {
            let sub = IntermediateFragment::new(
                Resolution::for_run(spans.len() - bookmark),
                source_cursor..fragment.source_range.end,
                rendered_cursor..fragment.rendered_range.end,
                spans[bookmark..].to_vec(),
            );
            self.resolve_compound(sub, out);
        }
    }

    /// Literal spans anchored by a two-way unique substring, as
    /// `(span index, rendered start)` in increasing order on both axes
    fn find_anchors(&self, fragment: &IntermediateFragment) -> Vec<(usize, usize)> {
        let raw_local = self.raw_occurrences.within(fragment.source_range.clone());
        let rendered_local = self.rendered_occurrences.within(fragment.rendered_range.clone());
        let spans = &fragment.spans;
        let later = renders_after(spans);

        let mut anchors = Vec::new();
        let mut bookmark = 0;
        let mut rendered_cursor = fragment.rendered_range.start;

        for (needle, raw_pos) in raw_local.sorted_tuples() {
            if raw_local.count(needle) != 1 || rendered_local.count(needle) != 1 {
                continue;
            }

            let Some(idx) = spans
                .partition_point(|s| s.source_offset <= raw_pos)
                .checked_sub(1)
            else {
                continue;
            };
            let span = &spans[idx];
            if idx < bookmark || span.kind != SpanKind::Literal || raw_pos + needle.len() > span.end() {
                continue;
            }

            let Some(start) = rendered_local.get(needle)[0].checked_sub(raw_pos - span.source_offset) else {
                continue;
            };
            let end = start + span.len();
            if start < rendered_cursor || end > fragment.rendered_range.end {
                continue;
            }
            // nothing able to render the gap before the anchor, or after it
            if (!renders(&spans[bookmark..idx]) && start != rendered_cursor)
                || (!later[idx] && end != fragment.rendered_range.end)
            {
                continue;
            }
            if self.rendered.get(start..end) != Some(span.text.as_str()) {
                continue;
            }

            anchors.push((idx, start));
            bookmark = idx + 1;
            rendered_cursor = end;
        }

        anchors
    }

    /// Anchor each literal at its earliest consistent rendered position and
    /// coalesce the spans between anchors. Literals enclosed in a block that
    /// opens and closes inside the fragment are never anchors.
    fn coalesce_pairwise(&self, fragment: IntermediateFragment, out: &mut Vec<MappingSlice>) {
        let spans = &fragment.spans;
        let enclosed = enclosed_mask(spans);
        let later = renders_after(spans);
        let rendered_end = fragment.rendered_range.end;

        let mut source_cursor = fragment.source_range.start;
        let mut rendered_cursor = fragment.rendered_range.start;
        let mut group_start = 0;

        for (idx, span) in spans.iter().enumerate() {
            if span.kind != SpanKind::Literal || span.is_empty() || enclosed[idx] {
                continue;
            }

            let len = span.len();
            let pending = renders(&spans[group_start..idx]);
            let found = if !later[idx] {
                rendered_end
                    .checked_sub(len)
                    .filter(|&at| at >= rendered_cursor && (pending || at == rendered_cursor))
                    .filter(|&at| self.rendered_occurrences.contains_at(&span.text, at))
            } else if pending {
                self.rendered_occurrences
                    .first_from(&span.text, rendered_cursor)
                    .filter(|&at| at + len <= rendered_end)
            } else {
                Some(rendered_cursor).filter(|&at| {
                    at + len <= rendered_end && self.rendered_occurrences.contains_at(&span.text, at)
                })
            };
            let Some(at) = found else {
                continue;
            };

            if idx > group_start {
                emit_group(
                    &spans[group_start..idx],
                    source_cursor..span.source_offset,
                    rendered_cursor..at,
                    self.rendered,
                    out,
                );
            }
            out.push(MappingSlice::new(SliceKind::Literal, span.source_range(), at..at + len));

            source_cursor = span.end();
            rendered_cursor = at + len;
            group_start = idx + 1;
        }

        if group_start < spans.len() {
            emit_group(
                &spans[group_start..],
                source_cursor..fragment.source_range.end,
                rendered_cursor..rendered_end,
                self.rendered,
                out,
            );
        }
    }
}

/// Mark spans lying between a block opener and its matching closer
fn enclosed_mask(spans: &[RawSpan]) -> Vec<bool> {
    let mut mask = vec![false; spans.len()];
    let mut open = Vec::new();

    for (idx, span) in spans.iter().enumerate() {
        match span.kind {
            SpanKind::BlockStart => open.push(idx),
            SpanKind::BlockEnd => {
                if let Some(start) = open.pop() {
                    mask[start..=idx].iter_mut().for_each(|flag| *flag = true);
                }
            }
            _ => {}
        }
    }

    mask
}

/// Emit a run of spans over a known rendered range: one zero-width slice per
/// span when nothing was rendered, otherwise a single coalesced slice, split
/// at block markers when there are any
fn emit_group(
    spans: &[RawSpan],
    source_range: Range<usize>,
    rendered_range: Range<usize>,
    rendered: &str,
    out: &mut Vec<MappingSlice>,
) {
    if rendered_range.is_empty() && !spans.is_empty() {
        let at = rendered_range.start;
        out.extend(
            spans
                .iter()
                .map(|span| MappingSlice::new(span.kind.into(), span.source_range(), at..at)),
        );
    } else if spans.len() > 1 && spans.iter().any(|s| s.kind.is_block()) && renders(spans) {
        emit_around_markers(spans, rendered_range, rendered, out);
    } else if !(source_range.is_empty() && rendered_range.is_empty()) {
        let kind = coalesce_kind(spans, rendered.get(rendered_range.clone()));
        out.push(MappingSlice::new(kind, source_range, rendered_range));
    }
}

/// Give every block marker in `spans` a zero-width slice and share the
/// rendered range among the runs between them.
///
/// Literal runs matching the rendered text verbatim are taken from the front
/// and then from the back; the first remaining run able to render absorbs
/// whatever is left.
fn emit_around_markers(
    spans: &[RawSpan],
    rendered_range: Range<usize>,
    rendered: &str,
    out: &mut Vec<MappingSlice>,
) {
    let mut pieces: Vec<&[RawSpan]> = Vec::new();
    let mut run_start = 0;
    for (idx, span) in spans.iter().enumerate() {
        if span.kind.is_block() {
            if idx > run_start {
                pieces.push(&spans[run_start..idx]);
            }
            pieces.push(&spans[idx..=idx]);
            run_start = idx + 1;
        }
    }
    if run_start < spans.len() {
        pieces.push(&spans[run_start..]);
    }

    let absorbing: Vec<usize> = (0..pieces.len()).filter(|&p| renders(pieces[p])).collect();
    let mut widths = vec![0; pieces.len()];
    let mut start = rendered_range.start;
    let mut end = rendered_range.end;

    let mut front = 0;
    while let Some(&p) = absorbing.get(front) {
        let Some(len) = verbatim_len(pieces[p]) else {
            break;
        };
        if start + len > end || rendered.get(start..start + len) != Some(concat(pieces[p]).as_str()) {
            break;
        }
        widths[p] = len;
        start += len;
        front += 1;
    }

    let mut back = absorbing.len();
    while back > front {
        let p = absorbing[back - 1];
        let Some(len) = verbatim_len(pieces[p]) else {
            break;
        };
        if end < start + len || rendered.get(end - len..end) != Some(concat(pieces[p]).as_str()) {
            break;
        }
        widths[p] = len;
        end -= len;
        back -= 1;
    }

    if end > start {
        let taker = if front < back {
            absorbing[front]
        } else if front > 0 {
            absorbing[front - 1]
        } else {
            absorbing[back]
        };
        widths[taker] += end - start;
    }

    let mut at = rendered_range.start;
    for (piece, width) in pieces.into_iter().zip(widths) {
        if width == 0 {
            out.extend(
                piece
                    .iter()
                    .map(|span| MappingSlice::new(span.kind.into(), span.source_range(), at..at)),
            );
            continue;
        }
        let source = piece[0].source_offset..piece[piece.len() - 1].end();
        let kind = coalesce_kind(piece, rendered.get(at..at + width));
        out.push(MappingSlice::new(kind, source, at..at + width));
        at += width;
    }
}

/// Length of a run of literals, or `None` if it holds anything else
fn verbatim_len(spans: &[RawSpan]) -> Option<usize> {
    spans
        .iter()
        .all(|s| s.kind == SpanKind::Literal)
        .then(|| spans.iter().map(RawSpan::len).sum())
}

fn concat(spans: &[RawSpan]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

/// Kind of a slice covering `spans` that rendered to `rendered`.
///
/// A shared kind survives coalescing; anything mixed is `Templated`. Literals
/// stay literal only when they match the rendered text verbatim, and block
/// markers only while they render nothing.
pub fn coalesce_kind(spans: &[RawSpan], rendered: Option<&str>) -> SliceKind {
    let Some(first) = spans.first() else {
        return SliceKind::Templated;
    };
    if spans.iter().any(|s| s.kind != first.kind) {
        return SliceKind::Templated;
    }

    match first.kind {
        SpanKind::Literal => {
            let verbatim = rendered.is_some_and(|text| {
                text.len() == spans.iter().map(RawSpan::len).sum::<usize>()
                    && spans
                        .iter()
                        .scan(0, |offset, span| {
                            let start = *offset;
                            *offset += span.len();
                            Some(text.get(start..*offset) == Some(span.text.as_str()))
                        })
                        .all(|matched| matched)
            });
            if verbatim {
                SliceKind::Literal
            } else {
                SliceKind::Templated
            }
        }
        kind if kind.is_source_only() => {
            if spans.len() == 1 && rendered.is_some_and(str::is_empty) {
                kind.into()
            } else {
                SliceKind::Templated
            }
        }
        kind => kind.into(),
    }
}
