//! SQLSlice Align
//!
//! Reconstructs the position mapping between a raw template and the text it
//! rendered to. Templating engines discard positions on render; this crate
//! recovers them heuristically from the raw spans and the rendered output so
//! that a diagnostic or an edit on rendered SQL can be carried back to the
//! template source.
//!
//! The pipeline is lexer -> occurrence tables -> invariant splitter ->
//! compound resolver. Alignment never fails: if the heuristics ever produce
//! an invalid mapping, the result degrades to a character-level one.

pub mod error;
pub mod fragment;
pub mod lexer;
pub mod occurrences;
pub mod resolver;
pub mod splitter;
pub mod undefined;

pub use error::RenderError;
pub use lexer::{lex, Syntax};
pub use occurrences::{substring_occurrences, OccurrenceTable};
pub use undefined::{Sentinel, UndefinedSet, UndefinedTracker};

use resolver::Resolver;
use sqlslice_core::{
    check_slices, MappingSlice, RawSpan, SliceKind, SpanKind, TemplatedFile, TemplatedFileError,
};

/// Everything produced by rendering and aligning one raw text
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// The raw template text
    pub source: String,

    /// Output of the render step
    pub rendered: String,

    /// Lexical breakdown of the raw text
    pub raw_spans: Vec<RawSpan>,

    /// Mapping from raw ranges to rendered ranges
    pub slices: Vec<MappingSlice>,

    /// Names the render looked up but the context did not define
    pub undefined: UndefinedSet,

    /// Whether the mapping fell back to character-level alignment
    pub degraded: bool,
}

impl Alignment {
    /// Bundle into a validated [`TemplatedFile`]
    pub fn to_templated_file(&self, path: Option<String>) -> Result<TemplatedFile, TemplatedFileError> {
        TemplatedFile::new(
            self.source.clone(),
            self.rendered.clone(),
            path,
            self.slices.clone(),
            self.raw_spans.clone(),
        )
    }
}

/// Lex `raw`, render it once through `render`, and align the two.
///
/// `render` receives the raw text and the undefined set owned by this call.
/// A render failure is the only error; nothing is returned for the file in
/// that case.
pub fn slice_file<F>(raw: &str, syntax: Syntax, render: F) -> Result<Alignment, RenderError>
where
    F: FnOnce(&str, &mut UndefinedSet) -> Result<String, RenderError>,
{
    let raw_spans = lex(raw, syntax);
    tracing::debug!(spans = raw_spans.len(), ?syntax, "lexed raw template");

    let mut undefined = UndefinedSet::new();
    let rendered = render(raw, &mut undefined)?;

    let (slices, degraded) = align_checked(raw, &raw_spans, &rendered);

    Ok(Alignment {
        source: raw.to_string(),
        rendered,
        raw_spans,
        slices,
        undefined,
        degraded,
    })
}

/// Align already-rendered text against the raw spans it came from
pub fn align(raw: &str, raw_spans: &[RawSpan], rendered: &str) -> Vec<MappingSlice> {
    align_checked(raw, raw_spans, rendered).0
}

fn align_checked(raw: &str, raw_spans: &[RawSpan], rendered: &str) -> (Vec<MappingSlice>, bool) {
    let literals: Vec<&str> = raw_spans
        .iter()
        .filter(|span| span.kind == SpanKind::Literal)
        .map(|span| span.text.as_str())
        .collect();

    let raw_occurrences = OccurrenceTable::build(raw, literals.iter().copied());
    let rendered_occurrences = OccurrenceTable::build(rendered, literals.iter().copied());

    let fragments =
        splitter::split_invariants(raw_spans, &raw_occurrences, &rendered_occurrences, rendered.len());
    let slices = Resolver::new(rendered, &raw_occurrences, &rendered_occurrences).resolve(fragments);
    tracing::debug!(slices = slices.len(), "resolved mapping slices");

    match check_slices(raw.len(), rendered.len(), &slices) {
        Ok(()) => (slices, false),
        Err(error) => {
            tracing::warn!(%error, "alignment failed validation, falling back to character level");
            (character_slices(raw, rendered), true)
        }
    }
}

/// Pair characters left to right; whatever is left over on either side
/// becomes one trailing templated slice
pub fn character_slices(raw: &str, rendered: &str) -> Vec<MappingSlice> {
    let mut slices = Vec::new();
    let mut source_end = 0;
    let mut rendered_end = 0;

    for ((si, sc), (ri, rc)) in raw.char_indices().zip(rendered.char_indices()) {
        let kind = if sc == rc {
            SliceKind::Literal
        } else {
            SliceKind::Templated
        };
        source_end = si + sc.len_utf8();
        rendered_end = ri + rc.len_utf8();
        slices.push(MappingSlice::new(kind, si..source_end, ri..rendered_end));
    }

    if source_end < raw.len() || rendered_end < rendered.len() {
        slices.push(MappingSlice::new(
            SliceKind::Templated,
            source_end..raw.len(),
            rendered_end..rendered.len(),
        ));
    }

    slices
}
