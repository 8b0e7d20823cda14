//! Property tests for the alignment engine

use proptest::prelude::*;
use sqlslice_align::{align, lex, slice_file, RenderError, Syntax, UndefinedSet};
use sqlslice_core::{check_slices, MappingSlice, RawSpan, SliceKind};

/// A template fragment together with how it renders
#[derive(Debug, Clone)]
enum Piece {
    Text(String),
    Expr(String),
    Comment,
    If(bool, Vec<Piece>),
    For(usize, Vec<Piece>),
}

fn text() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["select ", "a", "b", ", ", "\n", " from t", "foo", "bar", "x = 1"])
        .prop_map(String::from)
}

fn value() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["", "1", "a", "foo", ", ", "bar baz", "select "]).prop_map(String::from)
}

fn piece() -> impl Strategy<Value = Piece> {
    let leaf = prop_oneof![
        3 => text().prop_map(Piece::Text),
        2 => value().prop_map(Piece::Expr),
        1 => Just(Piece::Comment),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            (any::<bool>(), prop::collection::vec(inner.clone(), 0..4))
                .prop_map(|(cond, body)| Piece::If(cond, body)),
            (0usize..3, prop::collection::vec(inner, 0..4))
                .prop_map(|(times, body)| Piece::For(times, body)),
        ]
    })
}

fn write(pieces: &[Piece], raw: &mut String, rendered: &mut String) {
    for piece in pieces {
        match piece {
            Piece::Text(text) => {
                raw.push_str(text);
                rendered.push_str(text);
            }
            Piece::Expr(value) => {
                raw.push_str("{{ v }}");
                rendered.push_str(value);
            }
            Piece::Comment => raw.push_str("{# note #}"),
            Piece::If(cond, body) => {
                raw.push_str("{% if c %}");
                let mut inner = String::new();
                write(body, raw, &mut inner);
                if *cond {
                    rendered.push_str(&inner);
                }
                raw.push_str("{% endif %}");
            }
            Piece::For(times, body) => {
                raw.push_str("{% for i in items %}");
                let mut inner = String::new();
                write(body, raw, &mut inner);
                for _ in 0..*times {
                    rendered.push_str(&inner);
                }
                raw.push_str("{% endfor %}");
            }
        }
    }
}

fn template() -> impl Strategy<Value = (String, String)> {
    prop::collection::vec(piece(), 0..8).prop_map(|pieces| {
        let mut raw = String::new();
        let mut rendered = String::new();
        write(&pieces, &mut raw, &mut rendered);
        (raw, rendered)
    })
}

fn assert_mapping(raw: &str, rendered: &str, slices: &[MappingSlice]) -> Result<(), TestCaseError> {
    prop_assert!(check_slices(raw.len(), rendered.len(), slices).is_ok());

    let mut source = String::new();
    let mut output = String::new();
    for slice in slices {
        let source_text = raw.get(slice.source_range.clone());
        let rendered_text = rendered.get(slice.rendered_range.clone());
        prop_assert!(source_text.is_some() && rendered_text.is_some());
        source.push_str(source_text.unwrap_or_default());
        output.push_str(rendered_text.unwrap_or_default());

        if slice.kind.is_block() {
            prop_assert!(slice.rendered_range.is_empty());
        }
        if slice.kind == SliceKind::Literal && !slice.rendered_range.is_empty() {
            prop_assert_eq!(source_text, rendered_text);
        }
    }
    prop_assert_eq!(source, raw);
    prop_assert_eq!(output, rendered);
    Ok(())
}

/// Every raw block span is covered only by zero-width slices
fn assert_blocks_render_nothing(raw_spans: &[RawSpan], slices: &[MappingSlice]) -> Result<(), TestCaseError> {
    for span in raw_spans.iter().filter(|s| s.kind.is_block()) {
        let range = span.source_range();
        let covering = slices
            .iter()
            .filter(|s| s.source_range.start < range.end && range.start < s.source_range.end);
        for slice in covering {
            prop_assert!(
                slice.rendered_range.is_empty(),
                "block {:?} covered by {:?}",
                span.text,
                slice
            );
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn generated_templates_align((raw, rendered) in template()) {
        let expected = rendered.clone();
        let alignment = slice_file(&raw, Syntax::Jinja, move |_: &str, _: &mut UndefinedSet| {
            Ok::<_, RenderError>(expected)
        })
        .unwrap();

        assert_mapping(&raw, &rendered, &alignment.slices)?;
        if !alignment.degraded {
            assert_blocks_render_nothing(&alignment.raw_spans, &alignment.slices)?;
        }
    }

    #[test]
    fn arbitrary_renders_still_align(raw in "[a-c{}%# ,]{0,40}", rendered in "[a-c ,]{0,40}") {
        let spans = lex(&raw, Syntax::Jinja);
        let slices = align(&raw, &spans, &rendered);
        assert_mapping(&raw, &rendered, &slices)?;
    }

    #[test]
    fn unicode_renders_still_align(raw in "\\PC{0,24}", rendered in "\\PC{0,24}") {
        let spans = lex(&raw, Syntax::PythonFormat);
        let slices = align(&raw, &spans, &rendered);
        assert_mapping(&raw, &rendered, &slices)?;
    }

    #[test]
    fn lexing_is_idempotent(raw in "[a-c{}%#\\- '\"]{0,60}") {
        for syntax in [Syntax::Jinja, Syntax::PythonFormat, Syntax::Plain] {
            let spans = lex(&raw, syntax);
            let joined: String = spans.iter().map(|s| s.text.as_str()).collect();
            prop_assert_eq!(&joined, &raw);
            prop_assert!(spans.iter().all(|s| !s.is_empty()));
            prop_assert_eq!(lex(&joined, syntax), spans);
        }
    }
}
