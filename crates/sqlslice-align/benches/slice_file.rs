//! Benchmarks for aligning large templates

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sqlslice_align::{align, lex, Syntax};

/// A model with `columns` loop-generated aggregates, rendered with `rows` iterations
fn template(columns: usize, rows: usize) -> (String, String) {
    let mut raw = String::from("select\n    id,\n");
    let mut rendered = raw.clone();

    for c in 0..columns {
        raw.push_str(&format!(
            "    {{% for v in values_{c} %}}\n    sum(case when kind = '{{{{ v }}}}' then amount end) as col_{c}_{{{{ v }}}},\n    {{% endfor %}}\n"
        ));
        for r in 0..rows {
            rendered.push_str(&format!(
                "    \n    sum(case when kind = 'v{r}' then amount end) as col_{c}_v{r},\n    "
            ));
        }
        rendered.push('\n');
    }

    raw.push_str("    count(*) as n\nfrom {{ ref('orders') }}\n");
    rendered.push_str("    count(*) as n\nfrom orders\n");
    (raw, rendered)
}

fn bench_align(c: &mut Criterion) {
    let mut group = c.benchmark_group("align");

    for columns in [10, 50, 200] {
        let (raw, rendered) = template(columns, 3);
        let spans = lex(&raw, Syntax::Jinja);
        group.bench_with_input(BenchmarkId::from_parameter(columns), &columns, |b, _| {
            b.iter(|| align(black_box(&raw), black_box(&spans), black_box(&rendered)))
        });
    }

    group.finish();
}

fn bench_lex(c: &mut Criterion) {
    let (raw, _) = template(200, 1);
    c.bench_function("lex_jinja", |b| b.iter(|| lex(black_box(&raw), Syntax::Jinja)));
}

criterion_group!(benches, bench_align, bench_lex);
criterion_main!(benches);
