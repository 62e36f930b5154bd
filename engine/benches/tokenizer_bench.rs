use criterion::{criterion_group, criterion_main, Criterion};
use engine::tokenizer::{stemming_pipeline, Tokenizer};

fn bench_tokenize(c: &mut Criterion) {
    let text = include_str!("../src/tokenizer.rs");
    let pipeline = stemming_pipeline();
    c.bench_function("tokenize_source", |b| b.iter(|| pipeline.tokenize(text).unwrap()));
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
