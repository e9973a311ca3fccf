use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pcfg::Parser;

const GRAMMAR_SRC: &str = include_str!("./weather.pcfg");

fn parse(p: &Parser, input: &[&str]) -> bool {
  p.parse(input).is_some()
}

fn criterion_benchmark(c: &mut Criterion) {
  let parser = GRAMMAR_SRC.parse::<Parser>().unwrap();
  let simple_input = "weather in seattle".split(' ').collect::<Vec<_>>();
  let complex_input = "what is the weather going to be like in beijing tomorrow"
    .split(' ')
    .collect::<Vec<_>>();

  c.bench_function("parse simple query", |b| {
    b.iter(|| parse(black_box(&parser), black_box(&simple_input)))
  });

  c.bench_function("parse long optional query", |b| {
    b.iter(|| parse(black_box(&parser), black_box(&complex_input)))
  });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
