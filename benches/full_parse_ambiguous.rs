use criterion::{black_box, criterion_group, criterion_main, Criterion};

use penley::{Grammar, Parser};

const GRAMMAR_SRC: &str = include_str!("./ambiguous.pen");

fn parse(parser: &Parser, input: &[&str]) -> usize {
  parser.parse_sentence(input).map_or(0, |trees| trees.len())
}

fn criterion_benchmark(c: &mut Criterion) {
  let grammar = GRAMMAR_SRC.parse::<Grammar>().unwrap();
  let parser = Parser::new(grammar).unwrap();
  let simple_input = "the dog saw the cat".split(' ').collect::<Vec<_>>();
  let ambiguous_input = "the dog saw the cat with the telescope in the park"
    .split(' ')
    .collect::<Vec<_>>();

  c.bench_function("parse simple", |b| {
    b.iter(|| parse(black_box(&parser), black_box(&simple_input)))
  });

  c.bench_function("parse pp attachment", |b| {
    b.iter(|| parse(black_box(&parser), black_box(&ambiguous_input)))
  });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
