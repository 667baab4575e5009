use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use exstream::{ExampleParser, ParserConfig, VecSource};
use rand::Rng;
use std::hint::black_box;

const N_EXAMPLES: usize = 10_000;
const FEATURES: usize = 16;

fn make_stream() -> Vec<(Vec<f32>, f64)> {
    let mut rng = rand::rng();
    (0..N_EXAMPLES)
        .map(|_| {
            let fv = (0..FEATURES).map(|_| rng.random::<f32>()).collect();
            (fv, rng.random::<f64>())
        })
        .collect()
}

fn drain(mut parser: ExampleParser<f32>) -> f64 {
    parser.start().unwrap();
    let mut sum = 0.0;
    while let Some(example) = parser.next() {
        sum += example.label() + f64::from(example.fv()[0]);
        example.finalize();
    }
    parser.end();
    sum
}

fn bench_throughput(c: &mut Criterion) {
    let stream = make_stream();
    let mut group = c.benchmark_group("parser");
    group.throughput(Throughput::Elements(N_EXAMPLES as u64));

    group.bench_function("release_storage", |b| {
        b.iter_batched(
            || VecSource::labelled(stream.clone()),
            |source| {
                let parser = ExampleParser::new(source, ParserConfig::default());
                black_box(drain(parser))
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("reuse_storage", |b| {
        b.iter_batched(
            || VecSource::labelled(stream.clone()),
            |source| {
                let parser = ExampleParser::new(
                    source,
                    ParserConfig::default().with_free_after_release(false),
                );
                black_box(drain(parser))
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("small_ring", |b| {
        b.iter_batched(
            || VecSource::labelled(stream.clone()),
            |source| {
                let parser =
                    ExampleParser::new(source, ParserConfig::default().with_ring_capacity(8));
                black_box(drain(parser))
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_throughput);
criterion_main!(benches);
