use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pullmetrics::{CounterDef, HistogramDef, Metrics};

const ONE_TAG: CounterDef = CounterDef::new("benchmarks_one_tag_total", "one tag");
const EIGHT_TAGS: CounterDef = CounterDef::new("benchmarks_eight_tags_total", "eight tags");
const LATENCY: HistogramDef = HistogramDef::new("benchmarks_latency_seconds", "latency");
const BOUNDS: [f64; 6] = [0.005, 0.01, 0.05, 0.1, 0.5, 1.0];

pub fn benchmark_resolve(c: &mut Criterion) {
    let metrics = Metrics::new();
    let one = ONE_TAG.register(&metrics, &[]).unwrap();
    let eight = EIGHT_TAGS.register(&metrics, &[("service", "bench")]).unwrap();
    c.bench_function("resolve-1-tag-new", |b| {
        let mut values = (0i64..).map(|i| i.to_string());
        b.iter(|| {
            let value = values.next().unwrap();
            one.add(&[("tag", value.as_str())]).unwrap()
        })
    });
    c.bench_function("resolve-1-tag-existing", |b| {
        let _counter = black_box(one.add(&[("tag", "one")]).unwrap());
        b.iter(|| one.add(&[("tag", "one")]).unwrap());
    });
    c.bench_function("resolve-8-tags", |b| {
        b.iter(|| {
            eight
                .add(&[
                    ("one", "1"),
                    ("two", "2"),
                    ("three", "3"),
                    ("four", "4"),
                    ("five", "5"),
                    ("six", "6"),
                    ("seven", "7"),
                ])
                .unwrap()
        });
    });
}

pub fn benchmark_counter(c: &mut Criterion) {
    let metrics = Metrics::new();
    let family = ONE_TAG.register(&metrics, &[]).unwrap();
    c.bench_function("counter-incr-by-name", |b| {
        b.iter(|| metrics.increment(ONE_TAG.name(), &[("tag", "one")], 1.0));
    });
    c.bench_function("counter-incr-cached", |b| {
        let counter = family.add(&[("tag", "one")]).unwrap();
        b.iter(|| counter.incr());
    });
    c.bench_function("counter-clone", |b| {
        let counter = family.add(&[("tag", "one")]).unwrap();
        b.iter(|| black_box(counter.clone()));
    });
}

pub fn benchmark_histogram(c: &mut Criterion) {
    let metrics = Metrics::new();
    let family = LATENCY.register(&metrics, &[]).unwrap();
    c.bench_function("histogram-observe-by-name", |b| {
        b.iter(|| metrics.observe(LATENCY.name(), &[("tag", "one")], 0.07, &BOUNDS));
    });
    c.bench_function("histogram-record-cached", |b| {
        let histogram = family.add(&[("tag", "one")], &BOUNDS).unwrap();
        b.iter(|| histogram.record(black_box(0.07)));
    });
}

pub fn benchmark_render(c: &mut Criterion) {
    let metrics = Metrics::new();
    let family = ONE_TAG.register(&metrics, &[]).unwrap();
    for i in 0..1000 {
        let tag = i.to_string();
        family.add(&[("tag", tag.as_str())]).unwrap().incr();
    }
    c.bench_function("render-1000-instances", |b| {
        b.iter(|| black_box(metrics.render()));
    });
}

criterion_group!(
    benches,
    benchmark_resolve,
    benchmark_counter,
    benchmark_histogram,
    benchmark_render
);
criterion_main!(benches);
