use chunked_batches::{BatchGenerator, ColumnData, GeneratorConfig, InMemorySource};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

/// Benchmarks for one full epoch through `BatchGenerator`.
///
/// This measures:
/// 1. Chunk size: how the read/shuffle/slice pipeline scales with chunk size
/// 2. Shuffling: the cost of range and row shuffling against a sequential pass
///
/// To run these, use:
/// ```bash
/// cargo bench -p chunked_batches
/// ```

/// Dataset sizes swept by every benchmark.
const SIZES: [usize; 3] = [10_000, 100_000, 1_000_000];

const NUM_FEATURES: usize = 8;

/// Builds an in-memory dataset with `NUM_FEATURES` float columns and one label.
fn make_source(rows: usize) -> Arc<InMemorySource> {
    let mut source = InMemorySource::new();
    for f in 0..NUM_FEATURES {
        let values = (0..rows).map(|i| (i * (f + 1)) as f32).collect();
        source = source
            .with_column(format!("f{f}"), ColumnData::Float32(values))
            .unwrap();
    }
    let labels = (0..rows).map(|i| (i % 10) as i32).collect();
    Arc::new(source.with_column("label", ColumnData::Int32(labels)).unwrap())
}

/// Runs one epoch and returns the number of rows delivered.
fn run_epoch(source: &Arc<InMemorySource>, config: GeneratorConfig) -> usize {
    let generator = BatchGenerator::from_shared(Arc::clone(source), config).unwrap();
    let active = generator.activation().unwrap();
    let epoch = active.epoch().unwrap();
    let mut rows = 0;
    for batch in epoch.train_batches() {
        let batch = batch.unwrap();
        rows += black_box(batch.features().to_row_major_f32()).len() / NUM_FEATURES;
    }
    for batch in epoch.validation_batches() {
        rows += batch.unwrap().len();
    }
    rows
}

fn config(chunk_size: usize, shuffle: bool) -> GeneratorConfig {
    GeneratorConfig::builder()
        .chunk_size(chunk_size)
        .range_size(1_000)
        .batch_size(256)
        .validation_split(0.2)
        .target_columns(["label"])
        .shuffle(shuffle)
        .seed(42)
        .build()
}

/// Measure a full epoch across chunk sizes
fn bench_chunk_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("Epoch By Chunk Size");
    let rows = SIZES[1];
    let source = make_source(rows);
    group.throughput(Throughput::Elements(rows as u64));

    for chunk_size in [1_000, 10_000, 50_000] {
        group.bench_with_input(BenchmarkId::new("chunk", chunk_size), &chunk_size, |b, &chunk| {
            b.iter(|| run_epoch(&source, config(chunk, true)))
        });
    }
    group.finish();
}

/// Measure shuffled against sequential epochs
fn bench_shuffle(c: &mut Criterion) {
    let mut group = c.benchmark_group("Shuffle Overhead");
    for &rows in &SIZES {
        let source = make_source(rows);
        group.throughput(Throughput::Elements(rows as u64));

        group.bench_with_input(BenchmarkId::new("sequential", rows), &rows, |b, &_r| {
            b.iter(|| run_epoch(&source, config(10_000, false)))
        });

        group.bench_with_input(BenchmarkId::new("shuffled", rows), &rows, |b, &_r| {
            b.iter(|| run_epoch(&source, config(10_000, true)))
        });
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .warm_up_time(std::time::Duration::from_secs(2))
        .measurement_time(std::time::Duration::from_secs(5))
        .sample_size(20);
    targets = bench_chunk_size, bench_shuffle
);
criterion_main!(benches);
