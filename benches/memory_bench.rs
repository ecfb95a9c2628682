use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tokio::runtime::Runtime;

use cmsbench::backend::{Backend, MemoryBackend};
use cmsbench::core::LogicalQuery;
use cmsbench::dataset::{Dataset, generate_records};
use cmsbench::runner::prepare_tier;

const NUM_RECORDS: usize = 100_000;
const RNG_SEED: u64 = 42;

fn bench_queries(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dataset = Dataset::from_records(generate_records(NUM_RECORDS, RNG_SEED));
    let backend = MemoryBackend::default();
    rt.block_on(prepare_tier(&backend, &dataset, dataset.len()))
        .unwrap();

    let mut group = c.benchmark_group("memory_query");
    for query in LogicalQuery::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(query), &query, |b, &query| {
            b.to_async(&rt)
                .iter(|| async { black_box(backend.run_query(query).await.unwrap()) });
        });
    }
    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dataset = Dataset::from_records(generate_records(NUM_RECORDS, RNG_SEED));

    let mut group = c.benchmark_group("memory_load");
    group.sample_size(10);
    for tier in [25_000, 50_000, 100_000] {
        group.throughput(Throughput::Elements(tier as u64));
        group.bench_with_input(BenchmarkId::from_parameter(tier), &tier, |b, &tier| {
            let backend = MemoryBackend::default();
            b.to_async(&rt)
                .iter(|| async { black_box(prepare_tier(&backend, &dataset, tier).await.unwrap()) });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_queries, bench_load);
criterion_main!(benches);
