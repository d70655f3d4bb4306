use criterion::{BenchmarkId, Criterion};
use strata::{BloomFilter, FilterPolicy};

fn bench_create_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("BloomFilter::create_filter");
    let policy = BloomFilter::new(10);
    for n in vec![100, 1000, 10000] {
        let keys: Vec<Vec<u8>> = (0..n as u32).map(|i| i.to_le_bytes().to_vec()).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &keys, |b, keys| {
            b.iter(|| policy.create_filter(keys))
        });
    }
    group.finish();
}

fn bench_may_contain(c: &mut Criterion) {
    let policy = BloomFilter::new(10);
    let keys: Vec<Vec<u8>> = (0..10000u32).map(|i| i.to_le_bytes().to_vec()).collect();
    let filter = policy.create_filter(&keys);
    c.bench_function("BloomFilter::may_contain", |b| {
        let mut i = 0u32;
        b.iter(|| {
            i = i.wrapping_add(7);
            policy.may_contain(&filter, &i.to_le_bytes())
        })
    });
}

pub fn bench_bloom(c: &mut Criterion) {
    bench_create_filter(c);
    bench_may_contain(c);
}
