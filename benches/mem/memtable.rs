use criterion::{BatchSize, Bencher, BenchmarkId, Criterion};
use rand::Rng;
use strata::{BytewiseComparator, InternalKeyComparator, LookupKey, MemTable, ValueType};

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("MemTable::add");
    for value_len in vec![16, 128, 1024] {
        group.bench_with_input(
            BenchmarkId::from_parameter(value_len),
            &value_len,
            |b: &mut Bencher, value_len| {
                let mem = MemTable::new(InternalKeyComparator::<BytewiseComparator>::default());
                let value = vec![b'v'; *value_len];
                let mut seq = 0u64;
                let mut rng = rand::thread_rng();
                b.iter_batched(
                    || format!("key{:016}", rng.gen::<u64>()),
                    |key| {
                        seq += 1;
                        let _ = mem.add(seq, ValueType::Value, key.as_bytes(), &value);
                    },
                    BatchSize::SmallInput,
                )
            },
        );
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mem = MemTable::new(InternalKeyComparator::<BytewiseComparator>::default());
    for i in 0..100_000u64 {
        let key = format!("key{:08}", i);
        let _ = mem.add(i + 1, ValueType::Value, key.as_bytes(), b"value");
    }
    c.bench_function("MemTable::get", |b| {
        let mut rng = rand::thread_rng();
        b.iter(|| {
            let key = format!("key{:08}", rng.gen_range(0, 200_000));
            mem.get(&LookupKey::new(key.as_bytes(), 200_000)).is_some()
        })
    });
}

pub fn bench_memtable(c: &mut Criterion) {
    bench_add(c);
    bench_get(c);
}
