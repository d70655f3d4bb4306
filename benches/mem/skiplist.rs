use criterion::{BatchSize, Bencher, BenchmarkId, Criterion};
use rand::Rng;
use std::sync::Arc;
use strata::iterator::Iterator;
use strata::mem::arena::BlockArena;
use strata::mem::skiplist::{Skiplist, SkiplistIterator};
use strata::BytewiseComparator;

fn new_skiplist() -> Skiplist<BytewiseComparator, BlockArena> {
    Skiplist::new(BytewiseComparator::default(), Arc::new(BlockArena::default()))
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("Skiplist::insert");
    let key_len = vec![8, 100, 500, 1000, 4000, 10000];
    for len in key_len {
        group.bench_with_input(
            BenchmarkId::from_parameter(len),
            &len,
            |b: &mut Bencher, length| {
                let skl = new_skiplist();
                let mut rng = rand::thread_rng();
                b.iter_batched(
                    || (0..*length).map(|_| rng.gen::<u8>()).collect::<Vec<u8>>(),
                    // random keys rarely collide, a duplicate is simply rejected
                    |key| {
                        let _ = skl.insert(&key);
                    },
                    BatchSize::SmallInput,
                )
            },
        );
    }
    group.finish();
}

fn bench_seek(c: &mut Criterion) {
    let skl = Arc::new(new_skiplist());
    for i in 0..100_000u32 {
        let _ = skl.insert(format!("key{:08}", i * 2).as_bytes());
    }
    c.bench_function("Skiplist::seek", |b| {
        let mut iter = SkiplistIterator::new(skl.clone());
        let mut rng = rand::thread_rng();
        b.iter(|| {
            let target = format!("key{:08}", rng.gen_range(0, 200_000));
            iter.seek(target.as_bytes());
            iter.valid()
        })
    });
}

pub fn bench_skiplist(c: &mut Criterion) {
    bench_insert(c);
    bench_seek(c);
}
