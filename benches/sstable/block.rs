use criterion::{BenchmarkId, Criterion};
use strata::iterator::Iterator;
use strata::sstable::block::{Block, BlockBuilder};
use strata::BytewiseComparator;

fn sorted_entries(n: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..n)
        .map(|i| {
            (
                format!("user_key_{:010}", i).into_bytes(),
                format!("value_{}", i).into_bytes(),
            )
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("BlockBuilder::finish");
    let entries = sorted_entries(256);
    for interval in vec![1, 16, 128] {
        group.bench_with_input(
            BenchmarkId::from_parameter(interval),
            &interval,
            |b, interval| {
                let mut builder = BlockBuilder::new(*interval, BytewiseComparator::default());
                b.iter(|| {
                    builder.reset();
                    for (k, v) in entries.iter() {
                        builder.add(k, v);
                    }
                    builder.finish().len()
                })
            },
        );
    }
    group.finish();
}

fn bench_seek(c: &mut Criterion) {
    let entries = sorted_entries(256);
    let mut builder = BlockBuilder::new(16, BytewiseComparator::default());
    for (k, v) in entries.iter() {
        builder.add(k, v);
    }
    let block = match Block::new(builder.finish().to_vec()) {
        Ok(b) => b,
        Err(e) => panic!("invalid block: {}", e),
    };
    c.bench_function("BlockIterator::seek", |b| {
        let mut iter = block.iter(BytewiseComparator::default());
        let mut i = 0;
        b.iter(|| {
            i = (i + 97) % entries.len();
            iter.seek(&entries[i].0);
            iter.valid()
        })
    });
}

pub fn bench_block(c: &mut Criterion) {
    bench_build(c);
    bench_seek(c);
}
