use criterion::{BatchSize, Bencher, BenchmarkId, Criterion};
use strata::mem::arena::{Arena, BlockArena};

static CHUNK_SIZE: [usize; 6] = [8, 64, 256, 1024, 4096, 10000];

fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("BlockArena::allocate");
    for size in CHUNK_SIZE.iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            size,
            |b: &mut Bencher, size| {
                b.iter_batched(
                    BlockArena::default,
                    |arena| unsafe {
                        for _ in 0..64 {
                            arena.allocate(*size);
                        }
                        arena
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

fn bench_allocate_aligned(c: &mut Criterion) {
    let mut group = c.benchmark_group("BlockArena::allocate_aligned");
    for size in CHUNK_SIZE.iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            size,
            |b: &mut Bencher, size| {
                b.iter_batched(
                    BlockArena::default,
                    |arena| unsafe {
                        for _ in 0..64 {
                            // odd sizes keep the bump pointer misaligned
                            arena.allocate_aligned(*size + 1);
                        }
                        arena
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

pub fn bench_arena(c: &mut Criterion) {
    bench_allocate(c);
    bench_allocate_aligned(c);
}
