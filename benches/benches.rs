use criterion::Criterion;
use std::time::Duration;

mod mem;
mod sstable;

fn main() {
    let mut c = Criterion::default()
        // Configure defaults before overriding with args.
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(1))
        .configure_from_args();
    mem::arena::bench_arena(&mut c);
    mem::skiplist::bench_skiplist(&mut c);
    mem::memtable::bench_memtable(&mut c);
    sstable::block::bench_block(&mut c);
    sstable::bloom::bench_bloom(&mut c);
    c.final_summary();
}
