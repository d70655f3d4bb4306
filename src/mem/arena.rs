// Copyright 2019 Fullstop000 <fullstop1005@gmail.com>.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

use std::mem;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::Mutex;

pub(crate) const BLOCK_SIZE: usize = 4096;

const ALIGN: usize = if mem::size_of::<usize>() > 8 {
    mem::size_of::<usize>()
} else {
    8
};

pub trait Arena: Send + Sync {
    /// Returns a pointer to a newly allocated memory block of `chunk` bytes.
    ///
    /// # Safety
    ///
    /// The memory lives as long as the arena and is never aliased by another
    /// allocation. Callers must not touch it after the arena is dropped.
    unsafe fn allocate(&self, chunk: usize) -> *mut u8;

    /// Like `allocate` but the returned pointer is aligned to the pointer
    /// size (at least 8 bytes).
    ///
    /// # Safety
    ///
    /// See `allocate`
    unsafe fn allocate_aligned(&self, chunk: usize) -> *mut u8;

    /// Returns an estimate of the total memory held by the arena.
    fn memory_used(&self) -> usize;
}

/// `BlockArena` hands out memory from 4KB blocks with a bump pointer.
/// Memory is only given back when the whole arena is dropped.
///
/// # NOTICE:
///
/// Allocation must be done by one thread at a time. `memory_used` can be
/// read from any thread.
#[derive(Default)]
pub struct BlockArena {
    ptr: AtomicPtr<u8>,
    bytes_remaining: AtomicUsize,
    // u64 words keep every block start 8 bytes aligned
    blocks: Mutex<Vec<Vec<u64>>>,
    memory_usage: AtomicUsize,
}

impl BlockArena {
    fn allocate_fallback(&self, size: usize) -> *mut u8 {
        if size > BLOCK_SIZE / 4 {
            // Object is more than a quarter of our block size.  Allocate it separately
            // to avoid wasting too much space in leftover bytes.
            return self.allocate_new_block(size);
        }
        // The rest of the current block is wasted
        let new_block_ptr = self.allocate_new_block(BLOCK_SIZE);
        unsafe {
            self.ptr.store(new_block_ptr.add(size), Ordering::Release);
        }
        self.bytes_remaining
            .store(BLOCK_SIZE - size, Ordering::Release);
        new_block_ptr
    }

    fn allocate_new_block(&self, block_bytes: usize) -> *mut u8 {
        let words = (block_bytes + 7) / 8;
        let mut new_block = vec![0u64; words];
        let p = new_block.as_mut_ptr() as *mut u8;
        self.blocks.lock().unwrap().push(new_block);
        self.memory_usage
            .fetch_add(block_bytes + mem::size_of::<usize>(), Ordering::Relaxed);
        p
    }

    #[cfg(test)]
    fn block_count(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }
}

impl Arena for BlockArena {
    unsafe fn allocate(&self, chunk: usize) -> *mut u8 {
        assert!(chunk > 0, "zero-sized arena allocation");
        let remaining = self.bytes_remaining.load(Ordering::Acquire);
        if chunk <= remaining {
            let p = self.ptr.load(Ordering::Acquire);
            self.ptr.store(p.add(chunk), Ordering::Release);
            self.bytes_remaining
                .store(remaining - chunk, Ordering::Release);
            return p;
        }
        self.allocate_fallback(chunk)
    }

    unsafe fn allocate_aligned(&self, chunk: usize) -> *mut u8 {
        assert!(chunk > 0, "zero-sized arena allocation");
        let current = self.ptr.load(Ordering::Acquire);
        let current_mod = current as usize & (ALIGN - 1);
        let slop = if current_mod == 0 {
            0
        } else {
            ALIGN - current_mod
        };
        let needed = chunk + slop;
        let remaining = self.bytes_remaining.load(Ordering::Acquire);
        let result = if needed <= remaining && !current.is_null() {
            let p = current.add(slop);
            self.ptr.store(p.add(chunk), Ordering::Release);
            self.bytes_remaining
                .store(remaining - needed, Ordering::Release);
            p
        } else {
            // a fresh block always starts aligned
            self.allocate_fallback(chunk)
        };
        debug_assert_eq!(result as usize & (ALIGN - 1), 0);
        result
    }

    #[inline]
    fn memory_used(&self) -> usize {
        self.memory_usage.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::ptr;
    use std::sync::Arc;
    use std::thread;

    const PTR: usize = mem::size_of::<usize>();

    #[test]
    fn test_new_arena() {
        let a = BlockArena::default();
        assert_eq!(a.memory_used(), 0);
        assert_eq!(a.bytes_remaining.load(Ordering::Acquire), 0);
        assert_eq!(a.ptr.load(Ordering::Acquire), ptr::null_mut());
        assert_eq!(a.block_count(), 0);
    }

    #[test]
    #[should_panic]
    fn test_allocate_empty_should_panic() {
        let a = BlockArena::default();
        unsafe { a.allocate(0) };
    }

    #[test]
    fn test_allocate_new_block() {
        let a = BlockArena::default();
        let mut expect_size = 0;
        for (i, size) in [1, 128, 256, 1000, 4096, 10000].iter().enumerate() {
            a.allocate_new_block(*size);
            expect_size += *size + PTR;
            assert_eq!(a.memory_used(), expect_size, "memory used should match");
            assert_eq!(a.block_count(), i + 1, "number of blocks should match")
        }
    }

    #[test]
    fn test_allocate_fallback() {
        let a = BlockArena::default();
        unsafe { a.allocate(1) };
        assert_eq!(a.memory_used(), BLOCK_SIZE + PTR);
        assert_eq!(a.bytes_remaining.load(Ordering::Acquire), BLOCK_SIZE - 1);
        unsafe { a.allocate(BLOCK_SIZE - 101) };
        assert_eq!(a.bytes_remaining.load(Ordering::Acquire), 100);
        // a large object gets its own block and the current block is kept
        unsafe { a.allocate(BLOCK_SIZE / 4 + 1) };
        assert_eq!(
            a.memory_used(),
            BLOCK_SIZE + BLOCK_SIZE / 4 + 1 + 2 * PTR
        );
        assert_eq!(a.bytes_remaining.load(Ordering::Acquire), 100);
        // a small object that doesn't fit starts a new standard block
        unsafe { a.allocate(200) };
        assert_eq!(a.block_count(), 3);
        assert_eq!(a.bytes_remaining.load(Ordering::Acquire), BLOCK_SIZE - 200);
    }

    #[test]
    fn test_allocate_aligned() {
        let a = BlockArena::default();
        for size in [1, 3, 7, 9, 100, 1025, 5000].iter() {
            unsafe { a.allocate(*size) };
            let p = unsafe { a.allocate_aligned(*size) };
            assert_eq!(p as usize % ALIGN, 0, "size {}", size);
        }
    }

    #[test]
    fn test_allocate_mixed() {
        let a = BlockArena::default();
        let mut allocated = vec![];
        let mut allocated_size = 0;
        let n = 10000;
        let mut r = rand::thread_rng();
        for i in 1..n {
            let size = if i % (n / 10) == 0 {
                i
            } else if i == 1 {
                1
            } else {
                r.gen_range(1, i.min(100) + 1)
            };
            let ptr = unsafe {
                if i % 10 == 0 {
                    a.allocate_aligned(size)
                } else {
                    a.allocate(size)
                }
            };
            unsafe {
                for j in 0..size {
                    *ptr.add(j) = (i % 256) as u8;
                }
            }
            allocated_size += size;
            allocated.push((ptr, size, i));
            assert!(
                a.memory_used() >= allocated_size,
                "the memory used {} should be greater or equal to expecting allocated {}",
                a.memory_used(),
                allocated_size
            );
            if i > n / 10 {
                assert!(a.memory_used() as f64 <= allocated_size as f64 * 1.1);
            }
        }
        for (ptr, size, i) in allocated.iter() {
            unsafe {
                for j in 0..*size {
                    assert_eq!(*ptr.add(j), (i % 256) as u8);
                }
            }
        }
    }

    #[test]
    fn test_memory_used_from_other_thread() {
        let a = Arc::new(BlockArena::default());
        unsafe { a.allocate(100) };
        let reader = a.clone();
        let used = thread::spawn(move || reader.memory_used())
            .join()
            .unwrap();
        assert_eq!(used, BLOCK_SIZE + PTR);
    }
}
