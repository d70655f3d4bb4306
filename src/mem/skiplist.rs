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

// Copyright (c) 2011 The LevelDB Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::iterator::Iterator;
use crate::mem::arena::Arena;
use crate::util::comparator::Comparator;
use crate::{Error, Result};
use rand::random;
use std::cmp::Ordering as CmpOrdering;
use std::mem;
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;

const BRANCHING: u32 = 4;
pub const MAX_HEIGHT: usize = 12;

// The head node. A link holding it means "no next node" since nothing
// ever points back to the head.
const HEAD: usize = 0;

// Chunk `k` of the node vector holds `FIRST_CHUNK << k` nodes
const FIRST_CHUNK: usize = 64;
const MAX_CHUNKS: usize = 32;

/// A skiplist node. Every field is written once by the inserting thread
/// before the node is linked into the list.
#[derive(Default)]
struct Node {
    // Points into the arena. Null for the head and for empty keys
    key: AtomicPtr<u8>,
    key_len: AtomicUsize,
    height: AtomicUsize,
    // Handles of the successors on each level
    next: [AtomicUsize; MAX_HEIGHT],
}

impl Node {
    #[inline]
    fn key(&self) -> &[u8] {
        let len = self.key_len.load(Ordering::Relaxed);
        if len == 0 {
            return &[];
        }
        // The key bytes are owned by the arena which outlives every node
        unsafe { slice::from_raw_parts(self.key.load(Ordering::Relaxed), len) }
    }

    #[inline]
    fn get_next(&self, level: usize) -> Option<usize> {
        match self.next[level].load(Ordering::Acquire) {
            HEAD => None,
            n => Some(n),
        }
    }
}

/// An append-only vector of nodes addressed by handle.
///
/// Nodes are stored in chunks of growing size which are never moved or
/// freed before the vector itself, so a `&Node` stays valid while the
/// vector is alive even when other nodes are being appended.
struct NodeVec {
    chunks: [AtomicPtr<Node>; MAX_CHUNKS],
    len: AtomicUsize,
    bytes: AtomicUsize,
}

impl NodeVec {
    fn new() -> Self {
        Self {
            chunks: Default::default(),
            len: AtomicUsize::new(0),
            bytes: AtomicUsize::new(0),
        }
    }

    // Maps a handle to its chunk and the offset inside the chunk
    #[inline]
    fn locate(handle: usize) -> (usize, usize) {
        let x = handle / FIRST_CHUNK + 1;
        let chunk = (mem::size_of::<usize>() * 8 - 1) - x.leading_zeros() as usize;
        (chunk, handle - FIRST_CHUNK * ((1 << chunk) - 1))
    }

    #[inline]
    fn chunk_capacity(chunk: usize) -> usize {
        FIRST_CHUNK << chunk
    }

    /// Appends a default node and returns its handle. Single writer only.
    fn push(&self) -> usize {
        let handle = self.len.load(Ordering::Relaxed);
        let (chunk, offset) = Self::locate(handle);
        if offset == 0 && self.chunks[chunk].load(Ordering::Acquire).is_null() {
            let cap = Self::chunk_capacity(chunk);
            let nodes: Box<[Node]> = (0..cap).map(|_| Node::default()).collect();
            let p = Box::into_raw(nodes) as *mut Node;
            self.bytes
                .fetch_add(cap * mem::size_of::<Node>(), Ordering::Relaxed);
            self.chunks[chunk].store(p, Ordering::Release);
        }
        self.len.store(handle + 1, Ordering::Release);
        handle
    }

    /// REQUIRES: `handle` was returned by `push`
    #[inline]
    fn get(&self, handle: usize) -> &Node {
        let (chunk, offset) = Self::locate(handle);
        let p = self.chunks[chunk].load(Ordering::Acquire);
        debug_assert!(!p.is_null());
        unsafe { &*p.add(offset) }
    }

    #[inline]
    fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }
}

impl Drop for NodeVec {
    fn drop(&mut self) {
        for (i, chunk) in self.chunks.iter().enumerate() {
            let p = chunk.load(Ordering::Acquire);
            if !p.is_null() {
                let cap = Self::chunk_capacity(i);
                unsafe {
                    drop(Box::from_raw(ptr::slice_from_raw_parts_mut(p, cap)));
                }
            }
        }
    }
}

/// A sorted set of byte keys. Key bytes live in an arena and nodes in an
/// append-only node vector so nothing is freed until the list is dropped.
///
/// # Concurrency
///
/// Writes require external synchronization (at most one `insert` at a
/// time). Reads only need the `Skiplist` to be alive and may run in any
/// number of threads while a write is in progress.
pub struct Skiplist<C: Comparator, A: Arena> {
    // Height of the tallest node, only grows
    max_height: AtomicUsize,
    comparator: C,
    arena: Arc<A>,
    nodes: NodeVec,
}

impl<C: Comparator, A: Arena> Skiplist<C, A> {
    pub fn new(comparator: C, arena: Arc<A>) -> Self {
        let nodes = NodeVec::new();
        let head = nodes.push();
        nodes.get(head).height.store(MAX_HEIGHT, Ordering::Relaxed);
        Self {
            max_height: AtomicUsize::new(1),
            comparator,
            arena,
            nodes,
        }
    }

    /// Inserts a copy of `key`. Inserting a key that compares equal to an
    /// existing one returns `Error::Invariant`.
    pub fn insert(&self, key: &[u8]) -> Result<()> {
        self.insert_with(key.len(), |buf| buf.copy_from_slice(key))
    }

    /// Allocates `len` bytes in the arena, lets `fill` write the key into them
    /// and inserts the result.
    pub fn insert_with<F: FnOnce(&mut [u8])>(&self, len: usize, fill: F) -> Result<()> {
        let key_ptr = if len == 0 {
            fill(&mut []);
            ptr::null_mut()
        } else {
            unsafe {
                let p = self.arena.allocate(len);
                fill(slice::from_raw_parts_mut(p, len));
                p
            }
        };
        let key: &[u8] = if len == 0 {
            &[]
        } else {
            unsafe { slice::from_raw_parts(key_ptr, len) }
        };

        let mut prev = [HEAD; MAX_HEIGHT];
        if let Some(n) = self.find_greater_or_equal_with_prev(key, Some(&mut prev)) {
            if self.comparator.compare(self.node(n).key(), key) == CmpOrdering::Equal {
                return Err(Error::Invariant(format!(
                    "duplicate skiplist insertion: {:?}",
                    key
                )));
            }
        }

        let height = rand_height();
        let max_height = self.max_height.load(Ordering::Relaxed);
        if height > max_height {
            // `prev` already points to the head on the new levels. Readers
            // that see the new height before the links below just find
            // nothing there and move down.
            self.max_height.store(height, Ordering::Relaxed);
        }

        let handle = self.nodes.push();
        let node = self.nodes.get(handle);
        node.key.store(key_ptr, Ordering::Relaxed);
        node.key_len.store(len, Ordering::Relaxed);
        node.height.store(height, Ordering::Relaxed);
        for (level, p) in prev.iter().enumerate().take(height) {
            let next = self.node(*p).next[level].load(Ordering::Relaxed);
            node.next[level].store(next, Ordering::Relaxed);
        }
        // Publish bottom-up so a reader that finds the node on some level
        // also finds it on every lower level
        for (level, p) in prev.iter().enumerate().take(height) {
            self.node(*p).next[level].store(handle, Ordering::Release);
        }
        Ok(())
    }

    /// Returns true iff an entry that compares equal to `key` is in the list
    pub fn contains(&self, key: &[u8]) -> bool {
        match self.find_greater_or_equal(key) {
            Some(n) => self.comparator.compare(self.node(n).key(), key) == CmpOrdering::Equal,
            None => false,
        }
    }

    /// Returns the first node with a key >= `key`
    pub fn find_greater_or_equal(&self, key: &[u8]) -> Option<usize> {
        self.find_greater_or_equal_with_prev(key, None)
    }

    fn find_greater_or_equal_with_prev(
        &self,
        key: &[u8],
        mut prev: Option<&mut [usize; MAX_HEIGHT]>,
    ) -> Option<usize> {
        let mut level = self.max_height.load(Ordering::Relaxed) - 1;
        let mut x = HEAD;
        loop {
            let next = self.node(x).get_next(level);
            match next {
                Some(n) if self.key_is_after_node(key, n) => x = n,
                _ => {
                    if let Some(p) = prev.as_mut() {
                        p[level] = x;
                    }
                    if level == 0 {
                        return next;
                    }
                    level -= 1;
                }
            }
        }
    }

    /// Returns the last node with a key < `key`, or `None` if there is no
    /// such node
    pub fn find_less_than(&self, key: &[u8]) -> Option<usize> {
        let mut level = self.max_height.load(Ordering::Relaxed) - 1;
        let mut x = HEAD;
        loop {
            match self.node(x).get_next(level) {
                Some(n)
                    if self.comparator.compare(self.node(n).key(), key) == CmpOrdering::Less =>
                {
                    x = n
                }
                _ => {
                    if level == 0 {
                        return if x == HEAD { None } else { Some(x) };
                    }
                    level -= 1;
                }
            }
        }
    }

    /// Returns the last node in the list, or `None` if the list is empty
    pub fn find_last(&self) -> Option<usize> {
        let mut level = self.max_height.load(Ordering::Relaxed) - 1;
        let mut x = HEAD;
        loop {
            match self.node(x).get_next(level) {
                Some(n) => x = n,
                None => {
                    if level == 0 {
                        return if x == HEAD { None } else { Some(x) };
                    }
                    level -= 1;
                }
            }
        }
    }

    /// Returns the key of a node handle returned by a lookup
    #[inline]
    pub fn key(&self, handle: usize) -> &[u8] {
        self.node(handle).key()
    }

    /// Returns the node after `handle` on the bottom level
    #[inline]
    pub fn next(&self, handle: usize) -> Option<usize> {
        self.node(handle).get_next(0)
    }

    /// Returns the first node of the list
    #[inline]
    pub fn first(&self) -> Option<usize> {
        self.node(HEAD).get_next(0)
    }

    /// Number of keys in the list
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes held by the key arena and the node vector
    pub fn memory_used(&self) -> usize {
        self.arena.memory_used() + self.nodes.bytes.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    #[inline]
    fn node(&self, handle: usize) -> &Node {
        self.nodes.get(handle)
    }

    // Returns true if `key` is greater than the key of node `n`
    #[inline]
    fn key_is_after_node(&self, key: &[u8], n: usize) -> bool {
        self.comparator.compare(self.node(n).key(), key) == CmpOrdering::Less
    }
}

/// Iteration over the keys of a shared skiplist. `value()` is always empty.
pub struct SkiplistIterator<C: Comparator, A: Arena> {
    skl: Arc<Skiplist<C, A>>,
    node: Option<usize>,
}

impl<C: Comparator, A: Arena> SkiplistIterator<C, A> {
    pub fn new(skl: Arc<Skiplist<C, A>>) -> Self {
        Self { skl, node: None }
    }

    #[inline]
    fn current(&self) -> usize {
        match self.node {
            Some(n) => n,
            None => panic!("[skiplist] invalid iterator position"),
        }
    }
}

impl<C: Comparator, A: Arena> Iterator for SkiplistIterator<C, A> {
    #[inline]
    fn valid(&self) -> bool {
        self.node.is_some()
    }

    #[inline]
    fn seek_to_first(&mut self) {
        self.node = self.skl.first();
    }

    #[inline]
    fn seek_to_last(&mut self) {
        self.node = self.skl.find_last();
    }

    #[inline]
    fn seek(&mut self, target: &[u8]) {
        self.node = self.skl.find_greater_or_equal(target);
    }

    #[inline]
    fn next(&mut self) {
        self.node = self.skl.next(self.current());
    }

    #[inline]
    fn prev(&mut self) {
        // No back links, search for the last node before the current key
        let key = self.skl.key(self.current());
        self.node = self.skl.find_less_than(key);
    }

    #[inline]
    fn key(&self) -> &[u8] {
        self.skl.key(self.current())
    }

    #[inline]
    fn value(&self) -> &[u8] {
        &[]
    }

    fn status(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Generates a random height in `[1, MAX_HEIGHT]`, growing with
/// probability 1/4 at each step
fn rand_height() -> usize {
    let mut height = 1;
    while height < MAX_HEIGHT && random::<u32>() % BRANCHING == 0 {
        height += 1;
    }
    height
}
