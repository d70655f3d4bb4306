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
// found in the LICENSE file. See the AUTHORS file for names of contributors.

use crate::iterator::Iterator;
use crate::util::coding::{decode_fixed_32, put_fixed_32};
use crate::util::comparator::Comparator;
use crate::util::varint::VarintU32;
use crate::{Error, Result};
use std::cmp::{min, Ordering};
use std::sync::Arc;

const U32_LEN: usize = std::mem::size_of::<u32>();

// Upper bound of the three entry header varints plus slack
const ENTRY_OVERHEAD_ESTIMATE: usize = 30;

/// A `Block` holds a run of sorted key/value entries followed by the restart
/// array. Every entry shares a key prefix with its predecessor except at a
/// restart point, where the key is stored in full. The first restart point is
/// always at offset 0.
///
/// ```text
///
///     +-----------------+---------------------+--------------------+--------------+----------------+
///     | shared (varint) | not shared (varint) | value len (varint) | key (varlen) | value (varlen) |
///     +-----------------+---------------------+--------------------+--------------+----------------+
///     ...
///     +----------------------+-----+----------------------+-------------------------+
///     | restart 0 (fixed32)  | ... | restart N-1 (fixed32)| restarts len N (fixed32)|
///     +----------------------+-----+----------------------+-------------------------+
///
/// ```
#[derive(Clone, Debug)]
pub struct Block {
    data: Arc<Vec<u8>>,
    // offset of the restart array in `data`
    restart_offset: u32,
    restarts_len: u32,
}

impl Block {
    /// Creates a `Block` over the finished block contents.
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if the restart array does not fit in `data`
    pub fn new(data: Vec<u8>) -> Result<Self> {
        let size = data.len();
        if size >= U32_LEN {
            let max_restarts_allowed = (size - U32_LEN) / U32_LEN;
            let restarts_len = Self::restarts_len(&data);
            if restarts_len >= 1 && restarts_len as usize <= max_restarts_allowed {
                return Ok(Self {
                    data: Arc::new(data),
                    restart_offset: (size - (1 + restarts_len as usize) * U32_LEN) as u32,
                    restarts_len,
                });
            }
        }
        Err(Error::Corruption(format!(
            "[block] invalid block contents of {} bytes",
            size
        )))
    }

    /// Creates a `BlockIterator` over this block
    pub fn iter<C: Comparator>(&self, cmp: C) -> BlockIterator<C> {
        BlockIterator::new(
            cmp,
            self.data.clone(),
            self.restart_offset,
            self.restarts_len,
        )
    }

    /// Returns the size of the whole block contents
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn restarts_len(data: &[u8]) -> u32 {
        let size = data.len();
        decode_fixed_32(&data[size - U32_LEN..])
    }
}

// Decodes the entry header at `offset`. Returns `(shared, not_shared,
// value_len, header_len)` or `None` if a varint is truncated or the entry
// runs past `limit`.
fn decode_entry(data: &[u8], offset: usize, limit: usize) -> Option<(u32, u32, u32, usize)> {
    let src = &data[offset..limit];
    let (shared, n0) = VarintU32::read(src)?;
    let (not_shared, n1) = VarintU32::read(&src[n0..])?;
    let (value_len, n2) = VarintU32::read(&src[n0 + n1..])?;
    let header_len = n0 + n1 + n2;
    if header_len + not_shared as usize + value_len as usize > src.len() {
        return None;
    }
    Some((shared, not_shared, value_len, header_len))
}

/// Iterator for every entry in a `Block`
pub struct BlockIterator<C: Comparator> {
    cmp: C,
    err: Option<Error>,
    data: Arc<Vec<u8>>,

    restarts: u32,      // restart array offset, also the end of entries
    restarts_len: u32,  // number of restart points
    restart_index: u32, // restart block the `current` entry belongs to

    // offset of the current entry, `restarts` if invalid
    current: u32,

    not_shared: u32,
    value_len: u32,
    key_offset: u32, // offset of the key delta of the current entry
    // The whole key, rebuilt from the deltas
    key: Vec<u8>,
}

impl<C: Comparator> BlockIterator<C> {
    pub fn new(cmp: C, data: Arc<Vec<u8>>, restarts: u32, restarts_len: u32) -> Self {
        Self {
            cmp,
            err: None,
            data,
            restarts,
            restarts_len,
            restart_index: restarts_len,
            current: restarts,
            not_shared: 0,
            value_len: 0,
            key_offset: 0,
            key: vec![],
        }
    }

    // Returns the offset just past the end of the current entry
    #[inline]
    fn next_entry_offset(&self) -> u32 {
        self.key_offset + self.not_shared + self.value_len
    }

    #[inline]
    fn get_restart_point(&self, index: u32) -> u32 {
        decode_fixed_32(&self.data[self.restarts as usize + index as usize * U32_LEN..])
    }

    // Returns false if the restart point is out of the entry area. A block
    // without entries has its only restart point at 0.
    fn seek_to_restart_point(&mut self, index: u32) -> bool {
        self.key.clear();
        self.restart_index = index;
        let offset = self.get_restart_point(index);
        if offset > 0 && offset >= self.restarts {
            self.corruption_err(&format!("restart point {} out of range", offset));
            return false;
        }
        self.current = offset;
        true
    }

    #[inline]
    fn mark_invalid(&mut self) {
        self.current = self.restarts;
        self.restart_index = self.restarts_len;
    }

    // Decodes the entry at `current`. Returns false at the end of the
    // entries or on corruption.
    fn parse_block_entry(&mut self) -> bool {
        if self.current >= self.restarts {
            self.mark_invalid();
            return false;
        }
        let offset = self.current as usize;
        let (shared, not_shared, value_len, header_len) =
            match decode_entry(&self.data, offset, self.restarts as usize) {
                Some(header) => header,
                None => {
                    self.corruption_err("truncated entry header or entry overflows block");
                    return false;
                }
            };
        // Only the empty key at the very beginning of a block can have no delta
        if not_shared == 0 && offset != 0 {
            self.corruption_err("zero length key delta");
            return false;
        }
        if shared as usize > self.key.len() {
            self.corruption_err("shared prefix longer than the previous key");
            return false;
        }
        self.key_offset = (offset + header_len) as u32;
        self.not_shared = not_shared;
        self.value_len = value_len;
        self.key.truncate(shared as usize);
        let delta_start = self.key_offset as usize;
        self.key
            .extend_from_slice(&self.data[delta_start..delta_start + not_shared as usize]);
        if self.key.len() < self.cmp.min_key_len() {
            self.corruption_err("key too short");
            return false;
        }
        while self.restart_index + 1 < self.restarts_len
            && self.get_restart_point(self.restart_index + 1) <= self.current
        {
            self.restart_index += 1
        }
        true
    }

    // Returns the full key stored at the given restart point
    fn restart_key(&self, index: u32) -> Option<&[u8]> {
        let offset = self.get_restart_point(index) as usize;
        if offset >= self.restarts as usize {
            return None;
        }
        let (shared, not_shared, _, header_len) =
            decode_entry(&self.data, offset, self.restarts as usize)?;
        if shared != 0 || (not_shared as usize) < self.cmp.min_key_len() {
            return None;
        }
        let key_offset = offset + header_len;
        Some(&self.data[key_offset..key_offset + not_shared as usize])
    }

    fn corruption_err(&mut self, reason: &str) {
        self.err = Some(Error::Corruption(format!(
            "[block] bad entry at offset {}: {}",
            self.current, reason
        )));
        self.key.clear();
        self.mark_invalid();
    }

    #[inline]
    fn valid_or_panic(&self) {
        if !self.valid() {
            panic!(
                "[block iterator] invalid data offset {}: overflows the restart array at {}",
                self.current, self.restarts
            )
        }
    }
}

impl<C: Comparator> Iterator for BlockIterator<C> {
    #[inline]
    fn valid(&self) -> bool {
        self.err.is_none() && self.current < self.restarts
    }

    fn seek_to_first(&mut self) {
        if self.seek_to_restart_point(0) {
            self.parse_block_entry();
        }
    }

    fn seek_to_last(&mut self) {
        if !self.seek_to_restart_point(self.restarts_len - 1) {
            return;
        }
        while self.parse_block_entry() && self.next_entry_offset() < self.restarts {
            self.current = self.next_entry_offset()
        }
    }

    // Finds the first entry with key >= target
    fn seek(&mut self, target: &[u8]) {
        // Binary search for the last restart point with a key < target
        let mut left = 0;
        let mut right = self.restarts_len - 1;
        while left < right {
            let mid = (left + right + 1) / 2;
            let ordering = match self.restart_key(mid) {
                Some(mid_key) => self.cmp.compare(mid_key, target),
                None => {
                    self.corruption_err("bad restart point");
                    return;
                }
            };
            match ordering {
                Ordering::Less => left = mid,
                _ => right = mid - 1,
            }
        }
        // Linear scan within the restart block
        if !self.seek_to_restart_point(left) {
            return;
        }
        loop {
            if !self.parse_block_entry() {
                return;
            }
            if self.cmp.compare(&self.key, target) != Ordering::Less {
                return;
            }
            self.current = self.next_entry_offset();
        }
    }

    fn next(&mut self) {
        self.valid_or_panic();
        self.current = self.next_entry_offset();
        self.parse_block_entry();
    }

    // Scans forward from the restart point before the current entry
    fn prev(&mut self) {
        self.valid_or_panic();
        let original = self.current;
        while self.get_restart_point(self.restart_index) >= original {
            if self.restart_index == 0 {
                // No more entries
                self.mark_invalid();
                return;
            }
            self.restart_index -= 1
        }
        if !self.seek_to_restart_point(self.restart_index) {
            return;
        }
        while self.parse_block_entry() && self.next_entry_offset() < original {
            self.current = self.next_entry_offset()
        }
    }

    fn key(&self) -> &[u8] {
        self.valid_or_panic();
        &self.key
    }

    fn value(&self) -> &[u8] {
        self.valid_or_panic();
        let val_offset = (self.key_offset + self.not_shared) as usize;
        &self.data[val_offset..val_offset + self.value_len as usize]
    }

    fn status(&mut self) -> Result<()> {
        match self.err.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// `BlockBuilder` generates blocks where keys are prefix-compressed.
///
/// When a key is stored, the prefix shared with the previous key is dropped.
/// Once every `block_restart_interval` keys the compression restarts and the
/// full key is stored. The offsets of these restart points are written at
/// the tail of the block for binary search. Values are stored as-is right
/// after their keys.
pub struct BlockBuilder<C: Comparator> {
    block_restart_interval: usize,
    cmp: C,
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    // number of entries emitted since the last restart
    counter: usize,
    finished: bool,
    last_key: Vec<u8>,
}

impl<C: Comparator> BlockBuilder<C> {
    pub fn new(block_restart_interval: usize, cmp: C) -> Self {
        assert!(
            block_restart_interval >= 1,
            "[block builder] invalid 'block_restart_interval' {} ",
            block_restart_interval,
        );
        Self {
            block_restart_interval,
            cmp,
            buffer: vec![],
            finished: false,
            counter: 0,
            restarts: vec![0; 1],
            last_key: vec![],
        }
    }

    /// Returns the size of the block if it was finished right now
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * U32_LEN + U32_LEN
    }

    /// Returns a conservative upper bound of the block size after adding the
    /// given entry
    pub fn assume_block_size(&self, key: &[u8], value: &[u8]) -> usize {
        self.buffer.len()
            + ENTRY_OVERHEAD_ESTIMATE
            + key.len()
            + value.len()
            + (self.restarts.len() + 1) * U32_LEN
    }

    /// Returns the last key added since the last `reset()`
    #[inline]
    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }

    /// Appends the restart array and returns the block contents
    pub fn finish(&mut self) -> &[u8] {
        for restart in self.restarts.iter() {
            put_fixed_32(&mut self.buffer, *restart)
        }
        put_fixed_32(&mut self.buffer, self.restarts.len() as u32);
        self.finished = true;
        &self.buffer
    }

    /// Appends an entry to the block. `key` must be larger than any
    /// previously added key.
    ///
    /// # Panics
    ///
    /// Panics if the builder has been finished
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        assert!(
            !self.finished,
            "[block builder] add key value to a finished BlockBuilder "
        );
        debug_assert!(
            self.buffer.is_empty() || self.cmp.compare(key, &self.last_key) == Ordering::Greater,
            "[block builder] inconsistent new key [{:?}] compared to last_key {:?}",
            key,
            &self.last_key
        );
        let mut shared = 0;
        if self.counter < self.block_restart_interval {
            let min_len = min(self.last_key.len(), key.len());
            while shared < min_len && self.last_key[shared] == key[shared] {
                shared += 1
            }
        } else {
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
        }
        let non_shared = key.len() - shared;

        VarintU32::put_varint(&mut self.buffer, shared as u32);
        VarintU32::put_varint(&mut self.buffer, non_shared as u32);
        VarintU32::put_varint(&mut self.buffer, value.len() as u32);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        self.counter += 1
    }

    /// Returns true iff no entries have been added since the last `reset()`
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clears the builder so it can be used for another block
    #[inline]
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.finished = false;
        self.counter = 0;
        self.restarts = vec![0; 1];
        self.last_key.clear();
    }
}
