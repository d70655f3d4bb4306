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

use crate::filter::FilterPolicy;
use crate::util::coding::{decode_fixed_32, put_fixed_32};
use crate::{Error, Result};
use std::sync::Arc;

const FILTER_OFFSET_LEN: usize = 4;
// 4 bytes total filter data size + 4 bytes filter count
const FILTER_META_LENGTH: usize = 8;

/// A `FilterBlockBuilder` constructs the filters of a table, one filter per
/// data block. The result is stored as a raw block in the table:
///
/// ```text
/// | filter 0 | ... | filter N-1 | end offset 0 | ... | end offset N-1 | data size | N |
///                                  fixed32             fixed32        fixed32  fixed32
/// ```
pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    // keys of the data block being built
    keys: Vec<Vec<u8>>,
    // filter data computed so far, the trailer is only appended in `finish`
    data: Vec<u8>,
    // the end offset of every filter in `data`
    filter_offsets: Vec<u32>,
}

impl FilterBlockBuilder {
    pub fn new(policy: Arc<dyn FilterPolicy>) -> Self {
        Self {
            policy,
            keys: vec![],
            filter_offsets: vec![],
            data: vec![],
        }
    }

    /// Adds a key of the current data block
    pub fn add_key(&mut self, key: &[u8]) {
        self.keys.push(Vec::from(key));
    }

    /// Builds the filter of the keys added since the last call. Called once
    /// per flushed data block so filter `i` covers data block `i`.
    pub fn generate_filter(&mut self) {
        let filter = self.policy.create_filter(&self.keys);
        self.data.extend(filter);
        self.filter_offsets.push(self.data.len() as u32);
        self.keys.clear();
    }

    /// Returns the number of filters generated so far
    #[inline]
    pub fn num_filters(&self) -> usize {
        self.filter_offsets.len()
    }

    /// Appends the trailer and returns the filter block contents
    pub fn finish(&mut self) -> &[u8] {
        if !self.keys.is_empty() {
            self.generate_filter();
        }
        let data_size = self.data.len() as u32;
        for offset in self.filter_offsets.iter() {
            put_fixed_32(&mut self.data, *offset);
        }
        put_fixed_32(&mut self.data, data_size);
        put_fixed_32(&mut self.data, self.filter_offsets.len() as u32);
        &self.data
    }
}

pub struct FilterBlockReader {
    policy: Arc<dyn FilterPolicy>,
    // | ----- filter data ----- | ----- filter end offsets ----| meta |
    data: Vec<u8>,
    data_size: usize,
    num: usize,
}

impl FilterBlockReader {
    /// Validates the trailer of `filter_block` and creates a reader over it
    pub fn new(policy: Arc<dyn FilterPolicy>, filter_block: Vec<u8>) -> Result<Self> {
        let n = filter_block.len();
        if n < FILTER_META_LENGTH {
            return Err(Error::Corruption(format!(
                "[filter block] too short: {} bytes",
                n
            )));
        }
        let data_size = decode_fixed_32(&filter_block[n - FILTER_META_LENGTH..]) as usize;
        let num = decode_fixed_32(&filter_block[n - FILTER_OFFSET_LEN..]) as usize;
        if data_size + num * FILTER_OFFSET_LEN + FILTER_META_LENGTH != n {
            return Err(Error::Corruption(format!(
                "[filter block] bad trailer: {} filters with {} bytes data in a {} bytes block",
                num, data_size, n
            )));
        }
        let r = Self {
            policy,
            data: filter_block,
            data_size,
            num,
        };
        let mut last = 0;
        for i in 0..num {
            let end = r.filter_end(i);
            if end < last || end > data_size {
                return Err(Error::Corruption(format!(
                    "[filter block] filter {} ends at {} out of [{}, {}]",
                    i, end, last, data_size
                )));
            }
            last = end;
        }
        Ok(r)
    }

    #[inline]
    fn filter_end(&self, index: usize) -> usize {
        let pos = self.data_size + index * FILTER_OFFSET_LEN;
        decode_fixed_32(&self.data[pos..pos + FILTER_OFFSET_LEN]) as usize
    }

    /// Returns the number of filters in the block
    #[inline]
    pub fn len(&self) -> usize {
        self.num
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num == 0
    }

    /// Returns false only if `key` is definitely absent from the data block
    /// at `block_index`
    pub fn key_may_match(&self, block_index: usize, key: &[u8]) -> bool {
        if block_index >= self.num {
            // Treated as a potential match so the data block gets read
            return true;
        }
        let start = if block_index == 0 {
            0
        } else {
            self.filter_end(block_index - 1)
        };
        let end = self.filter_end(block_index);
        self.policy.may_contain(&self.data[start..end], key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::bloom::BloomFilter;
    use crate::util::hash::hash;

    struct TestHashFilter {}

    impl FilterPolicy for TestHashFilter {
        fn name(&self) -> &str {
            "TestHashFilter"
        }

        fn may_contain(&self, filter: &[u8], key: &[u8]) -> bool {
            let h = hash(key, 1);
            filter
                .chunks(4)
                .any(|chunk| chunk.len() == 4 && decode_fixed_32(chunk) == h)
        }

        fn create_filter(&self, keys: &[Vec<u8>]) -> Vec<u8> {
            let mut f = vec![];
            for key in keys {
                put_fixed_32(&mut f, hash(key, 1));
            }
            f
        }
    }

    fn new_test_builder() -> FilterBlockBuilder {
        FilterBlockBuilder::new(Arc::new(TestHashFilter {}))
    }

    fn new_test_reader(block: &[u8]) -> FilterBlockReader {
        FilterBlockReader::new(Arc::new(TestHashFilter {}), Vec::from(block)).unwrap()
    }

    #[test]
    fn test_empty_builder() {
        let mut b = new_test_builder();
        let block = b.finish();
        assert_eq!(&[0, 0, 0, 0, 0, 0, 0, 0], block);
        let r = new_test_reader(block);
        assert!(r.is_empty());
        assert!(r.key_may_match(0, b"foo"));
        assert!(r.key_may_match(10000, b"foo"));
    }

    #[test]
    fn test_single_chunk() {
        let mut b = new_test_builder();
        b.add_key(b"foo");
        b.add_key(b"bar");
        b.add_key(b"box");
        b.add_key(b"box");
        b.add_key(b"hello");
        let block = b.finish();
        let r = new_test_reader(block);
        assert_eq!(r.len(), 1);
        let tests: Vec<(&[u8], bool)> = vec![
            (b"foo", true),
            (b"bar", true),
            (b"box", true),
            (b"hello", true),
            (b"missing", false),
            (b"other", false),
        ];
        for (key, expect) in tests {
            assert_eq!(r.key_may_match(0, key), expect, "key {:?}", key);
        }
    }

    #[test]
    fn test_multiple_chunk() {
        let mut b = new_test_builder();
        // first filter
        b.add_key(b"foo");
        b.add_key(b"bar");
        b.generate_filter();
        // second filter
        b.add_key(b"box");
        b.generate_filter();
        // third filter is empty
        b.generate_filter();
        // last filter is generated by finish
        b.add_key(b"box");
        b.add_key(b"hello");
        assert_eq!(b.num_filters(), 3);
        let block = b.finish();
        let r = new_test_reader(block);
        assert_eq!(r.len(), 4);

        let tests: Vec<(usize, &[u8], bool)> = vec![
            (0, b"foo", true),
            (0, b"bar", true),
            (0, b"box", false),
            (0, b"hello", false),
            (1, b"box", true),
            (1, b"foo", false),
            (1, b"hello", false),
            (2, b"box", false),
            (2, b"foo", false),
            (3, b"box", true),
            (3, b"hello", true),
            (3, b"foo", false),
            (3, b"bar", false),
            // out of range
            (4, b"anything", true),
        ];
        for (index, key, expect) in tests {
            assert_eq!(
                r.key_may_match(index, key),
                expect,
                "filter {} key {:?}",
                index,
                key
            );
        }
    }

    #[test]
    fn test_bloom_filter_block() {
        let policy = Arc::new(BloomFilter::new(10));
        let mut b = FilterBlockBuilder::new(policy.clone());
        for i in 0..100 {
            b.add_key(format!("key{}", i).as_bytes());
        }
        b.generate_filter();
        for i in 100..200 {
            b.add_key(format!("key{}", i).as_bytes());
        }
        let r = FilterBlockReader::new(policy, Vec::from(b.finish())).unwrap();
        for i in 0..100 {
            assert!(r.key_may_match(0, format!("key{}", i).as_bytes()));
        }
        for i in 100..200 {
            assert!(r.key_may_match(1, format!("key{}", i).as_bytes()));
        }
    }

    #[test]
    fn test_corrupted_trailer() {
        let mut b = new_test_builder();
        b.add_key(b"foo");
        b.generate_filter();
        b.add_key(b"bar");
        let block = Vec::from(b.finish());
        let n = block.len();

        let mut tests = vec![];
        // too short
        tests.push(vec![0u8; 7]);
        // truncated head
        tests.push(block[1..].to_vec());
        // filter count larger than the offsets
        let mut bad_count = block.clone();
        bad_count[n - 4] = 3;
        tests.push(bad_count);
        // the first filter ends beyond the data
        let mut bad_offset = block.clone();
        bad_offset[8] = 100;
        tests.push(bad_offset);
        for data in tests {
            let res = FilterBlockReader::new(Arc::new(TestHashFilter {}), data);
            assert!(res.err().unwrap().is_corruption());
        }
    }
}
