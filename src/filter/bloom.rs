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

use crate::filter::FilterPolicy;
use crate::util::hash::hash;

const BLOOM_SEED: u32 = 0xbc9f_1d34;

// Filters with more probes are reserved for future encodings
const MAX_PROBES: usize = 30;

#[inline]
fn bloom_hash(key: &[u8]) -> u32 {
    hash(key, BLOOM_SEED)
}

/// A Bloom filter policy using double hashing over a single 32-bit hash.
///
/// The encoded filter is the bit array followed by one byte holding the
/// number of probes.
pub struct BloomFilter {
    bits_per_key: usize,
    // Number of probes, ln(2) * bits_per_key rounded down
    k: usize,
}

impl BloomFilter {
    pub fn new(bits_per_key: usize) -> Self {
        // 0.69 =~ ln(2)
        let k = (bits_per_key as f64 * 0.69) as usize;
        Self {
            bits_per_key,
            k: k.max(1).min(MAX_PROBES),
        }
    }
}

impl FilterPolicy for BloomFilter {
    fn name(&self) -> &str {
        "leveldb.BuiltinBloomFilter2"
    }

    fn may_contain(&self, filter: &[u8], key: &[u8]) -> bool {
        let len = filter.len();
        if len < 2 {
            return false;
        }
        let bits = (len - 1) * 8;
        let k = filter[len - 1] as usize;
        if k > MAX_PROBES {
            // Consider it a match
            return true;
        }
        let mut h = bloom_hash(key);
        // Rotate right 17 bits
        let delta = (h >> 17) | (h << 15);
        for _ in 0..k {
            let bit_pos = h as usize % bits;
            if filter[bit_pos / 8] & (1 << (bit_pos % 8)) == 0 {
                return false;
            }
            h = h.wrapping_add(delta);
        }
        true
    }

    fn create_filter(&self, keys: &[Vec<u8>]) -> Vec<u8> {
        // For small n, we can see a very high false positive rate.
        // Fix it by enforcing a minimum bloom filter length.
        let bits = (keys.len() * self.bits_per_key).max(64);
        let bytes = (bits + 7) / 8;
        let bits = bytes * 8;
        let mut filter = vec![0u8; bytes + 1];
        filter[bytes] = self.k as u8;
        for key in keys {
            let mut h = bloom_hash(key);
            let delta = (h >> 17) | (h << 15);
            for _ in 0..self.k {
                let bit_pos = h as usize % bits;
                filter[bit_pos / 8] |= 1 << (bit_pos % 8);
                h = h.wrapping_add(delta);
            }
        }
        filter
    }
}
