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

use crate::filter::bloom::BloomFilter;
use crate::filter::FilterPolicy;
use crate::logger::Logger;
use crate::storage::Storage;
use crate::util::comparator::Comparator;
use log::{LevelFilter, Log};
use num_traits::FromPrimitive;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive)]
pub enum CompressionType {
    NoCompression = 0,
    SnappyCompression = 1,
    Unknown,
}

impl From<u8> for CompressionType {
    fn from(i: u8) -> Self {
        match CompressionType::from_u8(i) {
            Some(CompressionType::Unknown) | None => CompressionType::Unknown,
            Some(t) => t,
        }
    }
}

/// Options to control the behavior of the storage core. Built once and
/// shared as `Arc<Options<C>>` by every component.
#[derive(Clone)]
pub struct Options<C: Comparator> {
    // -------------------
    // Parameters that affect behavior:
    /// Comparator used to define the order of user keys.
    ///
    /// REQUIRES: The comparator must have the same name and order keys
    /// *exactly* the same as the comparator used by previous runs on the same
    /// directory.
    pub comparator: C,

    /// If true, corruption found in the manifest or the logs fails the
    /// recovery instead of being skipped.
    pub paranoid_checks: bool,

    // -------------------
    // Parameters that affect compaction:
    /// The number of levels, including L0
    pub max_levels: usize,

    /// The number of files necessary to trigger an L0 compaction.
    pub l0_compaction_threshold: usize,

    /// Soft limit on the number of L0 files.
    pub l0_slowdown_writes_threshold: usize,

    /// Hard limit on the number of L0 files.
    pub l0_stop_writes_threshold: usize,

    /// The maximum number of bytes for L1. Every deeper level is allowed 10
    /// times the bytes of its parent.
    pub l1_max_bytes: u64,

    /// Maximum level to which a new compacted memtable is pushed if it
    /// does not create overlap.
    pub max_mem_compact_level: usize,

    // -------------------
    // Parameters that affect performance:
    /// Amount of data to build up in the memtable before converting it to a
    /// sorted on-disk file.
    pub write_buffer_size: usize,

    /// Approximate size of user data packed per block. This corresponds to
    /// uncompressed data.
    pub block_size: usize,

    /// Number of keys between restart points for delta encoding of keys.
    pub block_restart_interval: usize,

    /// Target size of a table file
    pub max_file_size: u64,

    /// Compress blocks using the specified compression algorithm.
    pub compression: CompressionType,

    /// If true, append to the existing MANIFEST when recovering.
    pub reuse_logs: bool,

    /// Filter policy over user keys used to reduce disk reads.
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,

    /// The underlying logger
    /// In dev mode, default using a std output
    /// In release mode, default using a file `LOG` for output
    pub logger: Option<slog::Logger>,

    /// The maximum log level
    pub logger_level: LevelFilter,
}

impl<C: Comparator> Options<C> {
    /// Maximum number of bytes in all compacted files. We avoid expanding
    /// the lower level file set of a compaction if it would make the
    /// total compaction cover more than this many bytes.
    pub fn expanded_compaction_byte_size_limit(&self) -> u64 {
        25 * self.max_file_size
    }

    /// Maximum bytes of overlaps in grandparent (i.e., level+2) before we
    /// stop building a single file in a level-> level+1 compaction.
    pub fn max_grandparent_overlap_bytes(&self) -> u64 {
        10 * self.max_file_size
    }

    /// Maximum bytes of total files in a given level
    pub fn max_bytes_for_level(&self, mut level: usize) -> u64 {
        // The result for level zero is not really used since the level-0
        // compaction threshold is based on the number of files.
        let mut result = self.l1_max_bytes;
        while level > 1 {
            result = result.saturating_mul(10);
            level -= 1;
        }
        result
    }

    /// Limits the ranges of some fields and installs the logger writing to
    /// the `LOG` file under `db_path`.
    pub fn initialize<S: Storage>(&mut self, db_path: &str, storage: &S) {
        self.max_levels = Self::clip_range(self.max_levels, 2, 20);
        self.max_mem_compact_level =
            Self::clip_range(self.max_mem_compact_level, 0, self.max_levels - 1);
        self.write_buffer_size = Self::clip_range(self.write_buffer_size, 64 << 10, 1 << 30);
        self.max_file_size = Self::clip_range(self.max_file_size, 1 << 20, 1 << 30);
        self.block_size = Self::clip_range(self.block_size, 1 << 10, 4 << 20);
        self.block_restart_interval = Self::clip_range(self.block_restart_interval, 1, 1 << 10);
        self.apply_logger(storage, db_path);
    }

    fn apply_logger<S: Storage>(&mut self, storage: &S, db_path: &str) {
        let user_logger = self.logger.take();
        let logger = Logger::new(user_logger, self.logger_level, storage, db_path);
        let static_logger: &'static dyn Log = Box::leak(Box::new(logger));
        // The global logger can only be set once per process
        let _ = log::set_logger(static_logger);
        log::set_max_level(self.logger_level);
        info!("Logger initialized: [level {:?}]", &self.logger_level);
    }

    fn clip_range<N: PartialOrd + Copy>(n: N, min: N, max: N) -> N {
        if n > max {
            max
        } else if n < min {
            min
        } else {
            n
        }
    }
}

impl<C: Comparator> Default for Options<C> {
    fn default() -> Self {
        Options {
            comparator: C::default(),
            paranoid_checks: false,
            max_levels: 7,
            l0_compaction_threshold: 4,
            l0_slowdown_writes_threshold: 8,
            l0_stop_writes_threshold: 12,
            l1_max_bytes: 10 * 1024 * 1024, // 10MB
            max_mem_compact_level: 2,
            write_buffer_size: 4 * 1024 * 1024, // 4MB
            block_size: 4 * 1024,               // 4KB
            block_restart_interval: 16,
            max_file_size: 2 * 1024 * 1024, // 2MB
            compression: CompressionType::SnappyCompression,
            reuse_logs: false,
            filter_policy: Some(Arc::new(BloomFilter::new(10))),
            logger: None,
            logger_level: LevelFilter::Warn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mem::MemStorage;
    use crate::util::comparator::BytewiseComparator;

    #[test]
    fn test_compression_type_from_u8() {
        let tests = vec![
            (0u8, CompressionType::NoCompression),
            (1, CompressionType::SnappyCompression),
            (2, CompressionType::Unknown),
            (255, CompressionType::Unknown),
        ];
        for (b, expect) in tests {
            assert_eq!(CompressionType::from(b), expect);
        }
    }

    #[test]
    fn test_max_bytes_for_level() {
        let opt = Options::<BytewiseComparator>::default();
        let tests = vec![
            (0, 10u64 << 20),
            (1, 10 << 20),
            (2, 100 << 20),
            (3, 1000 << 20),
            (6, 1_000_000 << 20),
        ];
        for (level, expect) in tests {
            assert_eq!(opt.max_bytes_for_level(level), expect, "level {}", level);
        }
        assert!(opt.max_bytes_for_level(13) < u64::max_value());
        assert_eq!(opt.max_bytes_for_level(14), u64::max_value());
        assert_eq!(opt.max_bytes_for_level(19), u64::max_value());
        assert_eq!(opt.max_grandparent_overlap_bytes(), 20 << 20);
        assert_eq!(opt.expanded_compaction_byte_size_limit(), 50 << 20);
    }

    #[test]
    fn test_initialize_clips_ranges() {
        let mut opt = Options::<BytewiseComparator>::default();
        opt.max_levels = 3;
        opt.max_mem_compact_level = 5;
        opt.write_buffer_size = 1;
        opt.block_size = 1 << 30;
        opt.block_restart_interval = 0;
        opt.initialize("db", &MemStorage::default());
        assert_eq!(opt.max_mem_compact_level, 2);
        assert_eq!(opt.write_buffer_size, 64 << 10);
        assert_eq!(opt.block_size, 4 << 20);
        assert_eq!(opt.block_restart_interval, 1);
        assert_eq!(opt.max_file_size, 2 << 20);
    }
}
