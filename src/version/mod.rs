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

pub mod version_edit;
pub mod version_set;

use crate::db::format::{
    InternalKey, InternalKeyComparator, ValueType, MAX_KEY_SEQUENCE, VALUE_TYPE_FOR_SEEK,
};
use crate::options::Options;
use crate::util::comparator::Comparator;
use crate::version::version_edit::FileMetaData;
use std::cmp::Ordering as CmpOrdering;
use std::fmt::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// A file which served a lookup that had to continue into the next file.
/// Enough of these on one file make it a seek compaction candidate.
pub struct SeekStats {
    pub file: Arc<FileMetaData>,
    pub level: usize,
}

/// `Version` is a collection of file metadata for on-disk tables at various
/// levels. In-memory DBs are written to level-0 tables, and compactions
/// migrate data from level N to level N+1. The tables map internal keys (which
/// are a user key, a delete or set bit, and a sequence number) to user values.
///
/// The tables at level 0 are sorted by increasing file number and their key
/// ranges may overlap. The newest file is the last one.
///
/// The tables at any non-0 level are sorted by their internal key range and any
/// two tables at the same non-0 level do not overlap.
///
/// The internal key ranges of two tables at different levels X and Y may
/// overlap, for any X != Y.
///
/// Finally, for every internal key in a table at level X, there is no internal
/// key in a higher level table that has both the same user key and a higher
/// sequence number.
pub struct Version<C: Comparator> {
    // generation of this version in the `VersionSet`
    vnum: usize,
    options: Arc<Options<C>>,
    icmp: InternalKeyComparator<C>,
    pub files: Vec<Vec<Arc<FileMetaData>>>,

    // Next file to compact based on seek stats
    file_to_compact: RwLock<Option<Arc<FileMetaData>>>,
    file_to_compact_level: AtomicUsize,

    // Level that should be compacted next and its compaction score.
    // Score < 1 means compaction is not strictly needed.
    // These fields are initialized by `finalize`
    compaction_score: f64,
    compaction_level: usize,
}

impl<C: Comparator> Version<C> {
    pub fn new(options: Arc<Options<C>>, icmp: InternalKeyComparator<C>) -> Self {
        let max_levels = options.max_levels;
        Self {
            vnum: 0,
            options,
            icmp,
            files: vec![Vec::new(); max_levels],
            file_to_compact: RwLock::new(None),
            file_to_compact_level: AtomicUsize::new(0),
            compaction_score: 0f64,
            compaction_level: 0,
        }
    }

    #[inline]
    pub fn vnum(&self) -> usize {
        self.vnum
    }

    #[inline]
    pub fn comparator(&self) -> &InternalKeyComparator<C> {
        &self.icmp
    }

    #[inline]
    pub fn compaction_score(&self) -> f64 {
        self.compaction_score
    }

    #[inline]
    pub fn compaction_level(&self) -> usize {
        self.compaction_level
    }

    /// Returns the file picked by seek statistics and its level
    pub fn file_to_compact(&self) -> Option<(Arc<FileMetaData>, usize)> {
        let guard = self.file_to_compact.read().unwrap();
        guard
            .as_ref()
            .map(|f| (f.clone(), self.file_to_compact_level.load(Ordering::Acquire)))
    }

    /// Precomputes the best level for the next compaction.
    ///
    /// The last level is never picked since there is no deeper level to
    /// compact it into.
    pub fn finalize(&mut self) {
        let mut best_level = 0;
        let mut best_score = -1f64;
        for level in 0..self.options.max_levels - 1 {
            let score = if level == 0 {
                // We treat level-0 specially by bounding the number of files
                // instead of number of bytes for two reasons:
                //
                // (1) With larger write-buffer sizes, it is nice not to do too
                // many level-0 compactions.
                //
                // (2) The files in level-0 are merged on every read and
                // therefore we wish to avoid too many files when the individual
                // file size is small (perhaps because of a small write-buffer
                // setting, or very high compression ratios, or lots of
                // overwrites/deletions).
                self.files[level].len() as f64 / self.options.l0_compaction_threshold as f64
            } else {
                total_file_size(&self.files[level]) as f64
                    / self.options.max_bytes_for_level(level) as f64
            };
            if score > best_score {
                best_score = score;
                best_level = level;
            }
        }
        self.compaction_level = best_level;
        self.compaction_score = best_score;
    }

    /// Charges a missed seek to `stats.file`. Returns true if the file has
    /// used up its allowed seeks and becomes the next seek compaction target.
    pub fn update_stats(&self, stats: SeekStats) -> bool {
        let remaining = match stats
            .file
            .allowed_seeks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(prev) => prev - 1,
            Err(_) => 0,
        };
        if remaining == 0 {
            let mut guard = self.file_to_compact.write().unwrap();
            if guard.is_none() {
                debug!(
                    "File #{} at level {} runs out of allowed seeks",
                    stats.file.number, stats.level
                );
                *guard = Some(stats.file);
                self.file_to_compact_level
                    .store(stats.level, Ordering::Release);
                return true;
            }
        }
        false
    }

    /// Returns true iff some file in the specified level overlaps
    /// some part of `[smallest_ukey,largest_ukey]`.
    /// `None` represents a key smaller than all keys or larger than all
    /// keys in the DB.
    pub fn overlap_in_level(
        &self,
        level: usize,
        smallest_ukey: Option<&[u8]>,
        largest_ukey: Option<&[u8]>,
    ) -> bool {
        some_file_overlaps_range(
            &self.icmp,
            level > 0,
            &self.files[level],
            smallest_ukey,
            largest_ukey,
        )
    }

    /// Returns the level at which we should place a new memtable compaction
    /// result that covers the range `[smallest_ukey,largest_ukey]`.
    pub fn pick_level_for_memtable_output(&self, smallest_ukey: &[u8], largest_ukey: &[u8]) -> usize {
        let mut level = 0;
        if !self.overlap_in_level(0, Some(smallest_ukey), Some(largest_ukey)) {
            // Push to next level if there is no overlap in next level,
            // and the #bytes overlapping in the level after that are limited.
            let start = InternalKey::new(smallest_ukey, MAX_KEY_SEQUENCE, VALUE_TYPE_FOR_SEEK);
            let limit = InternalKey::new(largest_ukey, 0, ValueType::Deletion);
            while level < self.options.max_mem_compact_level {
                if self.overlap_in_level(level + 1, Some(smallest_ukey), Some(largest_ukey)) {
                    break;
                }
                if level + 2 < self.options.max_levels {
                    // Check that file does not overlap too many grandparent bytes.
                    let overlaps =
                        self.get_overlapping_inputs(level + 2, Some(&start), Some(&limit));
                    if total_file_size(&overlaps) > self.options.max_grandparent_overlap_bytes() {
                        break;
                    }
                }
                level += 1;
            }
        }
        level
    }

    /// Returns all the files in `level` that overlap `[begin,end]`.
    /// `None` means unbounded on that side.
    ///
    /// Level 0 files may overlap each other, so the range is widened to
    /// cover every picked file and the search restarts until it is stable.
    pub fn get_overlapping_inputs(
        &self,
        level: usize,
        begin: Option<&InternalKey>,
        end: Option<&InternalKey>,
    ) -> Vec<Arc<FileMetaData>> {
        let ucmp = &self.icmp.user_comparator;
        let files = &self.files[level];
        let mut user_begin = begin.map(|k| k.user_key());
        let mut user_end = end.map(|k| k.user_key());
        let mut result = vec![];
        let mut i = 0;
        while i < files.len() {
            let f = &files[i];
            i += 1;
            let file_start = f.smallest.user_key();
            let file_limit = f.largest.user_key();
            if user_begin.map_or(false, |b| ucmp.compare(file_limit, b) == CmpOrdering::Less) {
                // completely before the range
                continue;
            }
            if user_end.map_or(false, |e| ucmp.compare(file_start, e) == CmpOrdering::Greater) {
                // completely after the range
                continue;
            }
            result.push(f.clone());
            if level == 0 {
                if user_begin.map_or(false, |b| ucmp.compare(file_start, b) == CmpOrdering::Less)
                {
                    user_begin = Some(file_start);
                    result.clear();
                    i = 0;
                } else if user_end
                    .map_or(false, |e| ucmp.compare(file_limit, e) == CmpOrdering::Greater)
                {
                    user_end = Some(file_limit);
                    result.clear();
                    i = 0;
                }
            }
        }
        result
    }

    /// Returns the number of files in the given level
    #[inline]
    pub fn num_level_files(&self, level: usize) -> usize {
        self.files.get(level).map_or(0, |files| files.len())
    }

    /// Returns the total bytes of the files in the given level
    #[inline]
    pub fn num_level_bytes(&self, level: usize) -> u64 {
        self.files.get(level).map_or(0, |files| total_file_size(files))
    }

    /// Returns a human-readable summary of the file count per level
    pub fn level_summary(&self) -> String {
        let mut s = String::from("files[ ");
        for files in self.files.iter() {
            let _ = write!(s, "{} ", files.len());
        }
        s.push(']');
        s
    }
}

/// Returns the smallest index `i` such that `files[i].largest >= key`.
/// Returns `files.len()` if there is no such file.
///
/// REQUIRES: `files` contains a sorted list of non-overlapping files.
pub fn find_file<C: Comparator>(
    icmp: &InternalKeyComparator<C>,
    files: &[Arc<FileMetaData>],
    key: &[u8],
) -> usize {
    let (mut left, mut right) = (0, files.len());
    while left < right {
        let mid = (left + right) / 2;
        if icmp.compare(files[mid].largest.data(), key) == CmpOrdering::Less {
            // Key at "mid.largest" is < "target". Therefore all
            // files at or before "mid" are uninteresting.
            left = mid + 1;
        } else {
            // Key at "mid.largest" is >= "target". Therefore all files
            // after "mid" are uninteresting.
            right = mid;
        }
    }
    right
}

/// Returns true iff some file in `files` overlaps the user key range
/// `[smallest_ukey,largest_ukey]`. `None` means unbounded on that side.
///
/// If `disjoint_sorted_files` is true, `files` must contain disjoint ranges
/// in sorted order.
pub fn some_file_overlaps_range<C: Comparator>(
    icmp: &InternalKeyComparator<C>,
    disjoint_sorted_files: bool,
    files: &[Arc<FileMetaData>],
    smallest_ukey: Option<&[u8]>,
    largest_ukey: Option<&[u8]>,
) -> bool {
    let ucmp = &icmp.user_comparator;
    if !disjoint_sorted_files {
        // Need to check against all files
        return files.iter().any(|f| {
            !(key_is_after_file(ucmp, smallest_ukey, f)
                || key_is_before_file(ucmp, largest_ukey, f))
        });
    }
    // Binary search over file list
    let index = match smallest_ukey {
        Some(ukey) => {
            // Find the earliest possible internal key for smallest_user_key
            let small_key = InternalKey::new(ukey, MAX_KEY_SEQUENCE, VALUE_TYPE_FOR_SEEK);
            find_file(icmp, files, small_key.data())
        }
        None => 0,
    };
    if index >= files.len() {
        // beginning of range is after all files, so no overlap.
        return false;
    }
    !key_is_before_file(ucmp, largest_ukey, &files[index])
}

// `None` ukey is before all keys and is therefore never after a file
#[inline]
fn key_is_after_file<C: Comparator>(ucmp: &C, ukey: Option<&[u8]>, f: &FileMetaData) -> bool {
    ukey.map_or(false, |k| ucmp.compare(k, f.largest.user_key()) == CmpOrdering::Greater)
}

// `None` ukey is after all keys and is therefore never before a file
#[inline]
fn key_is_before_file<C: Comparator>(ucmp: &C, ukey: Option<&[u8]>, f: &FileMetaData) -> bool {
    ukey.map_or(false, |k| ucmp.compare(k, f.smallest.user_key()) == CmpOrdering::Less)
}

/// Returns the sum of the sizes of `files`
pub fn total_file_size(files: &[Arc<FileMetaData>]) -> u64 {
    files.iter().fold(0, |sum, f| sum + f.file_size)
}
