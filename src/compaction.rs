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

use crate::db::format::{InternalKey, InternalKeyComparator};
use crate::options::Options;
use crate::util::comparator::Comparator;
use crate::version::version_edit::{FileMetaData, VersionEdit};
use crate::version::{total_file_size, Version};
use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompactionReason {
    /// A level holds more bytes (or level 0 more files) than allowed
    MaxSize,
    /// A file ran out of its allowed seeks
    SeekLimit,
    /// Requested by `VersionSet::compact_range`
    Manual,
}

/// The files of the two levels involved in a compaction. Both lists are
/// sorted by smallest key except `base` at level 0.
#[derive(Default)]
pub struct CompactionInputs {
    // files in level n
    pub base: Vec<Arc<FileMetaData>>,
    // files in level n + 1
    pub parent: Vec<Arc<FileMetaData>>,
}

impl CompactionInputs {
    #[inline]
    pub fn add_base(&mut self, f: Arc<FileMetaData>) {
        self.base.push(f)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.parent.is_empty()
    }
}

/// A `Compaction` describes which files should be merged from level n into
/// level n + 1. It is produced by `VersionSet::pick_compaction` or
/// `VersionSet::compact_range`.
pub struct Compaction<C: Comparator> {
    options: Arc<Options<C>>,
    // Target level to be compacted
    pub level: usize,
    pub reason: CompactionReason,
    pub input_version: Option<Arc<Version<C>>>,
    // Summary of the compaction result
    pub edit: VersionEdit,
    pub inputs: CompactionInputs,
    // State used to check for number of overlapping grandparent files
    // (parent == level n + 1, grandparent == level n + 2)
    pub grand_parents: Vec<Arc<FileMetaData>>,
}

impl<C: Comparator> Compaction<C> {
    pub fn new(options: Arc<Options<C>>, level: usize, reason: CompactionReason) -> Self {
        let max_levels = options.max_levels;
        Self {
            options,
            level,
            reason,
            input_version: None,
            edit: VersionEdit::new(max_levels),
            inputs: CompactionInputs::default(),
            grand_parents: vec![],
        }
    }

    /// Is this a trivial compaction that can be implemented by just
    /// moving a single input file to the next level (no merging or splitting)
    pub fn is_trivial_move(&self) -> bool {
        // Avoid a move if there is lots of overlapping grandparent data.
        // Otherwise, the move could create a parent file that will require
        // a very expensive merge later on.
        self.inputs.base.len() == 1
            && self.inputs.parent.is_empty()
            && total_file_size(&self.grand_parents) <= self.options.max_grandparent_overlap_bytes()
    }

    /// Adds the deletion of every input file to `self.edit`
    pub fn add_input_deletions(&mut self) {
        for f in self.inputs.base.iter() {
            self.edit.delete_file(self.level, f.number);
        }
        for f in self.inputs.parent.iter() {
            self.edit.delete_file(self.level + 1, f.number);
        }
    }

    /// Returns every input file along with its level
    pub fn input_files(&self) -> Vec<(usize, &Arc<FileMetaData>)> {
        self.inputs
            .base
            .iter()
            .map(|f| (self.level, f))
            .chain(self.inputs.parent.iter().map(|f| (self.level + 1, f)))
            .collect()
    }

    /// Returns the total bytes of the input files
    #[inline]
    pub fn bytes_read(&self) -> u64 {
        total_file_size(&self.inputs.base) + total_file_size(&self.inputs.parent)
    }
}

/// Returns the minimal range that covers all entries in `files` of `level`
///
/// # Panics
///
/// Panics if `files` is empty
pub fn base_range<C: Comparator>(
    files: &[Arc<FileMetaData>],
    level: usize,
    icmp: &InternalKeyComparator<C>,
) -> (InternalKey, InternalKey) {
    assert!(
        !files.is_empty(),
        "[compaction] the input[0] shouldn't be empty when trying to get covered range"
    );
    let first = &files[0];
    let last = &files[files.len() - 1];
    if level == 0 {
        // level 0 files are possible to overlaps with each other
        let mut smallest = &first.smallest;
        let mut largest = &first.largest;
        for f in files.iter().skip(1) {
            if icmp.compare(f.smallest.data(), smallest.data()) == CmpOrdering::Less {
                smallest = &f.smallest;
            }
            if icmp.compare(f.largest.data(), largest.data()) == CmpOrdering::Greater {
                largest = &f.largest;
            }
        }
        (smallest.clone(), largest.clone())
    } else {
        // no overlapping in level > 0 and file is ordered by smallest key
        (first.smallest.clone(), last.largest.clone())
    }
}

/// Returns the minimal range that covers all entries in `base` of `level`
/// and `parent` of `level + 1`
pub fn total_range<C: Comparator>(
    base: &[Arc<FileMetaData>],
    parent: &[Arc<FileMetaData>],
    level: usize,
    icmp: &InternalKeyComparator<C>,
) -> (InternalKey, InternalKey) {
    let (mut smallest, mut largest) = base_range(base, level, icmp);
    if let (Some(first), Some(last)) = (parent.first(), parent.last()) {
        if icmp.compare(first.smallest.data(), smallest.data()) == CmpOrdering::Less {
            smallest = first.smallest.clone()
        }
        if icmp.compare(last.largest.data(), largest.data()) == CmpOrdering::Greater {
            largest = last.largest.clone()
        }
    }
    (smallest, largest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::format::ValueType;
    use crate::util::comparator::BytewiseComparator;

    fn new_file(number: u64, smallest: &str, largest: &str, file_size: u64) -> Arc<FileMetaData> {
        Arc::new(FileMetaData::new(
            number,
            file_size,
            InternalKey::new(smallest.as_bytes(), 1, ValueType::Value),
            InternalKey::new(largest.as_bytes(), 1, ValueType::Value),
        ))
    }

    fn new_compaction(level: usize) -> Compaction<BytewiseComparator> {
        let opts = Arc::new(Options::<BytewiseComparator>::default());
        Compaction::new(opts, level, CompactionReason::Manual)
    }

    #[test]
    fn test_is_trivial_move() {
        let big = 30 << 20;
        let tests = vec![
            (vec![new_file(1, "a", "b", 1)], vec![], vec![], true),
            (
                vec![new_file(1, "a", "b", 1), new_file(2, "c", "d", 1)],
                vec![],
                vec![],
                false,
            ),
            (
                vec![new_file(1, "a", "b", 1)],
                vec![new_file(2, "a", "b", 1)],
                vec![],
                false,
            ),
            (
                vec![new_file(1, "a", "b", 1)],
                vec![],
                vec![new_file(3, "a", "b", big)],
                false,
            ),
        ];
        for (base, parent, grand_parents, expect) in tests {
            let mut c = new_compaction(1);
            c.inputs.base = base;
            c.inputs.parent = parent;
            c.grand_parents = grand_parents;
            assert_eq!(c.is_trivial_move(), expect);
        }
    }

    #[test]
    fn test_add_input_deletions() {
        let mut c = new_compaction(2);
        c.inputs.add_base(new_file(1, "a", "b", 10));
        c.inputs.add_base(new_file(2, "c", "d", 20));
        c.inputs.parent.push(new_file(3, "a", "z", 30));
        c.add_input_deletions();
        let mut deleted: Vec<(usize, u64)> =
            c.edit.file_delta.deleted_files.iter().cloned().collect();
        deleted.sort();
        assert_eq!(deleted, vec![(2, 1), (2, 2), (3, 3)]);
        let inputs: Vec<(usize, u64)> = c
            .input_files()
            .into_iter()
            .map(|(level, f)| (level, f.number))
            .collect();
        assert_eq!(inputs, vec![(2, 1), (2, 2), (3, 3)]);
        assert_eq!(c.bytes_read(), 60);
    }

    #[test]
    fn test_ranges() {
        let icmp = InternalKeyComparator::<BytewiseComparator>::default();
        let level0 = vec![
            new_file(1, "c", "f", 0),
            new_file(2, "a", "d", 0),
            new_file(3, "e", "g", 0),
        ];
        let (smallest, largest) = base_range(&level0, 0, &icmp);
        assert_eq!(smallest.user_key(), b"a");
        assert_eq!(largest.user_key(), b"g");

        let level1 = vec![new_file(4, "b", "c", 0), new_file(5, "d", "e", 0)];
        let (smallest, largest) = base_range(&level1, 1, &icmp);
        assert_eq!(smallest.user_key(), b"b");
        assert_eq!(largest.user_key(), b"e");

        let parent = vec![new_file(6, "a", "b", 0), new_file(7, "e", "h", 0)];
        let (smallest, largest) = total_range(&level1, &parent, 1, &icmp);
        assert_eq!(smallest.user_key(), b"a");
        assert_eq!(largest.user_key(), b"h");
        let (smallest, largest) = total_range(&level1, &[], 1, &icmp);
        assert_eq!(smallest.user_key(), b"b");
        assert_eq!(largest.user_key(), b"e");
    }
}
