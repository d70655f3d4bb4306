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

use std::cmp::Ordering;

/// A `Comparator` provides a total order across byte slices that are
/// used as keys in a memtable, a sstable or a version.
///
/// It must be thread safe since it's shared by every component that
/// orders keys.
pub trait Comparator: Send + Sync + Clone + Default {
    /// Three-way comparison. Returns value:
    ///   `Ordering::Less`    iff `a` < `b`
    ///   `Ordering::Equal`   iff `a` = `b`
    ///   `Ordering::Greater` iff `a` > `b`
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// The name of the comparator.  Used to check for comparator
    /// mismatches (i.e., a manifest created with one comparator is
    /// accessed using a different comparator).
    ///
    /// The client should switch to a new name whenever the comparator
    /// implementation changes in a way that will cause the relative
    /// ordering of any two keys to change.
    fn name(&self) -> &str;

    /// The length of the shortest key this comparator can order. Shorter
    /// keys decoded from disk are reported as corruption.
    #[inline]
    fn min_key_len(&self) -> usize {
        0
    }
}

/// Orders keys lexicographically by their bytes; a shorter prefix sorts first.
#[derive(Default, Clone, Copy, Debug)]
pub struct BytewiseComparator {}

impl BytewiseComparator {
    pub fn new() -> BytewiseComparator {
        BytewiseComparator {}
    }
}

impl Comparator for BytewiseComparator {
    #[inline]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    #[inline]
    fn name(&self) -> &str {
        "leveldb.BytewiseComparator"
    }
}
