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

pub mod arena;
pub mod skiplist;

use crate::db::format::{
    extract_seq_and_type, extract_user_key, pack_seq_and_type, InternalKeyComparator, LookupKey,
    ValueType, INTERNAL_KEY_TAIL, MAX_KEY_SEQUENCE,
};
use crate::iterator::Iterator;
use crate::mem::arena::BlockArena;
use crate::mem::skiplist::{Skiplist, SkiplistIterator};
use crate::util::coding::encode_fixed_64;
use crate::util::comparator::Comparator;
use crate::util::varint::VarintU32;
use crate::{Error, Result};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

// KeyComparator orders memtable entries by the length prefixed internal key
// at their front
#[derive(Clone, Default)]
pub struct KeyComparator<C: Comparator> {
    icmp: InternalKeyComparator<C>,
}

impl<C: Comparator> Comparator for KeyComparator<C> {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.icmp
            .compare(extract_internal_key(a), extract_internal_key(b))
    }

    fn name(&self) -> &str {
        self.icmp.name()
    }
}

type Table<C> = Skiplist<KeyComparator<C>, BlockArena>;

/// In-memory write buffer holding the most recent updates in internal key
/// order.
///
/// Every update is bundled into an entry that's stored in the arena:
///
/// ```text
///   +=================================+
///   |       format of the entry       |
///   +=================================+
///   | varint32 of internal key length |
///   +---------------------------------+ ---------------
///   | user key bytes                  |
///   +---------------------------------+   internal key
///   | sequence (7)       |   type (1) |
///   +---------------------------------+ ---------------
///   | varint32 of value length        |
///   +---------------------------------+
///   | value bytes                     |
///   +---------------------------------+
/// ```
///
/// A `MemTable` is shared by `Arc`. `add` must be serialized by the caller
/// while any number of readers run concurrently.
pub struct MemTable<C: Comparator> {
    icmp: InternalKeyComparator<C>,
    table: Arc<Table<C>>,
    entries: AtomicUsize,
    data_size: AtomicUsize,
}

impl<C: Comparator> MemTable<C> {
    pub fn new(icmp: InternalKeyComparator<C>) -> Self {
        let arena = Arc::new(BlockArena::default());
        let kcmp = KeyComparator { icmp: icmp.clone() };
        Self {
            icmp,
            table: Arc::new(Skiplist::new(kcmp, arena)),
            entries: AtomicUsize::new(0),
            data_size: AtomicUsize::new(0),
        }
    }

    /// Returns an estimate of the number of bytes of data in use by this
    /// data structure. It is safe to call when MemTable is being modified.
    pub fn approximate_memory_usage(&self) -> usize {
        self.table.memory_used()
    }

    /// Number of entries added
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.load(AtomicOrdering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes of user keys and values added
    #[inline]
    pub fn data_size(&self) -> usize {
        self.data_size.load(AtomicOrdering::Acquire)
    }

    /// Returns an iterator yielding the internal keys and values of the
    /// memtable. The iterator keeps the underlying memory alive.
    pub fn iter(&self) -> MemTableIterator<C> {
        MemTableIterator::new(self.table.clone())
    }

    /// Adds an entry that maps `key` to `value` at the specified sequence
    /// number and with the specified type. Typically `value` is empty if the
    /// type is `Deletion`.
    ///
    /// Adding the same key with the same sequence and type twice is an
    /// `Error::Invariant`.
    ///
    /// A `seq` greater than `MAX_KEY_SEQUENCE` is an `Error::Invariant` too.
    pub fn add(&self, seq: u64, val_type: ValueType, key: &[u8], value: &[u8]) -> Result<()> {
        invariant!(
            seq <= MAX_KEY_SEQUENCE,
            "[memtable] sequence {} exceeds {}",
            seq,
            MAX_KEY_SEQUENCE
        );
        let ikey_len = key.len() + INTERNAL_KEY_TAIL;
        let entry_len = VarintU32::varint_length(ikey_len as u32)
            + ikey_len
            + VarintU32::varint_length(value.len() as u32)
            + value.len();
        let tag = pack_seq_and_type(seq, val_type);
        self.table.insert_with(entry_len, |buf| {
            let mut n = VarintU32::write(buf, ikey_len as u32);
            buf[n..n + key.len()].copy_from_slice(key);
            n += key.len();
            encode_fixed_64(&mut buf[n..n + INTERNAL_KEY_TAIL], tag);
            n += INTERNAL_KEY_TAIL;
            n += VarintU32::write(&mut buf[n..], value.len() as u32);
            buf[n..].copy_from_slice(value);
        })?;
        self.entries.fetch_add(1, AtomicOrdering::Release);
        self.data_size
            .fetch_add(key.len() + value.len(), AtomicOrdering::Release);
        Ok(())
    }

    /// Looks up the newest entry of `key.user_key()` with a sequence not
    /// greater than the lookup sequence.
    ///
    /// Returns `None` if the memtable holds no such entry,
    /// `Some(Ok(value))` if the entry is a value and
    /// `Some(Err(Error::NotFound(None)))` if the key is deleted.
    pub fn get(&self, key: &LookupKey) -> Option<Result<Vec<u8>>> {
        // The first entry >= the lookup key is the newest visible version
        // if it has the same user key
        let node = self.table.find_greater_or_equal(key.mem_key())?;
        let entry = self.table.key(node);
        let ikey = extract_internal_key(entry);
        if self
            .icmp
            .user_comparator
            .compare(extract_user_key(ikey), key.user_key())
            != Ordering::Equal
        {
            return None;
        }
        match extract_seq_and_type(ikey) {
            Ok((_, ValueType::Value)) => Some(Ok(extract_value(entry).to_vec())),
            Ok((_, ValueType::Deletion)) => Some(Err(Error::NotFound(None))),
            Err(e) => Some(Err(e)),
        }
    }
}

/// Iterates the entries of a memtable. `key()` is the internal key and
/// `seek()` takes an internal key.
pub struct MemTableIterator<C: Comparator> {
    iter: SkiplistIterator<KeyComparator<C>, BlockArena>,
    // A length prefixed seek target
    tmp: Vec<u8>,
}

impl<C: Comparator> MemTableIterator<C> {
    fn new(table: Arc<Table<C>>) -> Self {
        Self {
            iter: SkiplistIterator::new(table),
            tmp: vec![],
        }
    }
}

impl<C: Comparator> Iterator for MemTableIterator<C> {
    fn valid(&self) -> bool {
        self.iter.valid()
    }

    fn seek_to_first(&mut self) {
        self.iter.seek_to_first()
    }

    fn seek_to_last(&mut self) {
        self.iter.seek_to_last()
    }

    fn seek(&mut self, target: &[u8]) {
        self.tmp.clear();
        VarintU32::put_varint_prefixed_slice(&mut self.tmp, target);
        self.iter.seek(&self.tmp)
    }

    fn next(&mut self) {
        self.iter.next()
    }

    fn prev(&mut self) {
        self.iter.prev()
    }

    fn key(&self) -> &[u8] {
        extract_internal_key(self.iter.key())
    }

    fn value(&self) -> &[u8] {
        extract_value(self.iter.key())
    }

    fn status(&mut self) -> Result<()> {
        Ok(())
    }
}

// Returns the internal key of a memtable entry or a lookup key
#[inline]
fn extract_internal_key(entry: &[u8]) -> &[u8] {
    match VarintU32::get_varint_prefixed_slice(entry) {
        Some((ikey, _)) => ikey,
        None => &[],
    }
}

// Returns the value part of a memtable entry
#[inline]
fn extract_value(entry: &[u8]) -> &[u8] {
    match VarintU32::get_varint_prefixed_slice(entry)
        .and_then(|(_, n)| VarintU32::get_varint_prefixed_slice(&entry[n..]))
    {
        Some((value, _)) => value,
        None => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::format::{InternalKey, ParsedInternalKey};
    use crate::util::comparator::BytewiseComparator;
    use std::thread;

    fn new_mem_table() -> MemTable<BytewiseComparator> {
        MemTable::new(InternalKeyComparator::new(BytewiseComparator::default()))
    }

    fn get(mem: &MemTable<BytewiseComparator>, key: &str, seq: u64) -> Option<Result<Vec<u8>>> {
        mem.get(&LookupKey::new(key.as_bytes(), seq))
    }

    #[test]
    fn test_add_and_get() {
        let mem = new_mem_table();
        mem.add(1, ValueType::Value, b"a", b"v1").unwrap();
        mem.add(2, ValueType::Value, b"b", b"v2").unwrap();
        mem.add(3, ValueType::Deletion, b"a", b"").unwrap();
        assert_eq!(mem.len(), 3);
        assert_eq!(mem.data_size(), 7);

        // (key, seq, expect) where `Some(None)` is a tombstone
        let tests: Vec<(&str, u64, Option<Option<&str>>)> = vec![
            ("a", 3, Some(None)),
            ("a", 100, Some(None)),
            ("a", 2, Some(Some("v1"))),
            ("a", 1, Some(Some("v1"))),
            ("a", 0, None),
            ("b", 5, Some(Some("v2"))),
            ("b", 2, Some(Some("v2"))),
            ("b", 1, None),
            ("c", 10, None),
            ("", 10, None),
        ];
        for (key, seq, expect) in tests {
            let got = get(&mem, key, seq);
            match expect {
                None => assert!(got.is_none(), "{}@{}", key, seq),
                Some(None) => assert!(
                    got.unwrap().unwrap_err().is_not_found(),
                    "{}@{}",
                    key,
                    seq
                ),
                Some(Some(v)) => assert_eq!(got.unwrap().unwrap(), v.as_bytes()),
            }
        }
    }

    #[test]
    fn test_duplicate_entry() {
        let mem = new_mem_table();
        mem.add(1, ValueType::Value, b"a", b"v1").unwrap();
        assert!(mem
            .add(1, ValueType::Value, b"a", b"v2")
            .unwrap_err()
            .is_invariant());
        // the same key with another sequence is a new version
        mem.add(2, ValueType::Value, b"a", b"v2").unwrap();
        assert_eq!(mem.len(), 2);
    }

    #[test]
    fn test_sequence_overflow() {
        let mem = new_mem_table();
        mem.add(MAX_KEY_SEQUENCE, ValueType::Value, b"a", b"v").unwrap();
        assert!(mem
            .add(MAX_KEY_SEQUENCE + 1, ValueType::Value, b"b", b"v")
            .unwrap_err()
            .is_invariant());
        assert_eq!(mem.len(), 1);
        assert!(get(&mem, "b", MAX_KEY_SEQUENCE).is_none());
    }

    #[test]
    fn test_empty_key_and_value() {
        let mem = new_mem_table();
        mem.add(1, ValueType::Value, b"", b"").unwrap();
        mem.add(2, ValueType::Value, b"k", b"").unwrap();
        assert_eq!(get(&mem, "", 1).unwrap().unwrap(), b"");
        assert_eq!(get(&mem, "k", 2).unwrap().unwrap(), b"");
    }

    #[test]
    fn test_iterator_order() {
        let mem = new_mem_table();
        mem.add(1, ValueType::Value, b"a", b"v1").unwrap();
        mem.add(2, ValueType::Value, b"b", b"v2").unwrap();
        mem.add(3, ValueType::Deletion, b"a", b"").unwrap();
        let expect = vec![
            (InternalKey::new(b"a", 3, ValueType::Deletion), ""),
            (InternalKey::new(b"a", 1, ValueType::Value), "v1"),
            (InternalKey::new(b"b", 2, ValueType::Value), "v2"),
        ];
        let mut iter = mem.iter();
        iter.seek_to_first();
        for (k, v) in expect.iter() {
            assert!(iter.valid());
            assert_eq!(iter.key(), k.data());
            assert_eq!(iter.value(), v.as_bytes());
            iter.next();
        }
        assert!(!iter.valid());

        iter.seek_to_last();
        assert_eq!(iter.key(), expect[2].0.data());
        iter.prev();
        assert_eq!(iter.key(), expect[1].0.data());

        iter.seek(LookupKey::new(b"a", 2).internal_key());
        let parsed = ParsedInternalKey::decode_from(iter.key()).unwrap();
        assert_eq!(parsed.user_key, b"a");
        assert_eq!(parsed.seq, 1);
        assert_eq!(iter.value(), b"v1");
    }

    #[test]
    fn test_memory_usage_grows() {
        let mem = new_mem_table();
        let base = mem.approximate_memory_usage();
        for i in 0..1000u64 {
            let key = format!("key{:05}", i);
            mem.add(i + 1, ValueType::Value, key.as_bytes(), &[b'x'; 100])
                .unwrap();
        }
        assert!(mem.approximate_memory_usage() >= base + 1000 * 100);
        assert_eq!(mem.data_size(), 1000 * 108);
    }

    #[test]
    fn test_shared_by_readers() {
        let mem = Arc::new(new_mem_table());
        for i in 0..500u64 {
            mem.add(i + 1, ValueType::Value, &i.to_be_bytes(), b"v")
                .unwrap();
        }
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let mem = mem.clone();
                thread::spawn(move || {
                    for i in 0..500u64 {
                        let got = mem.get(&LookupKey::new(&i.to_be_bytes(), 1000));
                        assert_eq!(got.unwrap().unwrap(), b"v");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        // the last handle to go frees the memory
        assert_eq!(Arc::strong_count(&mem), 1);
    }
}
