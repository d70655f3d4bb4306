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

pub mod filename;
pub mod format;

use crate::db::filename::{generate_filename, FileType};
use crate::db::format::{InternalKey, InternalKeyComparator};
use crate::iterator::Iterator;
use crate::options::Options;
use crate::sstable::table::{Table, TableBuilder};
use crate::storage::Storage;
use crate::util::comparator::Comparator;
use crate::version::version_edit::FileMetaData;
use crate::Result;
use std::sync::Arc;

/// Builds a table file from the contents of `iter`. The generated file is
/// named after `meta.number`. On success, the rest of `meta` is filled with
/// the metadata of the generated table.
///
/// If `iter` holds no data, `meta.file_size` is set to zero and no table
/// file is left behind.
pub fn build_table<S: Storage, C: Comparator>(
    options: &Options<C>,
    storage: &S,
    db_path: &str,
    iter: &mut dyn Iterator,
    meta: &mut FileMetaData,
) -> Result<()> {
    meta.file_size = 0;
    iter.seek_to_first();
    let file_name = generate_filename(db_path, FileType::Table, meta.number);
    let mut status = Ok(());
    if iter.valid() {
        let file = storage.create(&file_name)?;
        let icmp = InternalKeyComparator::new(options.comparator.clone());
        let mut builder = TableBuilder::new(file, icmp, options);
        let smallest = iter.key().to_vec();
        let mut largest = vec![];
        while iter.valid() {
            if let Err(e) = builder.add(iter.key(), iter.value()) {
                status = Err(e);
                break;
            }
            largest.clear();
            largest.extend_from_slice(iter.key());
            iter.next();
        }
        if status.is_ok() {
            meta.smallest = InternalKey::decoded_from(&smallest);
            meta.largest = InternalKey::decoded_from(&largest);
            status = builder.finish(true).and_then(|file_size| {
                meta.file_size = file_size;
                // Make sure the new table is readable
                verify_table(options, storage, &file_name, meta)
            });
        } else {
            builder.abandon();
        }
    }
    if let Err(e) = iter.status() {
        status = Err(e);
    }
    if status.is_err() || meta.file_size == 0 {
        if storage.exists(&file_name) {
            storage.remove(&file_name)?;
        }
        if status.is_err() {
            meta.file_size = 0;
        }
        status
    } else {
        debug!(
            "Table #{} built: {} bytes [{:?} .. {:?}]",
            meta.number, meta.file_size, meta.smallest, meta.largest
        );
        Ok(())
    }
}

fn verify_table<S: Storage, C: Comparator>(
    options: &Options<C>,
    storage: &S,
    file_name: &str,
    meta: &FileMetaData,
) -> Result<()> {
    let file = storage.open(file_name)?;
    let table = Arc::new(Table::open(file, meta.number, meta.file_size, options)?);
    let mut iter = table.iter();
    iter.seek_to_first();
    while iter.valid() {
        iter.next();
    }
    iter.status()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::format::{LookupKey, ParsedInternalKey, ValueType, MAX_KEY_SEQUENCE};
    use crate::iterator::EmptyIterator;
    use crate::mem::MemTable;
    use crate::storage::mem::MemStorage;
    use crate::storage::File;
    use crate::util::collection::HashMap;
    use crate::util::comparator::BytewiseComparator;
    use crate::Error;
    use rand::Rng;

    #[test]
    fn test_build_table_from_memtable() {
        let s = MemStorage::default();
        let opts = Options::<BytewiseComparator>::default();
        let mem = MemTable::new(InternalKeyComparator::<BytewiseComparator>::default());
        let mut rng = rand::thread_rng();
        let mut expect = vec![];
        for i in 0..10000u64 {
            let key = format!("key{:08}", rng.gen_range(0, 1_000_000));
            let value = format!("value{}", rng.gen::<u64>());
            mem.add(i + 1, ValueType::Value, key.as_bytes(), value.as_bytes())
                .unwrap();
            expect.push((key, value));
        }
        let mut meta = FileMetaData::default();
        meta.number = 7;
        build_table(&opts, &s, "db", &mut mem.iter(), &mut meta).unwrap();

        let file_name = generate_filename("db", FileType::Table, 7);
        let file = s.open(&file_name).unwrap();
        assert_eq!(meta.file_size, file.len().unwrap());
        let min = expect.iter().map(|(k, _)| k).min().unwrap();
        let max = expect.iter().map(|(k, _)| k).max().unwrap();
        assert_eq!(meta.smallest.user_key(), min.as_bytes());
        assert_eq!(meta.largest.user_key(), max.as_bytes());

        let table = Arc::new(Table::open(file, 7, meta.file_size, &opts).unwrap());
        assert!(table.num_blocks() > 1);
        let mut iter = table.iter();
        iter.seek_to_first();
        let mut count = 0;
        while iter.valid() {
            count += 1;
            iter.next();
        }
        assert_eq!(count, mem.len());
        // Every insert is visible at its own sequence
        for (i, (key, value)) in expect.iter().enumerate() {
            let seq = i as u64 + 1;
            let lookup = LookupKey::new(key.as_bytes(), seq);
            let (found, v) = table
                .internal_get(lookup.internal_key())
                .unwrap()
                .unwrap();
            let parsed = ParsedInternalKey::decode_from(&found).unwrap();
            assert_eq!(parsed.user_key, key.as_bytes());
            assert_eq!(parsed.seq, seq);
            assert_eq!(v, value.as_bytes());
        }
        // and the latest value of each key wins
        let mut latest = HashMap::new();
        for (key, value) in expect.iter() {
            latest.insert(key.as_str(), value.as_str());
        }
        for (key, value) in latest {
            let lookup = LookupKey::new(key.as_bytes(), MAX_KEY_SEQUENCE);
            let (found, v) = table
                .internal_get(lookup.internal_key())
                .unwrap()
                .unwrap();
            assert_eq!(InternalKey::decoded_from(&found).user_key(), key.as_bytes());
            assert_eq!(v, value.as_bytes());
        }
    }

    #[test]
    fn test_build_table_empty() {
        let s = MemStorage::default();
        let opts = Options::<BytewiseComparator>::default();
        let mut meta = FileMetaData::default();
        meta.number = 3;
        build_table(&opts, &s, "db", &mut EmptyIterator::new(), &mut meta).unwrap();
        assert_eq!(meta.file_size, 0);
        assert!(!s.exists(generate_filename("db", FileType::Table, 3)));

        let mem = MemTable::new(InternalKeyComparator::<BytewiseComparator>::default());
        build_table(&opts, &s, "db", &mut mem.iter(), &mut meta).unwrap();
        assert_eq!(meta.file_size, 0);
        assert!(!s.exists(generate_filename("db", FileType::Table, 3)));
    }

    #[test]
    fn test_build_table_iter_error() {
        let s = MemStorage::default();
        let opts = Options::<BytewiseComparator>::default();
        let mut meta = FileMetaData::default();
        meta.number = 4;
        let mut iter = EmptyIterator::new_with_err(Error::Corruption("broken".to_owned()));
        let res = build_table(&opts, &s, "db", &mut iter, &mut meta);
        assert!(res.unwrap_err().is_corruption());
        assert_eq!(meta.file_size, 0);
        assert!(!s.exists(generate_filename("db", FileType::Table, 4)));
    }
}
