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

//! The record log shared by the write ahead log and the manifest.
//!
//! A log file is a sequence of 32KB blocks; only the tail of the file may
//! hold a partial block. Each block holds a run of physical records:
//!
//! ```text
//!
//! | -- 2bytes -- | - 1byte - | --- length bytes --- |
//!      length      record type        payload
//!  (little endian)
//!
//! ```
//!
//! A logical record that does not fit in the rest of a block is split into
//! `First`, `Middle`.. and `Last` fragments. When fewer than `HEADER_SIZE`
//! bytes remain in a block they are filled with zeros and skipped by readers.

pub mod reader;
pub mod writer;

/// The size of a log block
pub const BLOCK_SIZE: usize = 32768;

/// Bytes taken by the header of every physical record
pub const HEADER_SIZE: usize = 2 + 1;

#[derive(Clone, Copy, Eq, PartialEq, Debug, FromPrimitive)]
pub enum RecordType {
    // Reserved for preallocated files
    Zero = 0,
    Full = 1,
    First = 2,
    Middle = 3,
    Last = 4,
}

#[cfg(test)]
mod tests {
    use crate::record::reader::{Reader, Reporter};
    use crate::record::writer::Writer;
    use crate::record::{BLOCK_SIZE, HEADER_SIZE};
    use crate::storage::mem::{FileNode, MemStorage};
    use crate::storage::{File, Storage};
    use rand::Rng;
    use std::cell::RefCell;
    use std::io::SeekFrom;
    use std::rc::Rc;

    // Construct a string of the specified length made out of the supplied
    // partial string.
    fn big_string(partial: &str, n: usize) -> String {
        let mut s = String::new();
        while s.len() < n {
            s.push_str(partial);
        }
        s.truncate(n);
        s
    }

    #[derive(Clone, Default)]
    struct ReportCollector {
        dropped_bytes: Rc<RefCell<u64>>,
        message: Rc<RefCell<String>>,
    }

    impl Reporter for ReportCollector {
        fn corruption(&mut self, bytes: u64, reason: &str) {
            *self.dropped_bytes.borrow_mut() += bytes;
            self.message.borrow_mut().push_str(reason);
        }
    }

    struct RecordTest {
        storage: MemStorage,
        writer: Writer<FileNode>,
        report: ReportCollector,
    }

    impl RecordTest {
        fn new() -> Self {
            let storage = MemStorage::default();
            let file = storage.create("000001.log").unwrap();
            Self {
                storage,
                writer: Writer::new(file),
                report: ReportCollector::default(),
            }
        }

        fn write(&mut self, record: &str) {
            self.writer.add_record(record.as_bytes()).unwrap();
        }

        fn contents(&self) -> Vec<u8> {
            let mut f = self.storage.open("000001.log").unwrap();
            let mut buf = vec![];
            f.read_all(&mut buf).unwrap();
            buf
        }

        // Replaces the log with `data`
        fn set_contents(&self, data: &[u8]) {
            let mut f = self.storage.create("000001.log").unwrap();
            f.write(data).unwrap();
        }

        fn reader(&self, initial_offset: u64) -> Reader<FileNode> {
            let mut f = self.storage.open("000001.log").unwrap();
            // every handle of the file shares the read position
            f.seek(SeekFrom::Start(0)).unwrap();
            Reader::new(f, Some(Box::new(self.report.clone())), initial_offset)
        }

        fn read_all(&self, initial_offset: u64) -> Vec<String> {
            let mut reader = self.reader(initial_offset);
            let mut record = vec![];
            let mut result = vec![];
            while reader.read_record(&mut record) {
                result.push(String::from_utf8(record.clone()).unwrap());
            }
            result
        }

        fn dropped_bytes(&self) -> u64 {
            *self.report.dropped_bytes.borrow()
        }

        fn report_message(&self) -> String {
            self.report.message.borrow().clone()
        }

        // Rewrites the type of the record at `offset`
        fn set_type(&self, offset: usize, t: u8) {
            let mut data = self.contents();
            data[offset + 2] = t;
            self.set_contents(&data);
        }
    }

    #[test]
    fn test_empty() {
        let t = RecordTest::new();
        assert!(t.read_all(0).is_empty());
        assert_eq!(t.dropped_bytes(), 0);
    }

    #[test]
    fn test_read_write() {
        let mut t = RecordTest::new();
        let records = vec!["foo", "bar", "", "xxxx"];
        for r in records.iter() {
            t.write(r);
        }
        assert_eq!(t.read_all(0), records);
        assert_eq!(t.contents().len(), 4 * HEADER_SIZE + 10);
    }

    #[test]
    fn test_header_layout() {
        let mut t = RecordTest::new();
        t.write("x");
        assert_eq!(t.contents(), vec![1, 0, 1, b'x']);
        t.write(&big_string("y", 300));
        let data = t.contents();
        assert_eq!(data.len(), 4 + HEADER_SIZE + 300);
        assert_eq!(&data[4..7], &[44, 1, 1]);
    }

    #[test]
    fn test_many_blocks() {
        let mut t = RecordTest::new();
        let n = 20000;
        for i in 0..n {
            t.write(&i.to_string());
        }
        assert!(t.contents().len() > BLOCK_SIZE * 2);
        let got = t.read_all(0);
        assert_eq!(got.len(), n);
        for (i, r) in got.iter().enumerate() {
            assert_eq!(r, &i.to_string());
        }
    }

    #[test]
    fn test_fragmentation() {
        let mut t = RecordTest::new();
        let records = vec![
            "small".to_owned(),
            big_string("medium", 50000),
            big_string("large", 100_000),
        ];
        for r in records.iter() {
            t.write(r);
        }
        assert_eq!(t.read_all(0), records);
    }

    #[test]
    fn test_marginal_trailer() {
        // Make a trailer that is exactly the same length as an empty record.
        let mut t = RecordTest::new();
        let n = BLOCK_SIZE - 2 * HEADER_SIZE;
        let first = big_string("foo", n);
        t.write(&first);
        assert_eq!(t.contents().len(), BLOCK_SIZE - HEADER_SIZE);
        t.write("");
        t.write("bar");
        assert_eq!(t.read_all(0), vec![first, "".to_owned(), "bar".to_owned()]);
    }

    #[test]
    fn test_short_trailer() {
        let mut t = RecordTest::new();
        let n = BLOCK_SIZE - HEADER_SIZE - 2;
        let first = big_string("foo", n);
        t.write(&first);
        t.write("");
        t.write("bar");
        // the 2 bytes left in the first block are zero filled
        let data = t.contents();
        assert_eq!(&data[BLOCK_SIZE - 2..BLOCK_SIZE], &[0, 0]);
        assert_eq!(data[BLOCK_SIZE + 2], 1);
        assert_eq!(t.read_all(0), vec![first, "".to_owned(), "bar".to_owned()]);
        assert_eq!(t.dropped_bytes(), 0);
    }

    #[test]
    fn test_random_read() {
        let mut t = RecordTest::new();
        let mut rng = rand::thread_rng();
        let mut records = vec![];
        for i in 0..300 {
            let r = big_string(&i.to_string(), rng.gen_range(0, 1 << 16));
            t.write(&r);
            records.push(r);
        }
        assert_eq!(t.read_all(0), records);
    }

    #[test]
    fn test_zero_type_is_dropped() {
        let mut t = RecordTest::new();
        t.write("foo");
        t.write("bar");
        t.set_type(0, 0);
        assert_eq!(t.read_all(0), vec!["bar".to_owned()]);
        assert_eq!(t.dropped_bytes(), 3);
        assert!(t.report_message().contains("unknown record type 0"));
    }

    #[test]
    fn test_bad_record_type() {
        let mut t = RecordTest::new();
        t.write("foo");
        t.set_type(0, 100);
        assert!(t.read_all(0).is_empty());
        assert_eq!(t.dropped_bytes(), 3);
        assert!(t.report_message().contains("unknown record type"));
    }

    #[test]
    fn test_truncated_trailing_record_is_ignored() {
        let mut t = RecordTest::new();
        t.write("foo");
        let data = t.contents();
        t.set_contents(&data[..data.len() - 1]);
        assert!(t.read_all(0).is_empty());
        // a writer crash in the middle of a record is not a corruption
        assert_eq!(t.dropped_bytes(), 0);
    }

    #[test]
    fn test_bad_length_in_middle_of_log() {
        let mut t = RecordTest::new();
        t.write("foo");
        t.write("bar");
        let mut data = t.contents();
        // the first record now claims to be longer than the whole block
        data[0] = 0xff;
        data[1] = 0x7f;
        let mut padded = data.clone();
        padded.resize(BLOCK_SIZE, 0);
        t.set_contents(&padded);
        let w = t.storage.open("000001.log").unwrap();
        let mut second = Writer::new_with_offset(w, padded.len() as u64);
        second.add_record(b"baz").unwrap();
        assert_eq!(t.read_all(0), vec!["baz".to_owned()]);
        assert!(t.report_message().contains("bad record length"));
    }

    #[test]
    fn test_missing_first_fragment() {
        let mut t = RecordTest::new();
        t.write(&big_string("x", BLOCK_SIZE));
        t.write("tail");
        // turn the leading `First` fragment into a `Middle` one
        t.set_type(0, 3);
        assert_eq!(t.read_all(0), vec!["tail".to_owned()]);
        assert!(t
            .report_message()
            .contains("missing start of fragmented record"));
    }

    #[test]
    fn test_initial_offset() {
        let mut t = RecordTest::new();
        let sizes = [10000, 10000, 2 * BLOCK_SIZE - 1000, 1];
        let mut offsets = vec![];
        let mut offset = 0;
        for (i, size) in sizes.iter().enumerate() {
            offsets.push(offset);
            t.write(&big_string(&((b'a' + i as u8) as char).to_string(), *size));
            offset = t.contents().len() as u64;
        }
        for (i, start) in offsets.iter().enumerate() {
            let mut reader = t.reader(*start);
            let mut record = vec![];
            assert!(reader.read_record(&mut record), "start at record {}", i);
            assert_eq!(record.len(), sizes[i]);
            assert_eq!(record[0], b'a' + i as u8);
            assert_eq!(reader.last_record_offset(), *start);
        }
        // starting past the end yields nothing
        let mut reader = t.reader(offset + 1);
        let mut record = vec![];
        assert!(!reader.read_record(&mut record));
        assert_eq!(t.dropped_bytes(), 0);
    }
}
